//! In-process file steps: text substitution and file installation.

use std::path::Path;

use tokio::fs;
use tracing::{debug, info};

use crate::execute::types::BuildError;

/// Replace every occurrence of `from` with `to` in `src_dir/file`.
///
/// A pattern that matches nothing is an error: it means the source changed
/// under the formula.
pub async fn inreplace(src_dir: &Path, file: &Path, from: &str, to: &str) -> Result<(), BuildError> {
  let step = format!("inreplace {}", file.display());
  let path = src_dir.join(file);

  let contents = fs::read_to_string(&path).await.map_err(|e| BuildError::StepError {
    step: step.clone(),
    message: format!("cannot read {}: {e}", path.display()),
  })?;

  if !contents.contains(from) {
    return Err(BuildError::StepError {
      step,
      message: format!("expected text not found: {from}"),
    });
  }

  let count = contents.matches(from).count();
  fs::write(&path, contents.replace(from, to)).await?;
  debug!(file = %path.display(), count, "replaced text");
  Ok(())
}

/// Copy `src_dir/from` to `dest`, creating parent directories.
///
/// An existing destination is kept unless `overwrite` is set, so local edits
/// to configuration files survive reinstalls. Returns whether a copy happened.
pub async fn install_file(src_dir: &Path, from: &Path, dest: &Path, overwrite: bool) -> Result<bool, BuildError> {
  if !overwrite && fs::try_exists(dest).await? {
    info!(dest = %dest.display(), "keeping existing file");
    return Ok(false);
  }

  let source = src_dir.join(from);
  if let Some(parent) = dest.parent() {
    fs::create_dir_all(parent).await?;
  }
  fs::copy(&source, dest).await.map_err(|e| BuildError::StepError {
    step: format!("install {}", from.display()),
    message: format!("cannot copy {} to {}: {e}", source.display(), dest.display()),
  })?;
  Ok(true)
}
