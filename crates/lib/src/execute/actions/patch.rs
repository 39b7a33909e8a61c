//! Patch application.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::cmd::{BuildEnv, BuildLog, Invocation, Outcome, run_logged};
use crate::execute::types::BuildError;
use crate::formula::{PatchSource, PatchSpec};

/// Apply `patches` in order with `patch -p<strip>`, feeding each diff on stdin.
///
/// The first patch that fails stops the build; it is never retried.
pub async fn apply_patches(
  patches: &[PatchSpec],
  src_dir: &Path,
  env: &BuildEnv,
  log: &BuildLog,
  kill_grace: Duration,
  cancel: &CancellationToken,
) -> Result<(), BuildError> {
  for (index, patch) in patches.iter().enumerate() {
    let diff = match &patch.source {
      PatchSource::Data(text) => text.clone().into_bytes(),
      PatchSource::File(path) => tokio::fs::read(path).await.map_err(|e| BuildError::StepError {
        step: format!("patch {index}"),
        message: format!("cannot read {}: {e}", path.display()),
      })?,
    };

    info!(index, strip = patch.strip, "applying patch");
    let mut invocation = Invocation::new(
      "patch",
      vec![format!("-p{}", patch.strip), "--batch".to_string(), "--forward".to_string()],
      src_dir,
    );
    invocation.stdin = Some(diff);

    match run_logged(&invocation, env, log, kill_grace, cancel).await? {
      Outcome::Exited(status) if status.success() => {}
      Outcome::Exited(_) => {
        return Err(BuildError::PatchFailed {
          index,
          log: log.path().to_path_buf(),
        });
      }
      Outcome::Cancelled => {
        return Err(BuildError::Cancelled {
          step: Some(format!("patch {index}")),
        });
      }
    }
  }
  Ok(())
}
