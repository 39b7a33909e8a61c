//! `keg uninstall`: remove a keg and its ledger entry.

use std::process::ExitCode;

use anyhow::{Context, Result};

use super::{GlobalArgs, runtime};
use crate::output::{print_json, print_success};

pub fn cmd_uninstall(global: &GlobalArgs, formula: &str, force: bool) -> Result<ExitCode> {
  let engine = global.engine()?;
  let entry = runtime()?
    .block_on(engine.uninstall(formula, force))
    .with_context(|| format!("Failed to uninstall {formula}"))?;

  if global.output.is_json() {
    print_json(&entry)?;
  } else {
    print_success(&format!(
      "Uninstalled {} {} ({} files)",
      entry.name,
      entry.version,
      entry.manifest.len()
    ));
  }
  Ok(ExitCode::SUCCESS)
}
