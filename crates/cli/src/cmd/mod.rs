mod info;
mod install;
mod list;
mod uninstall;

use std::path::PathBuf;

use anyhow::{Context, Result};
use keg_lib::EngineError;
use keg_lib::formula::FormulaRegistry;
use keg_lib::install::Engine;
use keg_lib::platform::paths;
use tokio::runtime::Runtime;

use crate::output::OutputFormat;

pub use info::cmd_info;
pub use install::cmd_install;
pub use list::cmd_list;
pub use uninstall::cmd_uninstall;

/// Flags shared by every subcommand.
pub struct GlobalArgs {
  pub output: OutputFormat,
  pub formula_dir: Option<PathBuf>,
  pub jobs: Option<usize>,
}

impl GlobalArgs {
  fn formula_dir(&self) -> PathBuf {
    self.formula_dir.clone().unwrap_or_else(paths::formula_dir)
  }

  /// Engine over the formula directory with `--jobs` applied.
  fn engine(&self) -> Result<Engine> {
    let dir = self.formula_dir();
    let registry = FormulaRegistry::load_dir(&dir)
      .map_err(EngineError::from)
      .with_context(|| format!("Failed to load formulas from {}", dir.display()))?;

    let mut engine = Engine::from_env(registry);
    if let Some(jobs) = self.jobs {
      let jobs = jobs.max(1);
      engine.config_mut().parallelism = jobs;
      engine.config_mut().make_jobs = jobs;
    }
    Ok(engine)
  }
}

fn runtime() -> Result<Runtime> {
  Runtime::new().context("Failed to create async runtime")
}
