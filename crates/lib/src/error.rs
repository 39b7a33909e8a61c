//! Top-level error for engine operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::formula::FormulaError;
use crate::graph::GraphError;
use crate::ledger::LedgerError;
use crate::resolve::ResolutionError;
use crate::store_lock::StoreLockError;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error(transparent)]
  Formula(#[from] FormulaError),

  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Ledger(#[from] LedgerError),

  #[error(transparent)]
  Lock(#[from] StoreLockError),

  #[error("refusing to uninstall {name}: required by {}", .dependents.join(", "))]
  HasDependents { name: String, dependents: Vec<String> },

  #[error("failed to remove {}: {source}", .path.display())]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl From<ResolutionError> for EngineError {
  fn from(err: ResolutionError) -> Self {
    EngineError::Graph(GraphError::Resolution(err))
  }
}

impl EngineError {
  /// True for problems with the request or the formulas themselves, which
  /// abort before anything is built.
  pub fn is_configuration(&self) -> bool {
    matches!(self, EngineError::Formula(_) | EngineError::Graph(_))
  }
}
