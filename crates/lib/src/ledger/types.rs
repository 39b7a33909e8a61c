//! Ledger entry and error types.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record of one installed formula.
///
/// Stored as `<ledger_dir>/<name>.json`; the file exists only once the
/// keg's manifest has been fully written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
  pub name: String,
  pub version: String,
  /// Exact option set the keg was built with.
  pub options: BTreeSet<String>,
  /// Installed paths, sorted.
  pub manifest: Vec<PathBuf>,
  /// Unix seconds.
  pub installed_at: u64,
  /// Names of the formulas this keg was built against.
  #[serde(default)]
  pub dependencies: Vec<String>,
  /// Whether the user asked for this formula, rather than it being pulled in.
  #[serde(default)]
  pub installed_on_request: bool,
}

impl LedgerEntry {
  /// True when this entry was built with exactly `options`.
  pub fn matches(&self, options: &BTreeSet<String>) -> bool {
    self.options == *options
  }
}

#[derive(Debug, Error)]
pub enum LedgerError {
  #[error("ledger entry {} is corrupt: {source}", .path.display())]
  Corrupt {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("cannot record {name}: it was not installed successfully")]
  NotInstalled { name: String },

  #[error("{name} is not installed")]
  UnknownEntry { name: String },

  #[error("failed to serialize ledger entry for {name}: {source}")]
  Serialize {
    name: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("ledger io error at {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl LedgerError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> LedgerError {
    let path = path.into();
    move |source| LedgerError::Io { path, source }
  }
}
