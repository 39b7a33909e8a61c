//! System capability probes.
//!
//! A `recommended` dependency is skipped when the system already provides an
//! equivalent tool. Probes are injected so tests never depend on the host.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("probe for '{capability}' failed: {message}")]
pub struct ProbeError {
  pub capability: String,
  pub message: String,
}

/// Detects whether a capability is already provided by the system.
pub trait CapabilityProbe: Send + Sync {
  fn detect(&self, capability: &str) -> Result<bool, ProbeError>;
}

/// Looks capabilities up as executables on a search path.
#[derive(Debug, Clone, Default)]
pub struct PathProbe {
  /// Search path; `None` uses the process `PATH`.
  search_path: Option<OsString>,
}

impl PathProbe {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_search_path(search_path: impl Into<OsString>) -> Self {
    Self {
      search_path: Some(search_path.into()),
    }
  }
}

impl CapabilityProbe for PathProbe {
  fn detect(&self, capability: &str) -> Result<bool, ProbeError> {
    let found = match &self.search_path {
      Some(path) => which::which_in(capability, Some(path), PathBuf::from("/")),
      None => which::which(capability),
    };

    match found {
      Ok(path) => {
        debug!(capability, path = %path.display(), "capability found on PATH");
        Ok(true)
      }
      Err(which::Error::CannotFindBinaryPath) => Ok(false),
      Err(e) => Err(ProbeError {
        capability: capability.to_string(),
        message: e.to_string(),
      }),
    }
  }
}

/// Never detects anything: every recommended dependency is built.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl CapabilityProbe for NoProbe {
  fn detect(&self, _capability: &str) -> Result<bool, ProbeError> {
    Ok(false)
  }
}

/// Detects a fixed set of capabilities; anything else is absent.
#[derive(Debug, Clone, Default)]
pub struct FixedProbe {
  present: BTreeSet<String>,
}

impl FixedProbe {
  pub fn new<I, S>(present: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      present: present.into_iter().map(Into::into).collect(),
    }
  }
}

impl CapabilityProbe for FixedProbe {
  fn detect(&self, capability: &str) -> Result<bool, ProbeError> {
    Ok(self.present.contains(capability))
  }
}
