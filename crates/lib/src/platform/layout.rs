//! Install layout: where kegs, configuration and state live.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::paths;
use crate::consts::CELLAR_DIR;

/// Filesystem layout a build installs into.
///
/// Every path a formula can reference through a `PathRef` is derived from
/// this struct, so nothing downstream hardcodes `/usr/local` or similar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
  /// Install root (`HOMEBREW_PREFIX` equivalent).
  pub root: PathBuf,
  /// Directory holding `<name>/<version>` kegs.
  pub cellar: PathBuf,
  /// System configuration directory (`--sysconfdir`).
  pub sysconf_dir: PathBuf,
  /// System state directory (`--localstatedir`).
  pub localstate_dir: PathBuf,
}

impl Layout {
  /// Layout rooted at `root` with the conventional `etc`/`var` children.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    let root = root.into();
    Self {
      cellar: root.join(CELLAR_DIR),
      sysconf_dir: root.join("etc"),
      localstate_dir: root.join("var"),
      root,
    }
  }

  /// Layout from the environment (`KEG_ROOT`, `KEG_SYSCONFDIR`, `KEG_LOCALSTATEDIR`).
  pub fn from_env() -> Self {
    let root = paths::root_dir();
    Self {
      cellar: root.join(CELLAR_DIR),
      sysconf_dir: paths::sysconf_dir(),
      localstate_dir: paths::localstate_dir(),
      root,
    }
  }

  /// Keg prefix of one formula version.
  pub fn keg(&self, name: &str, version: &str) -> PathBuf {
    self.cellar.join(name).join(version)
  }

  /// Joins `sub` onto `base`, treating an empty `sub` as `base` itself.
  pub fn join(base: &Path, sub: &str) -> PathBuf {
    if sub.is_empty() { base.to_path_buf() } else { base.join(sub) }
  }
}

impl Default for Layout {
  fn default() -> Self {
    Self::from_env()
  }
}
