//! Well-known directories.
//!
//! Every directory can be overridden through a `KEG_*` environment variable so
//! tests and unusual installs never touch the real home directory.

use std::path::PathBuf;

use crate::consts::APP_NAME;

/// Returns the value of `var` as a path, if set and non-empty.
fn env_path(var: &str) -> Option<PathBuf> {
  std::env::var_os(var).filter(|v| !v.is_empty()).map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  env_path("USERPROFILE").unwrap_or_else(std::env::temp_dir)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  env_path("HOME").unwrap_or_else(std::env::temp_dir)
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  env_path("APPDATA").unwrap_or_else(home_dir).join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  env_path("XDG_CONFIG_HOME")
    .unwrap_or_else(|| home_dir().join(".config"))
    .join(APP_NAME)
}

/// Returns the directory holding the ledger, build logs and the store lock.
///
/// `KEG_DATA_DIR` wins over the platform default.
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  env_path("KEG_DATA_DIR").unwrap_or_else(|| env_path("APPDATA").unwrap_or_else(home_dir).join(APP_NAME))
}

/// Returns the directory holding the ledger, build logs and the store lock.
///
/// `KEG_DATA_DIR` wins over `$XDG_DATA_HOME/keg`.
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  env_path("KEG_DATA_DIR").unwrap_or_else(|| {
    env_path("XDG_DATA_HOME")
      .unwrap_or_else(|| home_dir().join(".local").join("share"))
      .join(APP_NAME)
  })
}

/// Returns the directory for downloads and build working directories.
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  env_path("KEG_CACHE_DIR")
    .unwrap_or_else(|| env_path("LOCALAPPDATA").unwrap_or_else(home_dir).join(APP_NAME).join("Cache"))
}

/// Returns the directory for downloads and build working directories.
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  env_path("KEG_CACHE_DIR").unwrap_or_else(|| {
    env_path("XDG_CACHE_HOME")
      .unwrap_or_else(|| home_dir().join(".cache"))
      .join(APP_NAME)
  })
}

/// Install root (the equivalent of a Homebrew prefix).
pub fn root_dir() -> PathBuf {
  env_path("KEG_ROOT").unwrap_or_else(|| data_dir().join("root"))
}

/// System configuration directory handed to `--sysconfdir` style arguments.
pub fn sysconf_dir() -> PathBuf {
  env_path("KEG_SYSCONFDIR").unwrap_or_else(|| root_dir().join("etc"))
}

/// System state directory handed to `--localstatedir` style arguments.
pub fn localstate_dir() -> PathBuf {
  env_path("KEG_LOCALSTATEDIR").unwrap_or_else(|| root_dir().join("var"))
}

/// Directory scanned for formula descriptor files.
pub fn formula_dir() -> PathBuf {
  env_path("KEG_FORMULA_DIR").unwrap_or_else(|| config_dir().join("formula"))
}

/// Directory of ledger entries.
pub fn ledger_dir() -> PathBuf {
  data_dir().join("ledger")
}

/// Directory of per-target build logs.
pub fn logs_dir() -> PathBuf {
  data_dir().join("logs")
}
