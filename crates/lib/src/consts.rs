//! Crate-wide constants.

/// Application name used for directory names and env var prefixes.
pub const APP_NAME: &str = "keg";

/// Directory under the install root holding one keg per formula version.
pub const CELLAR_DIR: &str = "Cellar";

/// Exit code for configuration errors (unknown/conflicting options, bad graphs).
pub const EXIT_CONFIGURATION: i32 = 3;

/// Exit code for build or runtime failures.
pub const EXIT_FAILURE: i32 = 1;

/// `SOURCE_DATE_EPOCH` handed to every build step (1980-01-01, the ZIP epoch).
pub const SOURCE_DATE_EPOCH: &str = "315532800";
