//! Actions performed while building one target.

pub mod cmd;
pub mod fetch;
pub mod files;
pub mod patch;
pub mod unpack;

pub use cmd::{BuildEnv, BuildLog, Invocation, Outcome, run_logged};
pub use fetch::fetch_source;
pub use files::{inreplace, install_file};
pub use patch::apply_patches;
pub use unpack::unpack;
