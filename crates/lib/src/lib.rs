//! keg-lib: formula resolution and build orchestration for keg.
//!
//! A request names formulas and options. It flows through:
//! - `resolve`: option handling for one formula, producing a `ResolvedTarget`
//! - `graph`: the dependency graph of every target the request needs
//! - `schedule`: batches of targets whose dependencies are all satisfied
//! - `execute`: fetching, patching and building targets, batch by batch
//! - `ledger`: the on-disk record of what is installed and how
//!
//! `install::Engine` ties them together for the CLI.

pub mod consts;
pub mod error;
pub mod execute;
pub mod formula;
pub mod graph;
pub mod install;
pub mod ledger;
pub mod platform;
pub mod resolve;
pub mod schedule;
pub mod store_lock;
pub mod util;

pub use error::EngineError;
