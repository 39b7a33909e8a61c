//! Types for target execution.
//!
//! This module defines the error types, result types, and configuration
//! used while building the targets of a graph.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use thiserror::Error;

use crate::platform::{Layout, paths};
use crate::schedule::Batch;

/// Errors that fail a single target. They never abort sibling builds.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildError {
  /// The source could not be downloaded or copied.
  #[error("fetch failed for {url}: {message}")]
  FetchFailed { url: String, message: String },

  /// The fetched artifact does not match the formula's checksum.
  #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
  ChecksumMismatch {
    url: String,
    expected: String,
    actual: String,
  },

  #[error("failed to unpack {}: {message}", .archive.display())]
  UnpackFailed { archive: PathBuf, message: String },

  /// Patch `index` (zero-based, declaration order) did not apply.
  #[error("patch {index} failed to apply (see {})", .log.display())]
  PatchFailed { index: usize, log: PathBuf },

  /// A subprocess exited unsuccessfully.
  #[error("step '{step}' failed with exit code {} (see {})", exit_code(.code), .log.display())]
  StepFailed {
    step: String,
    code: Option<i32>,
    log: PathBuf,
  },

  /// A step failed before or without running a subprocess.
  #[error("step '{step}' failed: {message}")]
  StepError { step: String, message: String },

  /// The run was cancelled while this target was building.
  #[error("cancelled{}", during(.step))]
  Cancelled { step: Option<String> },

  #[error("io error: {message}")]
  Io { message: String },
}

impl From<std::io::Error> for BuildError {
  fn from(err: std::io::Error) -> Self {
    BuildError::Io {
      message: err.to_string(),
    }
  }
}

fn exit_code(code: &Option<i32>) -> String {
  code.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn during(step: &Option<String>) -> String {
  step.as_ref().map(|s| format!(" during '{s}'")).unwrap_or_default()
}

/// Lifecycle state of one target in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
  Pending,
  Running,
  Succeeded,
  Failed,
  Skipped,
}

impl std::fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      BuildStatus::Pending => "pending",
      BuildStatus::Running => "running",
      BuildStatus::Succeeded => "succeeded",
      BuildStatus::Failed => "failed",
      BuildStatus::Skipped => "skipped",
    };
    write!(f, "{s}")
  }
}

/// Why a target never ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
  /// A dependency failed or was itself skipped because of a failure.
  DependencyFailed { dependency: String },
  /// The ledger already records this target with the same options.
  AlreadyInstalled,
  /// The run was cancelled before the target started.
  Cancelled,
}

impl std::fmt::Display for SkipReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SkipReason::DependencyFailed { dependency } => write!(f, "dependency {dependency} failed"),
      SkipReason::AlreadyInstalled => write!(f, "already installed"),
      SkipReason::Cancelled => write!(f, "cancelled"),
    }
  }
}

pub(crate) fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

/// Outcome of one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildResult {
  pub name: String,
  pub version: String,
  pub status: BuildStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub skip_reason: Option<SkipReason>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<BuildError>,
  /// Append-only log of every subprocess this target ran.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log_path: Option<PathBuf>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub started_at: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub finished_at: Option<u64>,
  /// Files installed under the keg, sorted.
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub manifest: Vec<PathBuf>,
}

impl BuildResult {
  pub fn pending(name: &str, version: &str) -> Self {
    Self {
      name: name.to_string(),
      version: version.to_string(),
      status: BuildStatus::Pending,
      skip_reason: None,
      error: None,
      log_path: None,
      started_at: None,
      finished_at: None,
      manifest: Vec::new(),
    }
  }

  /// A target that never started.
  pub fn skipped(name: &str, version: &str, reason: SkipReason) -> Self {
    Self {
      status: BuildStatus::Skipped,
      skip_reason: Some(reason),
      ..Self::pending(name, version)
    }
  }

  pub(crate) fn start(&mut self, log_path: PathBuf) {
    debug_assert_eq!(self.status, BuildStatus::Pending);
    self.status = BuildStatus::Running;
    self.log_path = Some(log_path);
    self.started_at = Some(unix_now());
  }

  pub(crate) fn succeed(&mut self, manifest: Vec<PathBuf>) {
    debug_assert_eq!(self.status, BuildStatus::Running);
    self.status = BuildStatus::Succeeded;
    self.manifest = manifest;
    self.finished_at = Some(unix_now());
  }

  pub(crate) fn fail(&mut self, error: BuildError) {
    self.status = BuildStatus::Failed;
    self.error = Some(error);
    self.finished_at = Some(unix_now());
  }

  pub fn is_succeeded(&self) -> bool {
    self.status == BuildStatus::Succeeded
  }

  pub fn is_failed(&self) -> bool {
    self.status == BuildStatus::Failed
  }

  /// Succeeded, or skipped because the same build is already installed.
  pub fn is_satisfied(&self) -> bool {
    self.is_succeeded() || self.skip_reason == Some(SkipReason::AlreadyInstalled)
  }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
  /// Batches in the order they ran.
  pub batches: Vec<Batch>,
  /// Every target of the graph, keyed by name.
  pub results: BTreeMap<String, BuildResult>,
  /// Rendered caveats of the installed roots.
  #[serde(skip_serializing_if = "BTreeMap::is_empty")]
  pub caveats: BTreeMap<String, String>,
}

impl RunReport {
  /// True when every target succeeded or was already installed.
  pub fn is_success(&self) -> bool {
    self.results.values().all(BuildResult::is_satisfied)
  }

  /// Results in schedule order.
  pub fn ordered(&self) -> impl Iterator<Item = &BuildResult> {
    self.batches.iter().flatten().filter_map(|name| self.results.get(name))
  }

  pub fn with_status(&self, status: BuildStatus) -> impl Iterator<Item = &BuildResult> {
    self.ordered().filter(move |r| r.status == status)
  }

  pub fn failed(&self) -> impl Iterator<Item = &BuildResult> {
    self.with_status(BuildStatus::Failed)
  }

  pub fn skipped(&self) -> impl Iterator<Item = &BuildResult> {
    self.with_status(BuildStatus::Skipped)
  }
}

/// Configuration for target execution.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of targets building at once.
  pub parallelism: usize,

  /// Install layout used to render paths and place kegs.
  pub layout: Layout,

  /// Per-target build logs.
  pub logs_dir: PathBuf,

  /// Download cache and scratch work directories.
  pub cache_dir: PathBuf,

  /// `PATH` handed to build subprocesses, after dependency `bin` dirs.
  pub shell_path: String,

  /// How long an in-flight subprocess may run after cancellation before it is killed.
  pub kill_grace: Duration,

  /// `make -j` level passed through `MAKEFLAGS`.
  pub make_jobs: usize,
}

impl ExecuteConfig {
  pub fn downloads_dir(&self) -> PathBuf {
    self.cache_dir.join("downloads")
  }

  pub fn work_dir(&self) -> PathBuf {
    self.cache_dir.join("work")
  }
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    let parallelism = num_cpus();
    Self {
      parallelism,
      layout: Layout::from_env(),
      logs_dir: paths::logs_dir(),
      cache_dir: paths::cache_dir(),
      shell_path: "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin".to_string(),
      kill_grace: Duration::from_secs(10),
      make_jobs: parallelism,
    }
  }
}

/// Get the number of CPUs for default parallelism.
fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
