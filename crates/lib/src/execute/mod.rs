//! Build execution.
//!
//! Batches from the scheduler run strictly in order; targets inside a batch
//! build concurrently, bounded by `ExecuteConfig::parallelism`. A failed
//! target blocks every target that depends on it, while unrelated targets in
//! later batches still build. Successful builds are committed to the ledger
//! as soon as they finish.

pub mod actions;
pub mod target;
pub mod types;

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::graph::BuildGraph;
use crate::ledger::{Ledger, LedgerError};
use crate::platform::Layout;
use crate::resolve::ResolvedTarget;
use crate::schedule::schedule;

pub use target::execute;
pub use types::{BuildError, BuildResult, BuildStatus, ExecuteConfig, RunReport, SkipReason};

/// Build every target of `graph` that is not already installed.
///
/// Errors only when the run itself cannot continue (an unschedulable graph
/// or a ledger failure); build failures are reported in the `RunReport`.
pub async fn execute_graph(
  graph: Arc<BuildGraph>,
  ledger: Arc<Ledger>,
  config: &ExecuteConfig,
  cancel: &CancellationToken,
) -> Result<RunReport, EngineError> {
  let batches = schedule(&graph)?;
  info!(targets = graph.len(), batches = batches.len(), "starting build execution");

  // Cancelled by the caller or by a fatal ledger error.
  let run_cancel = cancel.child_token();
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut report = RunReport {
    batches: batches.clone(),
    ..RunReport::default()
  };
  let mut blocked: HashSet<String> = HashSet::new();
  let mut fatal: Option<LedgerError> = None;

  for (index, batch) in batches.iter().enumerate() {
    debug!(batch = index, targets = batch.len(), "executing batch");
    let mut join_set = JoinSet::new();

    for name in batch {
      let Some(target) = graph.get(name) else {
        continue;
      };

      if run_cancel.is_cancelled() {
        report.results.insert(
          name.clone(),
          BuildResult::skipped(name, target.version(), SkipReason::Cancelled),
        );
        blocked.insert(name.clone());
        continue;
      }

      if let Some(dependency) = graph.dependencies(name).into_iter().find(|d| blocked.contains(*d)) {
        warn!(formula = %name, dependency, "skipping, dependency did not build");
        let reason = SkipReason::DependencyFailed {
          dependency: dependency.to_string(),
        };
        report
          .results
          .insert(name.clone(), BuildResult::skipped(name, target.version(), reason));
        blocked.insert(name.clone());
        continue;
      }

      match already_installed(&ledger, target, graph.is_root(name)).await {
        Ok(true) => {
          info!(formula = %name, "already installed");
          report.results.insert(
            name.clone(),
            BuildResult::skipped(name, target.version(), SkipReason::AlreadyInstalled),
          );
          continue;
        }
        Ok(false) => {}
        Err(e) => {
          error!(formula = %name, error = %e, "ledger lookup failed, aborting run");
          fatal = Some(e);
          run_cancel.cancel();
          break;
        }
      }

      let job = Job {
        target: target.clone(),
        dependencies: dependency_prefixes(&graph, name, &config.layout),
        on_request: graph.is_root(name),
      };
      let ledger = ledger.clone();
      let config = config.clone();
      let semaphore = semaphore.clone();
      let cancel = run_cancel.clone();
      join_set.spawn(async move {
        let name = job.target.name().to_string();
        let outcome = job.run(&ledger, &config, &semaphore, &cancel).await;
        (name, outcome)
      });
    }

    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok((name, Ok(result))) => {
          if !result.is_satisfied() {
            blocked.insert(name.clone());
          }
          report.results.insert(name, result);
        }
        Ok((name, Err(e))) => {
          error!(formula = %name, error = %e, "failed to record install, aborting run");
          run_cancel.cancel();
          blocked.insert(name);
          fatal.get_or_insert(e);
        }
        Err(e) => error!(error = %e, "build task panicked"),
      }
    }

    if let Some(e) = fatal {
      return Err(e.into());
    }

    for name in batch {
      if report.results.contains_key(name) {
        continue;
      }
      let version = graph.get(name).map(ResolvedTarget::version).unwrap_or_default();
      let mut result = BuildResult::pending(name, version);
      result.fail(BuildError::StepError {
        step: "build".to_string(),
        message: "build task panicked".to_string(),
      });
      blocked.insert(name.clone());
      report.results.insert(name.clone(), result);
    }
  }

  info!(
    succeeded = report.with_status(BuildStatus::Succeeded).count(),
    failed = report.failed().count(),
    skipped = report.skipped().count(),
    "build execution complete"
  );
  Ok(report)
}

/// One target handed to a worker task.
struct Job {
  target: ResolvedTarget,
  dependencies: BTreeMap<String, PathBuf>,
  on_request: bool,
}

impl Job {
  async fn run(
    self,
    ledger: &Ledger,
    config: &ExecuteConfig,
    semaphore: &Semaphore,
    cancel: &CancellationToken,
  ) -> Result<BuildResult, LedgerError> {
    let cancelled = || BuildResult::skipped(self.target.name(), self.target.version(), SkipReason::Cancelled);

    let _permit = tokio::select! {
      biased;
      _ = cancel.cancelled() => return Ok(cancelled()),
      permit = semaphore.acquire() => match permit {
        Ok(permit) => permit,
        Err(_) => return Ok(cancelled()),
      },
    };
    if cancel.is_cancelled() {
      return Ok(cancelled());
    }

    let result = execute(&self.target, &self.dependencies, config, cancel).await;
    if result.is_succeeded() {
      ledger.record(&self.target, &result, self.on_request).await?;
    }
    Ok(result)
  }
}

/// Whether the ledger already holds `target` with the same version and options.
async fn already_installed(ledger: &Ledger, target: &ResolvedTarget, on_request: bool) -> Result<bool, LedgerError> {
  let Some(entry) = ledger.lookup(target.name()).await? else {
    return Ok(false);
  };
  if entry.version != target.version() || !entry.matches(&target.options) {
    debug!(
      formula = target.name(),
      installed = %entry.version,
      "installed keg differs from request, rebuilding"
    );
    return Ok(false);
  }
  if on_request && !entry.installed_on_request {
    ledger.mark_on_request(target.name()).await?;
  }
  Ok(true)
}

/// Keg prefix of every direct dependency of `name`.
fn dependency_prefixes(graph: &BuildGraph, name: &str, layout: &Layout) -> BTreeMap<String, PathBuf> {
  graph
    .dependencies(name)
    .into_iter()
    .filter_map(|dep| graph.get(dep).map(|t| (dep.to_string(), layout.keg(dep, t.version()))))
    .collect()
}
