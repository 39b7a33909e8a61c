//! `keg install`: resolve, build and record a formula and its dependencies.

use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use keg_lib::consts::EXIT_FAILURE;
use keg_lib::execute::{BuildResult, BuildStatus, RunReport, SkipReason};
use keg_lib::resolve::ResolveRequest;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{GlobalArgs, runtime};
use crate::output::{
  format_duration, print_error, print_heading, print_info, print_json, print_success, print_warning, symbols,
};

pub fn cmd_install(global: &GlobalArgs, formula: &str, options: &[String]) -> Result<ExitCode> {
  let engine = global.engine()?;
  let roots = vec![(formula.to_string(), ResolveRequest::new(options.iter().cloned()))];

  let started = Instant::now();
  let report = runtime()?.block_on(async {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, stopping builds");
        on_interrupt.cancel();
      }
    });
    engine.install(&roots, &cancel).await
  });
  let report = report.with_context(|| format!("Failed to install {formula}"))?;

  if global.output.is_json() {
    print_json(&json!({
      "success": report.is_success(),
      "batches": report.batches,
      "results": report.results,
      "caveats": report.caveats,
    }))?;
  } else {
    print_report(&report);
    for (name, text) in &report.caveats {
      println!();
      print_heading(&format!("Caveats for {name}"));
      println!("{text}");
    }
    println!();
    let summary = format!(
      "{} built, {} failed, {} skipped in {}",
      report.with_status(BuildStatus::Succeeded).count(),
      report.failed().count(),
      report.skipped().filter(|r| !r.is_satisfied()).count(),
      format_duration(started.elapsed())
    );
    if report.is_success() {
      print_success(&summary);
    } else {
      print_error(&summary);
    }
  }

  if report.is_success() {
    Ok(ExitCode::SUCCESS)
  } else {
    Ok(ExitCode::from(EXIT_FAILURE as u8))
  }
}

fn print_report(report: &RunReport) {
  for result in report.ordered() {
    print_result(result);
  }
}

fn print_result(result: &BuildResult) {
  let label = format!("{} {}", result.name, result.version);
  match (result.status, &result.skip_reason) {
    (BuildStatus::Succeeded, _) => {
      print_success(&format!("{label} installed ({} files)", result.manifest.len()));
    }
    (BuildStatus::Skipped, Some(SkipReason::AlreadyInstalled)) => {
      print_info(&format!("{label} already installed"));
    }
    (BuildStatus::Skipped, reason) => {
      let reason = reason.as_ref().map(ToString::to_string).unwrap_or_default();
      print_warning(&format!("{label} skipped: {reason}"));
    }
    (BuildStatus::Failed, _) => {
      let error = result.error.as_ref().map(ToString::to_string).unwrap_or_default();
      print_error(&format!("{label} failed: {error}"));
      if let Some(log) = &result.log_path {
        eprintln!("  {} {}", symbols::ARROW, log.display());
      }
    }
    (BuildStatus::Pending | BuildStatus::Running, _) => {}
  }
}
