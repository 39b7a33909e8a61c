//! `keg list`: installed formulas from the ledger.

use std::process::ExitCode;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use super::{GlobalArgs, runtime};
use crate::output::{format_timestamp, print_info, print_json};

pub fn cmd_list(global: &GlobalArgs) -> Result<ExitCode> {
  let engine = global.engine()?;
  let entries = runtime()?.block_on(engine.list()).context("Failed to read the ledger")?;

  if global.output.is_json() {
    print_json(&entries)?;
    return Ok(ExitCode::SUCCESS);
  }

  if entries.is_empty() {
    print_info("No formulas installed.");
    return Ok(ExitCode::SUCCESS);
  }

  for entry in &entries {
    let options = entry.options.iter().cloned().collect::<Vec<_>>().join(" ");
    let marker = if entry.installed_on_request { "" } else { " (dependency)" };
    println!(
      "{} {}{}  {}",
      entry.name.if_supports_color(Stream::Stdout, |s| s.bold()),
      entry.version,
      marker.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      options
    );
    let installed = format!("installed {}", format_timestamp(entry.installed_at));
    println!("  {}", installed.if_supports_color(Stream::Stdout, |s| s.dimmed()));
  }
  Ok(ExitCode::SUCCESS)
}
