//! `keg info`: what a formula offers and whether it is installed.

use std::process::ExitCode;

use anyhow::{Context, Result};
use keg_lib::EngineError;
use serde_json::json;

use super::{GlobalArgs, runtime};
use crate::output::{print_heading, print_json, print_stat, symbols};

pub fn cmd_info(global: &GlobalArgs, formula: &str) -> Result<ExitCode> {
  let engine = global.engine()?;
  let descriptor = engine.registry().require(formula).map_err(EngineError::from)?;

  let installed = runtime()?
    .block_on(engine.list())
    .context("Failed to read the ledger")?
    .into_iter()
    .find(|e| e.name == formula);
  let options = descriptor.all_options();
  let selected = installed.as_ref().map(|e| e.options.clone()).unwrap_or_default();
  let caveats = engine.caveats(formula, &selected);

  if global.output.is_json() {
    print_json(&json!({
      "name": descriptor.name,
      "version": descriptor.version,
      "homepage": descriptor.homepage,
      "description": descriptor.description,
      "options": options,
      "dependencies": descriptor.dependencies,
      "caveats": caveats,
      "installed": installed,
    }))?;
    return Ok(ExitCode::SUCCESS);
  }

  print_heading(&format!("{} {}", descriptor.name, descriptor.version));
  if let Some(description) = &descriptor.description {
    println!("{description}");
  }
  if let Some(homepage) = &descriptor.homepage {
    println!("{homepage}");
  }
  match &installed {
    Some(entry) => print_stat(
      "Installed",
      &format!("{} ({} files)", engine.layout().keg(&entry.name, &entry.version).display(), entry.manifest.len()),
    ),
    None => print_stat("Installed", "no"),
  }

  if !descriptor.dependencies.is_empty() {
    println!();
    print_heading("Dependencies");
    for dep in &descriptor.dependencies {
      println!("  {} {} ({})", symbols::INFO, dep.name, dep.kind);
    }
  }

  if !options.is_empty() {
    println!();
    print_heading("Options");
    for option in &options {
      println!("{}", option.flag);
      println!("\t{}", option.description);
    }
  }

  if let Some(caveats) = caveats {
    println!();
    print_heading("Caveats");
    println!("{caveats}");
  }
  Ok(ExitCode::SUCCESS)
}
