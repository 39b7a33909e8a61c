mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use keg_lib::EngineError;
use keg_lib::consts::{EXIT_CONFIGURATION, EXIT_FAILURE};
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};

/// keg - build and install formulas from source
#[derive(Parser)]
#[command(name = "keg")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  /// Directory of formula descriptors (default: $KEG_FORMULA_DIR or ~/.config/keg/formula)
  #[arg(long, global = true)]
  formula_dir: Option<PathBuf>,

  /// Number of formulas to build at once
  #[arg(short, long, global = true)]
  jobs: Option<usize>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build and install a formula and its dependencies
  Install {
    /// Formula name
    formula: String,

    /// Formula options, e.g. --with-mysql --with-fpm
    ///
    /// Global flags (-v, -o, -j, --formula-dir) are also accepted here.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    options: Vec<String>,
  },

  /// Remove an installed formula
  Uninstall {
    /// Formula name
    formula: String,

    /// Remove even when other installed formulas depend on it
    #[arg(long)]
    force: bool,
  },

  /// List installed formulas
  List,

  /// Show a formula's options, dependencies and caveats
  Info {
    /// Formula name
    formula: String,
  },
}

fn main() -> ExitCode {
  let mut cli = Cli::parse();
  if let Err(message) = hoist_global_flags(&mut cli) {
    Cli::command().error(ErrorKind::InvalidValue, message).exit();
  }

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(code) => code,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::from(exit_code(&err) as u8)
    }
  }
}

fn run(cli: Cli) -> Result<ExitCode> {
  let global = cmd::GlobalArgs {
    output: cli.output,
    formula_dir: cli.formula_dir,
    jobs: cli.jobs,
  };

  match cli.command {
    Commands::Install { formula, options } => cmd::cmd_install(&global, &formula, &options),
    Commands::Uninstall { formula, force } => cmd::cmd_uninstall(&global, &formula, force),
    Commands::List => cmd::cmd_list(&global),
    Commands::Info { formula } => cmd::cmd_info(&global, &formula),
  }
}

/// Moves global flags that trail `install <formula>` out of the formula options.
///
/// The options are collected verbatim, so `keg install php -v` would otherwise
/// hand `-v` to the formula.
fn hoist_global_flags(cli: &mut Cli) -> Result<(), String> {
  let Commands::Install { options, .. } = &mut cli.command else {
    return Ok(());
  };

  let mut args = std::mem::take(options).into_iter();
  while let Some(arg) = args.next() {
    let (flag, inline) = match arg.split_once('=') {
      Some((flag, value)) if flag.starts_with("--") => (flag.to_string(), Some(value.to_string())),
      _ => (arg.clone(), None),
    };
    let mut value = || inline.clone().or_else(|| args.next()).ok_or_else(|| format!("{flag} needs a value"));

    match flag.as_str() {
      "-v" | "--verbose" => cli.verbose = true,
      "-o" | "--output" => cli.output = OutputFormat::from_str(&value()?, true)?,
      "-j" | "--jobs" => {
        let jobs = value()?;
        cli.jobs = Some(jobs.parse().map_err(|_| format!("invalid value '{jobs}' for {flag}"))?);
      }
      "--formula-dir" => cli.formula_dir = Some(PathBuf::from(value()?)),
      _ => options.push(arg),
    }
  }
  Ok(())
}

/// Configuration problems exit with 3, everything else with 1.
fn exit_code(err: &anyhow::Error) -> i32 {
  match err.downcast_ref::<EngineError>() {
    Some(e) if e.is_configuration() => EXIT_CONFIGURATION,
    _ => EXIT_FAILURE,
  }
}
