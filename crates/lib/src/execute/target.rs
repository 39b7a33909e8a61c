//! Building a single resolved target.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::actions::{
  BuildEnv, BuildLog, Invocation, Outcome, apply_patches, fetch_source, inreplace, install_file, run_logged, unpack,
};
use super::types::{BuildError, BuildResult, ExecuteConfig};
use crate::formula::{BuildStep, RenderContext};
use crate::resolve::ResolvedTarget;

/// Everything a step needs besides the step itself.
struct StepContext<'a> {
  target: &'a ResolvedTarget,
  render: RenderContext<'a>,
  src_dir: &'a Path,
  env: &'a BuildEnv,
  log: &'a BuildLog,
  config: &'a ExecuteConfig,
  cancel: &'a CancellationToken,
}

/// Build `target` and install it into its keg.
///
/// `dependencies` maps each dependency name to its keg prefix. The scratch
/// directory is removed on every exit path; the build log is kept.
pub async fn execute(
  target: &ResolvedTarget,
  dependencies: &BTreeMap<String, PathBuf>,
  config: &ExecuteConfig,
  cancel: &CancellationToken,
) -> BuildResult {
  let mut result = BuildResult::pending(target.name(), target.version());
  let log_path = config.logs_dir.join(format!("{}.log", target.name()));
  result.start(log_path.clone());
  info!(formula = target.name(), version = target.version(), "building");

  match build(target, dependencies, config, cancel, &log_path).await {
    Ok(manifest) => {
      info!(formula = target.name(), files = manifest.len(), "build succeeded");
      result.succeed(manifest);
    }
    Err(e) => {
      error!(formula = target.name(), error = %e, log = %log_path.display(), "build failed");
      result.fail(e);
    }
  }
  result
}

async fn build(
  target: &ResolvedTarget,
  dependencies: &BTreeMap<String, PathBuf>,
  config: &ExecuteConfig,
  cancel: &CancellationToken,
  log_path: &Path,
) -> Result<Vec<PathBuf>, BuildError> {
  let name = target.name();
  let version = target.version();
  if cancel.is_cancelled() {
    return Err(BuildError::Cancelled { step: None });
  }

  let log = BuildLog::open(log_path).await?;
  log.heading(&format!("{name} {version}")).await?;
  if !target.options.is_empty() {
    log.line(&format!("options: {}", target.options.iter().cloned().collect::<Vec<_>>().join(" "))).await?;
  }

  let work_root = config.work_dir();
  tokio::fs::create_dir_all(&work_root).await?;
  let work = tempfile::Builder::new()
    .prefix(&format!("{name}-{version}-"))
    .tempdir_in(&work_root)?;
  debug!(work_dir = %work.path().display(), "created work directory");

  let archive = fetch_source(&target.descriptor.source, &format!("{name}-{version}"), &config.downloads_dir()).await?;
  log.line(&format!("fetched {}", target.descriptor.source.url)).await?;

  let unpack_dest = work.path().join("src");
  let src_dir = tokio::task::spawn_blocking(move || unpack(&archive, &unpack_dest))
    .await
    .map_err(|e| BuildError::Io { message: e.to_string() })??;

  let tmp_dir = work.path().join("tmp");
  tokio::fs::create_dir_all(&tmp_dir).await?;

  let prefix = config.layout.keg(name, version);
  let render = RenderContext {
    layout: &config.layout,
    prefix: prefix.clone(),
    dependencies,
  };
  let bin_dirs: Vec<PathBuf> = dependencies.values().map(|p| p.join("bin")).collect();
  let mut env = BuildEnv::new(&prefix, &tmp_dir, &bin_dirs, &config.shell_path, config.make_jobs);
  for (key, value) in &target.environment {
    let value = render.render_value(value).map_err(|e| BuildError::StepError {
      step: "environment".to_string(),
      message: format!("{key}: {e}"),
    })?;
    log.line(&format!("{key}={value}")).await?;
    env.set(key, value);
  }

  apply_patches(
    &target.descriptor.patches,
    &src_dir,
    &env,
    &log,
    config.kill_grace,
    cancel,
  )
  .await?;

  if tokio::fs::try_exists(&prefix).await? {
    warn!(prefix = %prefix.display(), "removing stale keg");
    tokio::fs::remove_dir_all(&prefix).await?;
  }

  let ctx = StepContext {
    target,
    render,
    src_dir: &src_dir,
    env: &env,
    log: &log,
    config,
    cancel,
  };

  for step in &target.steps {
    if cancel.is_cancelled() {
      return Err(BuildError::Cancelled {
        step: Some(step.label()),
      });
    }
    run_step(step, &ctx).await?;
  }

  let manifest = collect_manifest(&prefix)?;
  log.line(&format!("installed {} files into {}", manifest.len(), prefix.display())).await?;
  Ok(manifest)
}

async fn run_step(step: &BuildStep, ctx: &StepContext<'_>) -> Result<(), BuildError> {
  let render_failed = |e: crate::formula::RenderError| BuildError::StepError {
    step: step.label(),
    message: e.to_string(),
  };

  let invocation = match step {
    BuildStep::Configure { script } => {
      let mut args = vec![script.clone()];
      args.extend(ctx.render.render_all(&ctx.target.arguments).map_err(render_failed)?);
      Invocation::new("sh", args, ctx.src_dir)
    }
    BuildStep::Make { targets } => Invocation::new("make", targets.clone(), ctx.src_dir),
    BuildStep::Run { program, args } => {
      let args = args
        .iter()
        .map(|a| ctx.render.render_value(a))
        .collect::<Result<Vec<_>, _>>()
        .map_err(render_failed)?;
      Invocation::new(program, args, ctx.src_dir)
    }
    BuildStep::Inreplace { file, from, to } => {
      let to = ctx.render.render_value(to).map_err(render_failed)?;
      ctx.log.heading(&step.label()).await?;
      return inreplace(ctx.src_dir, file, from, &to).await;
    }
    BuildStep::Install { from, to, overwrite } => {
      let dest = ctx.render.resolve_path(to).map_err(render_failed)?;
      ctx.log.heading(&format!("{} -> {}", step.label(), dest.display())).await?;
      install_file(ctx.src_dir, from, &dest, *overwrite).await?;
      return Ok(());
    }
  };

  match run_logged(&invocation, ctx.env, ctx.log, ctx.config.kill_grace, ctx.cancel).await? {
    Outcome::Exited(status) if status.success() => Ok(()),
    Outcome::Exited(status) => Err(BuildError::StepFailed {
      step: step.label(),
      code: status.code(),
      log: ctx.log.path().to_path_buf(),
    }),
    Outcome::Cancelled => Err(BuildError::Cancelled {
      step: Some(step.label()),
    }),
  }
}

/// Every non-directory entry under `prefix`, sorted.
fn collect_manifest(prefix: &Path) -> Result<Vec<PathBuf>, BuildError> {
  if !prefix.exists() {
    return Ok(Vec::new());
  }

  let mut manifest = Vec::new();
  for entry in WalkDir::new(prefix).sort_by_file_name() {
    let entry = entry.map_err(std::io::Error::from)?;
    if !entry.file_type().is_dir() {
      manifest.push(entry.into_path());
    }
  }
  Ok(manifest)
}

#[cfg(all(test, unix))]
mod tests {
  use std::sync::Arc;
  use std::time::Duration;

  use super::*;
  use crate::execute::types::BuildStatus;
  use crate::formula::{ArgValue, BuildArgument, Checksum, EnvSpec, PathRef, SourceSpec, StepSpec};
  use crate::platform::Layout;
  use crate::resolve::{NoProbe, ResolveRequest, resolve};
  use crate::util::hash::{HashAlgorithm, hash_file};
  use crate::util::testutil::{configure_script, local_descriptor, local_descriptor_for, write_tarball};
  use tempfile::TempDir;

  fn config(temp: &TempDir) -> ExecuteConfig {
    ExecuteConfig {
      parallelism: 2,
      layout: Layout::new(temp.path().join("root")),
      logs_dir: temp.path().join("logs"),
      cache_dir: temp.path().join("cache"),
      shell_path: "/usr/bin:/bin".to_string(),
      kill_grace: Duration::from_secs(2),
      make_jobs: 1,
    }
  }

  fn resolved(desc: crate::formula::FormulaDescriptor) -> ResolvedTarget {
    resolve(&Arc::new(desc), &ResolveRequest::default(), &NoProbe).unwrap()
  }

  fn work_dir_is_empty(config: &ExecuteConfig) -> bool {
    std::fs::read_dir(config.work_dir()).map(|mut d| d.next().is_none()).unwrap_or(true)
  }

  #[tokio::test]
  async fn builds_and_records_manifest() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let mut desc = local_descriptor(temp.path(), "hello", &[]);
    desc
      .arguments
      .push(BuildArgument::set("prefix", PathRef::Prefix { sub: String::new() }));
    let target = resolved(desc);

    let result = execute(&target, &BTreeMap::new(), &config, &CancellationToken::new()).await;

    assert_eq!(result.status, BuildStatus::Succeeded, "{:?}", result.error);
    let installed = config.layout.keg("hello", "1.0").join("bin/hello");
    assert_eq!(result.manifest, vec![installed.clone()]);
    assert!(installed.exists());

    let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
    assert!(log.contains(&format!("configure --prefix={}", config.layout.keg("hello", "1.0").display())));
    assert!(work_dir_is_empty(&config));
  }

  #[tokio::test]
  async fn failing_step_names_step_and_log() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let tarball = write_tarball(temp.path(), "broken", "#!/bin/sh\necho 'checking for cc... no' >&2\nexit 77\n", &[]);
    let target = resolved(local_descriptor_for(&tarball, "broken", &[]));

    let result = execute(&target, &BTreeMap::new(), &config, &CancellationToken::new()).await;

    assert_eq!(result.status, BuildStatus::Failed);
    match result.error.unwrap() {
      BuildError::StepFailed { step, code, log } => {
        assert_eq!(step, "./configure");
        assert_eq!(code, Some(77));
        assert!(std::fs::read_to_string(log).unwrap().contains("checking for cc... no"));
      }
      other => panic!("unexpected error {other:?}"),
    }
    assert!(work_dir_is_empty(&config));
  }

  #[tokio::test]
  async fn checksum_mismatch_fails_before_any_step() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let mut desc = local_descriptor(temp.path(), "tampered", &[]);
    desc.source.checksum = Checksum::sha256(&"ab".repeat(32));
    let target = resolved(desc);

    let result = execute(&target, &BTreeMap::new(), &config, &CancellationToken::new()).await;

    assert!(matches!(result.error, Some(BuildError::ChecksumMismatch { .. })));
    assert!(!config.layout.keg("tampered", "1.0").exists());
  }

  #[tokio::test]
  async fn dependency_prefixes_are_rendered_and_on_path() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);

    let readline = config.layout.keg("readline", "6.2");
    std::fs::create_dir_all(readline.join("bin")).unwrap();

    let mut desc = local_descriptor(temp.path(), "php", &["readline"]);
    desc.arguments.push(BuildArgument::with(
      "readline",
      Some(ArgValue::Path(PathRef::Dependency {
        formula: "readline".to_string(),
        sub: String::new(),
      })),
    ));
    desc.steps.insert(
      1,
      StepSpec::from(BuildStep::Run {
        program: "sh".to_string(),
        args: vec![ArgValue::from("-c"), ArgValue::from("echo \"path=$PATH\"")],
      }),
    );
    let target = resolved(desc);
    let deps = BTreeMap::from([("readline".to_string(), readline.clone())]);

    let result = execute(&target, &deps, &config, &CancellationToken::new()).await;
    assert!(result.is_succeeded(), "{:?}", result.error);

    let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
    assert!(log.contains(&format!("--with-readline={}", readline.display())));
    assert!(log.contains(&format!("path={}/bin:/usr/bin:/bin", readline.display())));
  }

  #[tokio::test]
  async fn descriptor_environment_reaches_every_step() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let mut desc = local_descriptor(temp.path(), "php", &[]);
    desc.environment = vec![
      EnvSpec::new("CFLAGS", "-O3"),
      EnvSpec::new("PHP_DATA", ArgValue::Path(PathRef::Prefix { sub: "share".to_string() })),
    ];
    desc.steps.insert(
      0,
      StepSpec::from(BuildStep::Run {
        program: "sh".to_string(),
        args: vec![ArgValue::from("-c"), ArgValue::from("echo \"cflags=$CFLAGS data=$PHP_DATA\"")],
      }),
    );
    let target = resolved(desc);

    let result = execute(&target, &BTreeMap::new(), &config, &CancellationToken::new()).await;
    assert!(result.is_succeeded(), "{:?}", result.error);

    let log = std::fs::read_to_string(result.log_path.unwrap()).unwrap();
    let share = config.layout.keg("php", "1.0").join("share");
    assert!(log.contains(&format!("cflags=-O3 data={}", share.display())), "{log}");
  }

  #[tokio::test]
  async fn bzip2_source_pinned_by_sha1_installs() {
    use std::io::{Read, Write};

    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let gz = write_tarball(temp.path(), "gnupg2", &configure_script(), &[]);
    let mut tar_bytes = Vec::new();
    flate2::read::GzDecoder::new(std::fs::File::open(&gz).unwrap())
      .read_to_end(&mut tar_bytes)
      .unwrap();
    let bz2 = temp.path().join("gnupg-2.0.18.tar.bz2");
    let mut encoder = bzip2::write::BzEncoder::new(std::fs::File::create(&bz2).unwrap(), bzip2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap();

    let mut desc = local_descriptor_for(&gz, "gnupg2", &[]);
    desc.source = SourceSpec {
      url: format!("file://{}", bz2.display()),
      checksum: Checksum::sha1(&hash_file(&bz2, HashAlgorithm::Sha1).unwrap()),
    };
    std::fs::remove_file(&gz).unwrap();
    let target = resolved(desc);

    let result = execute(&target, &BTreeMap::new(), &config, &CancellationToken::new()).await;
    assert!(result.is_succeeded(), "{:?}", result.error);
    assert!(config.layout.keg("gnupg2", "1.0").join("bin/gnupg2").is_file());
  }

  #[tokio::test]
  async fn stale_keg_is_replaced() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let keg = config.layout.keg("hello", "1.0");
    std::fs::create_dir_all(keg.join("share")).unwrap();
    std::fs::write(keg.join("share/leftover"), "partial").unwrap();

    let target = resolved(local_descriptor(temp.path(), "hello", &[]));
    let result = execute(&target, &BTreeMap::new(), &config, &CancellationToken::new()).await;

    assert!(result.is_succeeded(), "{:?}", result.error);
    assert!(!keg.join("share/leftover").exists());
  }

  #[tokio::test]
  async fn cancelled_token_fails_without_running_steps() {
    let temp = TempDir::new().unwrap();
    let config = config(&temp);
    let target = resolved(local_descriptor(temp.path(), "hello", &[]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = execute(&target, &BTreeMap::new(), &config, &cancel).await;

    assert!(matches!(result.error, Some(BuildError::Cancelled { .. })));
    assert!(!config.layout.keg("hello", "1.0").exists());
  }
}
