//! Subprocess execution for build steps.
//!
//! Every step runs in an isolated environment and streams its output, line
//! by line, into the target's append-only build log.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::consts::SOURCE_DATE_EPOCH;
use crate::execute::types::BuildError;

/// Append-only log shared by every subprocess of one target.
#[derive(Debug, Clone)]
pub struct BuildLog {
  path: PathBuf,
  file: Arc<Mutex<File>>,
}

impl BuildLog {
  /// Open (or create) the log at `path`, appending to earlier runs.
  pub async fn open(path: &Path) -> std::io::Result<Self> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(Self {
      path: path.to_path_buf(),
      file: Arc::new(Mutex::new(file)),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Append one line.
  pub async fn line(&self, text: &str) -> std::io::Result<()> {
    self.write_line(text.as_bytes()).await
  }

  /// Append raw bytes as one line. Output is not required to be UTF-8.
  async fn write_line(&self, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = self.file.lock().await;
    file.write_all(bytes).await?;
    file.write_all(b"\n").await?;
    file.flush().await
  }

  /// Write a `==> heading` line marking the start of a step.
  pub async fn heading(&self, text: &str) -> std::io::Result<()> {
    self.line(&format!("==> {text}")).await
  }
}

/// Environment for build subprocesses.
///
/// Built from scratch: nothing leaks in from the parent process.
#[derive(Debug, Clone, Default)]
pub struct BuildEnv {
  vars: BTreeMap<String, String>,
}

impl BuildEnv {
  /// Isolated environment for a build rooted at `prefix`.
  ///
  /// `path_dirs` come first on `PATH` (dependency `bin` directories),
  /// followed by `shell_path`.
  pub fn new(prefix: &Path, tmp_dir: &Path, path_dirs: &[PathBuf], shell_path: &str, make_jobs: usize) -> Self {
    let mut path: Vec<String> = path_dirs.iter().map(|d| d.to_string_lossy().into_owned()).collect();
    if !shell_path.is_empty() {
      path.push(shell_path.to_string());
    }

    let tmp = tmp_dir.to_string_lossy().into_owned();
    let mut vars = BTreeMap::new();
    vars.insert("PATH".to_string(), path.join(":"));
    vars.insert("HOME".to_string(), tmp.clone());
    vars.insert("TMPDIR".to_string(), tmp.clone());
    vars.insert("TMP".to_string(), tmp.clone());
    vars.insert("TEMP".to_string(), tmp);
    vars.insert("LANG".to_string(), "C".to_string());
    vars.insert("LC_ALL".to_string(), "C".to_string());
    vars.insert("SOURCE_DATE_EPOCH".to_string(), SOURCE_DATE_EPOCH.to_string());
    vars.insert("PREFIX".to_string(), prefix.to_string_lossy().into_owned());
    vars.insert("MAKEFLAGS".to_string(), format!("-j{}", make_jobs.max(1)));
    Self { vars }
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn set(&mut self, key: &str, value: impl Into<String>) {
    self.vars.insert(key.to_string(), value.into());
  }

  fn apply(&self, command: &mut Command) {
    command.env_clear().envs(&self.vars);
  }
}

/// One subprocess invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  /// Bytes written to the child's stdin, which is closed afterwards.
  pub stdin: Option<Vec<u8>>,
}

impl Invocation {
  pub fn new(program: &str, args: Vec<String>, cwd: &Path) -> Self {
    Self {
      program: program.to_string(),
      args,
      cwd: cwd.to_path_buf(),
      stdin: None,
    }
  }

  /// The command line as shown in logs.
  pub fn display(&self) -> String {
    std::iter::once(self.program.as_str())
      .chain(self.args.iter().map(String::as_str))
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// How a subprocess ended.
#[derive(Debug)]
pub enum Outcome {
  Exited(ExitStatus),
  /// Cancellation arrived while the subprocess was running.
  Cancelled,
}

/// Run `invocation`, streaming stdout and stderr into `log`.
///
/// Nothing is spawned once `cancel` has fired. If it fires while the child
/// runs, the child gets `kill_grace` to exit on its own and is then killed.
pub async fn run_logged(
  invocation: &Invocation,
  env: &BuildEnv,
  log: &BuildLog,
  kill_grace: Duration,
  cancel: &CancellationToken,
) -> Result<Outcome, BuildError> {
  if cancel.is_cancelled() {
    return Ok(Outcome::Cancelled);
  }

  log.heading(&invocation.display()).await?;
  debug!(command = %invocation.display(), cwd = ?invocation.cwd, "spawning process");

  let mut command = Command::new(&invocation.program);
  command
    .args(&invocation.args)
    .current_dir(&invocation.cwd)
    .stdin(if invocation.stdin.is_some() {
      Stdio::piped()
    } else {
      Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  env.apply(&mut command);

  let mut child = command.spawn().map_err(|e| BuildError::StepError {
    step: invocation.display(),
    message: format!("failed to spawn {}: {e}", invocation.program),
  })?;

  if let (Some(mut stdin), Some(data)) = (child.stdin.take(), invocation.stdin.clone()) {
    tokio::spawn(async move {
      if let Err(e) = stdin.write_all(&data).await {
        debug!(error = %e, "child closed stdin early");
      }
    });
  }

  let pumps = [
    child.stdout.take().map(|out| tokio::spawn(pump(out, log.clone()))),
    child.stderr.take().map(|err| tokio::spawn(pump(err, log.clone()))),
  ];

  let outcome = tokio::select! {
    status = child.wait() => Outcome::Exited(status?),
    _ = cancel.cancelled() => {
      match tokio::time::timeout(kill_grace, child.wait()).await {
        Ok(status) => {
          status?;
        }
        Err(_) => {
          warn!(command = %invocation.display(), "subprocess outlived the grace period, killing");
          child.kill().await?;
        }
      }
      Outcome::Cancelled
    }
  };

  // A killed child can leave grandchildren holding the pipes open.
  for pump in pumps.into_iter().flatten() {
    let abort = pump.abort_handle();
    match tokio::time::timeout(kill_grace, pump).await {
      Ok(Ok(Err(e))) => warn!(error = %e, log = %log.path().display(), "failed to write build log"),
      Err(_) => abort.abort(),
      Ok(_) => {}
    }
  }

  Ok(outcome)
}

/// Copy `reader` into `log` line by line until EOF.
///
/// The pipe is drained even after a log write fails, so the child never sees
/// a closed pipe. The first write error is returned at the end.
async fn pump<R: AsyncRead + Unpin>(reader: R, log: BuildLog) -> std::io::Result<()> {
  let mut reader = BufReader::new(reader);
  let mut buf = Vec::new();
  let mut first_error = None;
  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
      break;
    }
    if buf.last() == Some(&b'\n') {
      buf.pop();
    }
    if first_error.is_none()
      && let Err(e) = log.write_line(&buf).await
    {
      first_error = Some(e);
    }
  }
  first_error.map_or(Ok(()), Err)
}
