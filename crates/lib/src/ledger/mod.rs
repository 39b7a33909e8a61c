//! Installation ledger: which formulas are installed, how, and where.
//!
//! # Storage layout
//!
//! ```text
//! {data_dir}/ledger/
//! ├── gettext.json     # LedgerEntry
//! ├── php.json
//! └── php.json.tmp     # in-flight write, discarded on open
//! ```
//!
//! An entry is written to a temporary file, synced, and renamed into place,
//! so a reader sees either the previous entry or the new one. Writes to one
//! name are serialised through a per-name async mutex; different names write
//! concurrently.

mod types;

pub use types::{LedgerEntry, LedgerError};

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::execute::types::{BuildResult, unix_now};
use crate::resolve::ResolvedTarget;

const ENTRY_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

/// Handle to the on-disk ledger.
#[derive(Debug)]
pub struct Ledger {
  dir: PathBuf,
  locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Ledger {
  /// Open (creating if needed) the ledger in `dir`.
  ///
  /// Leftover `*.tmp` files from an interrupted write are removed.
  pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
    let dir = dir.into();
    std::fs::create_dir_all(&dir).map_err(LedgerError::io(&dir))?;

    for entry in std::fs::read_dir(&dir).map_err(LedgerError::io(&dir))? {
      let path = entry.map_err(LedgerError::io(&dir))?.path();
      if path.extension().is_some_and(|ext| ext == TMP_EXT) {
        warn!(path = %path.display(), "discarding interrupted ledger write");
        std::fs::remove_file(&path).map_err(LedgerError::io(&path))?;
      }
    }

    Ok(Self {
      dir,
      locks: Mutex::new(HashMap::new()),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn entry_path(&self, name: &str) -> PathBuf {
    self.dir.join(format!("{name}.{ENTRY_EXT}"))
  }

  fn key_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
    locks.entry(name.to_string()).or_default().clone()
  }

  /// Record a successful build of `target`.
  ///
  /// A reinstall keeps `installed_on_request` if the previous entry had it.
  pub async fn record(
    &self,
    target: &ResolvedTarget,
    result: &BuildResult,
    on_request: bool,
  ) -> Result<LedgerEntry, LedgerError> {
    let name = target.name();
    if !result.is_succeeded() {
      return Err(LedgerError::NotInstalled { name: name.to_string() });
    }

    let lock = self.key_lock(name);
    let _guard = lock.lock().await;

    let previously_requested = self.read_entry(name).await?.is_some_and(|e| e.installed_on_request);
    let entry = LedgerEntry {
      name: name.to_string(),
      version: target.version().to_string(),
      options: target.options.clone(),
      manifest: result.manifest.clone(),
      installed_at: result.finished_at.unwrap_or_else(unix_now),
      dependencies: target.dependency_names().map(str::to_string).collect(),
      installed_on_request: on_request || previously_requested,
    };

    self.write_entry(&entry).await?;
    info!(formula = name, version = %entry.version, files = entry.manifest.len(), "recorded install");
    Ok(entry)
  }

  /// The entry for `name`, if installed.
  pub async fn lookup(&self, name: &str) -> Result<Option<LedgerEntry>, LedgerError> {
    self.read_entry(name).await
  }

  /// True when `name` is installed with exactly `options`.
  pub async fn is_satisfied(&self, name: &str, options: &BTreeSet<String>) -> Result<bool, LedgerError> {
    Ok(self.read_entry(name).await?.is_some_and(|e| e.matches(options)))
  }

  /// Flag an existing entry as requested by the user.
  pub async fn mark_on_request(&self, name: &str) -> Result<(), LedgerError> {
    let lock = self.key_lock(name);
    let _guard = lock.lock().await;

    let mut entry = self
      .read_entry(name)
      .await?
      .ok_or_else(|| LedgerError::UnknownEntry { name: name.to_string() })?;
    if !entry.installed_on_request {
      entry.installed_on_request = true;
      self.write_entry(&entry).await?;
    }
    Ok(())
  }

  /// Delete the entry for `name` and return it.
  pub async fn remove(&self, name: &str) -> Result<LedgerEntry, LedgerError> {
    let lock = self.key_lock(name);
    let _guard = lock.lock().await;

    let entry = self
      .read_entry(name)
      .await?
      .ok_or_else(|| LedgerError::UnknownEntry { name: name.to_string() })?;
    let path = self.entry_path(name);
    fs::remove_file(&path).await.map_err(LedgerError::io(&path))?;
    info!(formula = name, "removed ledger entry");
    Ok(entry)
  }

  /// All entries, sorted by name.
  pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
    let mut dir = fs::read_dir(&self.dir).await.map_err(LedgerError::io(&self.dir))?;
    let mut entries = Vec::new();
    while let Some(item) = dir.next_entry().await.map_err(LedgerError::io(&self.dir))? {
      let path = item.path();
      if path.extension().is_some_and(|ext| ext == ENTRY_EXT) {
        entries.push(parse_entry(&path).await?);
      }
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
  }

  /// Names of installed formulas that were built against `name`.
  pub async fn dependents_of(&self, name: &str) -> Result<Vec<String>, LedgerError> {
    Ok(
      self
        .entries()
        .await?
        .into_iter()
        .filter(|e| e.dependencies.iter().any(|d| d == name))
        .map(|e| e.name)
        .collect(),
    )
  }

  async fn read_entry(&self, name: &str) -> Result<Option<LedgerEntry>, LedgerError> {
    let path = self.entry_path(name);
    match fs::try_exists(&path).await {
      Ok(true) => parse_entry(&path).await.map(Some),
      Ok(false) => Ok(None),
      Err(e) => Err(LedgerError::Io { path, source: e }),
    }
  }

  async fn write_entry(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
    let path = self.entry_path(&entry.name);
    let temp_path = self.dir.join(format!("{}.{ENTRY_EXT}.{TMP_EXT}", entry.name));

    let content = serde_json::to_vec_pretty(entry).map_err(|source| LedgerError::Serialize {
      name: entry.name.clone(),
      source,
    })?;

    if let Err(e) = write_synced(&temp_path, &content).await {
      let _ = fs::remove_file(&temp_path).await;
      return Err(e);
    }
    fs::rename(&temp_path, &path).await.map_err(LedgerError::io(&path))?;
    sync_dir(&self.dir).await?;
    debug!(path = %path.display(), "wrote ledger entry");
    Ok(())
  }
}

async fn write_synced(path: &Path, content: &[u8]) -> Result<(), LedgerError> {
  let mut file = fs::File::create(path).await.map_err(LedgerError::io(path))?;
  file.write_all(content).await.map_err(LedgerError::io(path))?;
  file.sync_all().await.map_err(LedgerError::io(path))?;
  Ok(())
}

/// Persist the directory entry created by a rename.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), LedgerError> {
  let handle = fs::File::open(dir).await.map_err(LedgerError::io(dir))?;
  handle.sync_all().await.map_err(LedgerError::io(dir))
}

// Directories cannot be opened as files on Windows; the rename is durable once it returns.
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), LedgerError> {
  Ok(())
}

async fn parse_entry(path: &Path) -> Result<LedgerEntry, LedgerError> {
  let content = fs::read(path).await.map_err(LedgerError::io(path))?;
  serde_json::from_slice(&content).map_err(|source| LedgerError::Corrupt {
    path: path.to_path_buf(),
    source,
  })
}
