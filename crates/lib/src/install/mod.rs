//! Install, uninstall and list: the operations the CLI exposes.
//!
//! Every mutating operation holds the exclusive store lock for its whole
//! duration. The ledger is opened after the lock is taken so crash recovery
//! never races a concurrent writer.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::EngineError;
use crate::execute::{ExecuteConfig, RunReport, execute_graph};
use crate::formula::{FormulaDescriptor, FormulaRegistry};
use crate::graph::{BuildGraph, GraphBuilder};
use crate::ledger::{Ledger, LedgerEntry, LedgerError};
use crate::platform::{Layout, paths};
use crate::resolve::{CapabilityProbe, PathProbe, ResolveRequest};
use crate::store_lock::{LockMode, StoreLock};

/// Formulas, probe and directories for one invocation.
pub struct Engine {
  registry: FormulaRegistry,
  probe: Box<dyn CapabilityProbe>,
  config: ExecuteConfig,
  data_dir: PathBuf,
}

impl Engine {
  /// `data_dir` holds the ledger and the store lock.
  pub fn new(
    registry: FormulaRegistry,
    probe: impl CapabilityProbe + 'static,
    config: ExecuteConfig,
    data_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      registry,
      probe: Box::new(probe),
      config,
      data_dir: data_dir.into(),
    }
  }

  /// Engine over `registry` using the environment's directories and a `PATH` probe.
  pub fn from_env(registry: FormulaRegistry) -> Self {
    Self::new(registry, PathProbe::new(), ExecuteConfig::default(), paths::data_dir())
  }

  pub fn registry(&self) -> &FormulaRegistry {
    &self.registry
  }

  pub fn config(&self) -> &ExecuteConfig {
    &self.config
  }

  pub fn config_mut(&mut self) -> &mut ExecuteConfig {
    &mut self.config
  }

  pub fn layout(&self) -> &Layout {
    &self.config.layout
  }

  fn ledger_dir(&self) -> PathBuf {
    self.data_dir.join("ledger")
  }

  fn lock(&self, mode: LockMode, command: &str) -> Result<StoreLock, EngineError> {
    Ok(StoreLock::acquire(&self.data_dir, mode, command)?)
  }

  /// Resolve `roots` into a graph without building anything.
  pub fn plan(&self, roots: &[(String, ResolveRequest)]) -> Result<BuildGraph, EngineError> {
    Ok(GraphBuilder::new(&self.registry, self.probe.as_ref()).build(roots)?)
  }

  /// Build and record `roots` and everything they depend on.
  ///
  /// Configuration errors surface before any build starts; build failures are
  /// reported in the returned `RunReport`.
  pub async fn install(
    &self,
    roots: &[(String, ResolveRequest)],
    cancel: &CancellationToken,
  ) -> Result<RunReport, EngineError> {
    let graph = Arc::new(self.plan(roots)?);
    let command = format!(
      "keg install {}",
      roots.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>().join(" ")
    );
    let _lock = self.lock(LockMode::Exclusive, &command)?;
    let ledger = Arc::new(Ledger::open(self.ledger_dir())?);

    info!(roots = roots.len(), targets = graph.len(), "installing");
    let mut report = execute_graph(graph.clone(), ledger, &self.config, cancel).await?;

    for (name, _) in roots {
      let installed = report.results.get(name).is_some_and(|r| r.is_satisfied());
      if let Some(target) = graph.get(name).filter(|_| installed)
        && let Some(text) = render_caveats(&target.descriptor, &target.options, self.layout())
      {
        report.caveats.insert(name.clone(), text);
      }
    }
    Ok(report)
  }

  /// Remove an installed formula's files and its ledger entry.
  ///
  /// Refuses while another installed formula was built against it, unless
  /// `force` is set. Files installed outside the keg (configuration under the
  /// sysconf dir) are left in place.
  pub async fn uninstall(&self, name: &str, force: bool) -> Result<LedgerEntry, EngineError> {
    let _lock = self.lock(LockMode::Exclusive, &format!("keg uninstall {name}"))?;
    let ledger = Ledger::open(self.ledger_dir())?;

    let entry = ledger
      .lookup(name)
      .await?
      .ok_or_else(|| LedgerError::UnknownEntry { name: name.to_string() })?;

    let dependents = ledger.dependents_of(name).await?;
    if !dependents.is_empty() {
      if !force {
        return Err(EngineError::HasDependents {
          name: name.to_string(),
          dependents,
        });
      }
      warn!(formula = name, dependents = ?dependents, "uninstalling despite dependents");
    }

    for path in &entry.manifest {
      match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => debug!(path = %path.display(), "already gone"),
        Err(source) => {
          return Err(EngineError::Remove {
            path: path.clone(),
            source,
          });
        }
      }
    }

    let keg = self.layout().keg(name, &entry.version);
    prune_empty_dirs(&keg);
    if let Some(parent) = keg.parent() {
      let _ = std::fs::remove_dir(parent);
    }

    let removed = ledger.remove(name).await?;
    info!(formula = name, version = %removed.version, files = removed.manifest.len(), "uninstalled");
    Ok(removed)
  }

  /// Installed formulas, sorted by name.
  pub async fn list(&self) -> Result<Vec<LedgerEntry>, EngineError> {
    let _lock = self.lock(LockMode::Shared, "keg list")?;
    let ledger = Ledger::open(self.ledger_dir())?;
    Ok(ledger.entries().await?)
  }

  /// Caveats of `name` for the given option set, with layout placeholders filled in.
  pub fn caveats(&self, name: &str, options: &BTreeSet<String>) -> Option<String> {
    self.registry.get(name).and_then(|d| render_caveats(d, options, self.layout()))
  }
}

/// Joins the caveat sections whose gate holds for `options` and fills
/// `{prefix}`, `{etc}`, `{var}` and `{root}`. `None` when no section applies.
pub fn render_caveats(descriptor: &FormulaDescriptor, options: &BTreeSet<String>, layout: &Layout) -> Option<String> {
  let sections: Vec<&str> = descriptor
    .caveats
    .iter()
    .filter(|c| c.when.holds(|flag| options.contains(flag)))
    .map(|c| c.text.as_str())
    .collect();
  if sections.is_empty() {
    return None;
  }

  let prefix = layout.keg(&descriptor.name, &descriptor.version);
  Some(
    sections
      .join("\n\n")
      .replace("{prefix}", &prefix.to_string_lossy())
      .replace("{etc}", &layout.sysconf_dir.to_string_lossy())
      .replace("{var}", &layout.localstate_dir.to_string_lossy())
      .replace("{root}", &layout.root.to_string_lossy()),
  )
}

/// Remove empty directories under `root`, deepest first, including `root`.
fn prune_empty_dirs(root: &Path) {
  for entry in WalkDir::new(root).contents_first(true).into_iter().filter_map(Result::ok) {
    if entry.file_type().is_dir() && std::fs::remove_dir(entry.path()).is_ok() {
      debug!(path = %entry.path().display(), "pruned empty directory");
    }
  }
}
