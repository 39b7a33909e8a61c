//! Formula descriptors and the registry they are loaded into.
//!
//! Descriptors are JSON files named `<formula>.json` in a formula directory.
//! The registry is loaded once per engine invocation and shared read-only.

pub mod argument;
pub mod types;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

pub use argument::{ArgValue, BuildArgument, PathRef, RenderContext, RenderError};
pub use types::{
  BuildStep, CaveatSpec, Checksum, Condition, DependencyEdge, EnvSpec, FormulaDescriptor, OptionSpec, PatchSource,
  PatchSpec, RequirementKind, SourceSpec, StepSpec,
};

/// Errors raised while loading formula descriptors.
#[derive(Debug, Error)]
pub enum FormulaError {
  #[error("failed to read formula directory {}: {source}", .path.display())]
  ReadDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read formula {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse formula {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("formula file {} declares name '{declared}'", .path.display())]
  NameMismatch { path: PathBuf, declared: String },

  #[error("formula '{0}' is defined more than once")]
  Duplicate(String),

  #[error("no formula named '{0}'")]
  NotFound(String),
}

/// All formulas known to one engine invocation.
#[derive(Debug, Clone, Default)]
pub struct FormulaRegistry {
  formulas: BTreeMap<String, Arc<FormulaDescriptor>>,
}

impl FormulaRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load every `*.json` descriptor in `dir`.
  ///
  /// Patch files are resolved relative to `dir`.
  pub fn load_dir(dir: &Path) -> Result<Self, FormulaError> {
    let read_dir = fs::read_dir(dir).map_err(|source| FormulaError::ReadDir {
      path: dir.to_path_buf(),
      source,
    })?;

    let mut paths = Vec::new();
    for entry in read_dir {
      let entry = entry.map_err(|source| FormulaError::ReadDir {
        path: dir.to_path_buf(),
        source,
      })?;
      let path = entry.path();
      if path.extension().is_some_and(|ext| ext == "json") {
        paths.push(path);
      }
    }
    paths.sort();

    let mut registry = Self::new();
    for path in paths {
      let descriptor = load_file(&path, dir)?;
      debug!(formula = %descriptor.name, path = %path.display(), "loaded formula");
      registry.insert(descriptor)?;
    }

    Ok(registry)
  }

  /// Add a descriptor, rejecting duplicate names.
  pub fn insert(&mut self, descriptor: FormulaDescriptor) -> Result<(), FormulaError> {
    if self.formulas.contains_key(&descriptor.name) {
      return Err(FormulaError::Duplicate(descriptor.name));
    }
    self.formulas.insert(descriptor.name.clone(), Arc::new(descriptor));
    Ok(())
  }

  pub fn get(&self, name: &str) -> Option<&Arc<FormulaDescriptor>> {
    self.formulas.get(name)
  }

  pub fn require(&self, name: &str) -> Result<&Arc<FormulaDescriptor>, FormulaError> {
    self.get(name).ok_or_else(|| FormulaError::NotFound(name.to_string()))
  }

  pub fn names(&self) -> impl Iterator<Item = &String> {
    self.formulas.keys()
  }

  pub fn len(&self) -> usize {
    self.formulas.len()
  }

  pub fn is_empty(&self) -> bool {
    self.formulas.is_empty()
  }
}

fn load_file(path: &Path, dir: &Path) -> Result<FormulaDescriptor, FormulaError> {
  let content = fs::read_to_string(path).map_err(|source| FormulaError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let mut descriptor: FormulaDescriptor = serde_json::from_str(&content).map_err(|source| FormulaError::Parse {
    path: path.to_path_buf(),
    source,
  })?;

  let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
  if stem != descriptor.name {
    return Err(FormulaError::NameMismatch {
      path: path.to_path_buf(),
      declared: descriptor.name,
    });
  }

  for patch in &mut descriptor.patches {
    if let PatchSource::File(file) = &mut patch.source
      && file.is_relative()
    {
      *file = dir.join(&*file);
    }
  }

  Ok(descriptor)
}
