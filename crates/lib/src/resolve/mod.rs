//! Option resolution.
//!
//! Turns a descriptor plus a requested option set into a `ResolvedTarget`:
//! the concrete options, dependency set, argument list and step list one
//! build will use. Resolution is a pure function of its inputs (plus the
//! injected capability probe), so identical requests always yield identical
//! argument order.

pub mod probe;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::formula::{
  ArgValue, BuildArgument, BuildStep, DependencyEdge, FormulaDescriptor, OptionSpec, PathRef, RequirementKind,
};

pub use probe::{CapabilityProbe, FixedProbe, NoProbe, PathProbe, ProbeError};

/// Errors detected while resolving one formula's options.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
  #[error("{formula}: unknown option {option}")]
  UnknownOption { formula: String, option: String },

  #[error("{formula}: cannot specify more than one {group} variant ({first}, {second})")]
  ConflictingOptions {
    formula: String,
    group: String,
    first: String,
    second: String,
  },

  #[error("{formula}: references the prefix of '{dependency}', which is not a selected dependency")]
  DanglingDependencyRef { formula: String, dependency: String },
}

/// Options requested for one formula.
///
/// This is the only input that carries user intent into resolution; nothing
/// is read from process-wide state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ResolveRequest {
  pub options: BTreeSet<String>,
}

impl ResolveRequest {
  pub fn new<I, S>(options: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      options: options.into_iter().map(Into::into).collect(),
    }
  }
}

/// A dependency of a resolved target, with the options it must be built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDependency {
  pub name: String,
  pub kind: RequirementKind,
  pub options: BTreeSet<String>,
}

/// A formula instantiated with a concrete option selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
  pub descriptor: Arc<FormulaDescriptor>,
  /// Requested options plus everything they imply.
  pub options: BTreeSet<String>,
  pub arguments: Vec<BuildArgument>,
  pub dependencies: Vec<ResolvedDependency>,
  pub steps: Vec<BuildStep>,
  /// Extra build environment; a later entry for the same variable wins.
  pub environment: BTreeMap<String, ArgValue>,
}

impl ResolvedTarget {
  pub fn name(&self) -> &str {
    &self.descriptor.name
  }

  pub fn version(&self) -> &str {
    &self.descriptor.version
  }

  pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
    self.dependencies.iter().map(|d| d.name.as_str())
  }
}

/// Resolve `request` against `descriptor`.
pub fn resolve(
  descriptor: &Arc<FormulaDescriptor>,
  request: &ResolveRequest,
  probe: &dyn CapabilityProbe,
) -> Result<ResolvedTarget, ResolutionError> {
  let formula = descriptor.name.as_str();
  let all_options = descriptor.all_options();
  let by_flag: BTreeMap<&str, &OptionSpec> = all_options.iter().map(|o| (o.flag.as_str(), o)).collect();

  let unknown = |option: &str| ResolutionError::UnknownOption {
    formula: formula.to_string(),
    option: option.to_string(),
  };

  for option in &request.options {
    if !by_flag.contains_key(option.as_str()) {
      return Err(unknown(option));
    }
  }

  let selected = close_over_implies(&request.options, &by_flag).map_err(|o| unknown(&o))?;
  check_groups(formula, &all_options, &selected)?;

  // Effects are applied in declaration order, never request order.
  let active: Vec<&OptionSpec> = all_options.iter().filter(|o| selected.contains(&o.flag)).collect();

  let arguments = collect_arguments(descriptor, &active);
  let dependencies = collect_dependencies(descriptor, &active, &selected, probe);
  let steps: Vec<BuildStep> = descriptor
    .steps
    .iter()
    .filter(|s| s.when.holds(|flag| selected.contains(flag)))
    .map(|s| s.step.clone())
    .collect();
  let environment: BTreeMap<String, ArgValue> = descriptor
    .environment
    .iter()
    .filter(|e| e.when.holds(|flag| selected.contains(flag)))
    .map(|e| (e.name.clone(), e.value.clone()))
    .collect();

  let target = ResolvedTarget {
    descriptor: descriptor.clone(),
    options: selected,
    arguments,
    dependencies,
    steps,
    environment,
  };
  check_dependency_refs(&target)?;

  debug!(
    formula,
    options = ?target.options,
    dependencies = ?target.dependency_names().collect::<Vec<_>>(),
    "resolved formula"
  );

  Ok(target)
}

fn close_over_implies(
  requested: &BTreeSet<String>,
  by_flag: &BTreeMap<&str, &OptionSpec>,
) -> Result<BTreeSet<String>, String> {
  let mut selected = requested.clone();
  let mut queue: Vec<String> = requested.iter().cloned().collect();

  while let Some(flag) = queue.pop() {
    let Some(spec) = by_flag.get(flag.as_str()) else {
      return Err(flag);
    };
    for implied in &spec.implies {
      if !by_flag.contains_key(implied.as_str()) {
        return Err(implied.clone());
      }
      if selected.insert(implied.clone()) {
        queue.push(implied.clone());
      }
    }
  }

  Ok(selected)
}

fn check_groups(
  formula: &str,
  all_options: &[OptionSpec],
  selected: &BTreeSet<String>,
) -> Result<(), ResolutionError> {
  let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
  for option in all_options.iter().filter(|o| selected.contains(&o.flag)) {
    let Some(group) = option.group.as_deref() else {
      continue;
    };
    if let Some(first) = seen.insert(group, option.flag.as_str()) {
      return Err(ResolutionError::ConflictingOptions {
        formula: formula.to_string(),
        group: group.to_string(),
        first: first.to_string(),
        second: option.flag.clone(),
      });
    }
  }
  Ok(())
}

fn collect_arguments(descriptor: &FormulaDescriptor, active: &[&OptionSpec]) -> Vec<BuildArgument> {
  let removed: BTreeSet<&str> = active
    .iter()
    .flat_map(|o| o.removes_arguments.iter().map(String::as_str))
    .collect();

  let mut arguments: Vec<BuildArgument> = Vec::new();
  let base = descriptor.arguments.iter().filter(|a| !removed.contains(a.flag_name().as_str()));
  for argument in base.chain(active.iter().flat_map(|o| o.arguments.iter())) {
    if !arguments.contains(argument) {
      arguments.push(argument.clone());
    }
  }
  arguments
}

fn collect_dependencies(
  descriptor: &FormulaDescriptor,
  active: &[&OptionSpec],
  selected: &BTreeSet<String>,
  probe: &dyn CapabilityProbe,
) -> Vec<ResolvedDependency> {
  let removed: BTreeSet<&str> = active
    .iter()
    .flat_map(|o| o.removes_dependencies.iter().map(String::as_str))
    .collect();

  let mut dependencies: Vec<ResolvedDependency> = Vec::new();

  // Edges declared on the formula are gated by their kind; edges added by an
  // option are already gated by the option being selected.
  let base = descriptor.dependencies.iter().map(|e| (e, false));
  let added = active.iter().flat_map(|o| o.dependencies.iter()).map(|e| (e, true));

  for (edge, from_option) in base.chain(added) {
    if removed.contains(edge.name.as_str()) || !edge_selected(edge, from_option, selected, probe) {
      continue;
    }

    match dependencies.iter_mut().find(|d| d.name == edge.name) {
      Some(existing) => existing.options.extend(edge.options.iter().cloned()),
      None => dependencies.push(ResolvedDependency {
        name: edge.name.clone(),
        kind: edge.kind,
        options: edge.options.iter().cloned().collect(),
      }),
    }
  }

  dependencies
}

fn edge_selected(
  edge: &DependencyEdge,
  from_option: bool,
  selected: &BTreeSet<String>,
  probe: &dyn CapabilityProbe,
) -> bool {
  match edge.kind {
    RequirementKind::Required => true,
    RequirementKind::Optional => from_option || selected.contains(&format!("--with-{}", edge.name)),
    RequirementKind::Recommended => {
      if selected.contains(&format!("--without-{}", edge.name)) {
        return false;
      }
      match probe.detect(edge.capability()) {
        Ok(true) => {
          debug!(dependency = %edge.name, capability = edge.capability(), "system provides capability, skipping");
          false
        }
        Ok(false) => true,
        Err(e) => {
          warn!(dependency = %edge.name, error = %e, "capability probe failed, requiring dependency");
          true
        }
      }
    }
  }
}

fn as_path(value: &ArgValue) -> Option<&PathRef> {
  match value {
    ArgValue::Path(path) => Some(path),
    ArgValue::Literal(_) => None,
  }
}

fn check_dependency_refs(target: &ResolvedTarget) -> Result<(), ResolutionError> {
  let mut refs: Vec<&PathRef> = target
    .arguments
    .iter()
    .filter_map(|a| a.value().and_then(as_path))
    .collect();

  for step in &target.steps {
    match step {
      BuildStep::Run { args, .. } => refs.extend(args.iter().filter_map(as_path)),
      BuildStep::Inreplace { to, .. } => refs.extend(as_path(to)),
      BuildStep::Install { to, .. } => refs.push(to),
      BuildStep::Configure { .. } | BuildStep::Make { .. } => {}
    }
  }
  refs.extend(target.environment.values().filter_map(as_path));

  for path in refs {
    if let PathRef::Dependency { formula, .. } = path
      && !target.dependencies.iter().any(|d| &d.name == formula)
    {
      return Err(ResolutionError::DanglingDependencyRef {
        formula: target.name().to_string(),
        dependency: formula.clone(),
      });
    }
  }
  Ok(())
}
