//! Depth-first graph construction.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{BuildGraph, GraphError, Requester};
use crate::formula::FormulaRegistry;
use crate::resolve::{CapabilityProbe, ResolveRequest, ResolvedTarget, resolve};

/// Resolves root requests and everything they depend on.
pub struct GraphBuilder<'a> {
  registry: &'a FormulaRegistry,
  probe: &'a dyn CapabilityProbe,
}

/// Traversal state for one `build` call.
struct Walk<'a, 'b> {
  builder: &'b GraphBuilder<'a>,
  targets: BTreeMap<String, ResolvedTarget>,
  /// First request seen for every formula.
  requested: BTreeMap<String, (Requester, BTreeSet<String>)>,
  /// Formulas on the current DFS path.
  stack: Vec<String>,
}

impl<'a> GraphBuilder<'a> {
  pub fn new(registry: &'a FormulaRegistry, probe: &'a dyn CapabilityProbe) -> Self {
    Self { registry, probe }
  }

  /// Resolve `roots` and their transitive dependencies into a graph.
  ///
  /// Each dependency is resolved with the options its edge propagates. A
  /// formula reached twice must be requested with the same option set.
  pub fn build(&self, roots: &[(String, ResolveRequest)]) -> Result<BuildGraph, GraphError> {
    let mut walk = Walk {
      builder: self,
      targets: BTreeMap::new(),
      requested: BTreeMap::new(),
      stack: Vec::new(),
    };

    let mut root_names: Vec<String> = Vec::new();
    for (name, request) in roots {
      walk.visit(name, request.clone(), Requester::Root)?;
      if !root_names.contains(name) {
        root_names.push(name.clone());
      }
    }

    debug!(targets = walk.targets.len(), roots = ?root_names, "built dependency graph");
    Ok(BuildGraph::from_targets(walk.targets, root_names))
  }
}

impl Walk<'_, '_> {
  fn visit(&mut self, name: &str, request: ResolveRequest, requester: Requester) -> Result<(), GraphError> {
    if let Some(pos) = self.stack.iter().position(|n| n == name) {
      let mut cycle = self.stack[pos..].to_vec();
      cycle.push(name.to_string());
      return Err(GraphError::CyclicDependency { cycle });
    }

    if let Some((first_requester, first)) = self.requested.get(name) {
      if *first != request.options {
        return Err(GraphError::OptionMismatch {
          name: name.to_string(),
          first_requester: first_requester.clone(),
          first: first.clone(),
          second_requester: requester,
          second: request.options,
        });
      }
      return Ok(());
    }

    let descriptor = self
      .builder
      .registry
      .get(name)
      .ok_or_else(|| GraphError::UnknownFormula {
        name: name.to_string(),
        required_by: match &requester {
          Requester::Root => None,
          Requester::Formula(parent) => Some(parent.clone()),
        },
      })?;

    let target = resolve(descriptor, &request, self.builder.probe)?;
    self
      .requested
      .insert(name.to_string(), (requester, request.options.clone()));

    self.stack.push(name.to_string());
    for dep in &target.dependencies {
      let dep_request = ResolveRequest {
        options: dep.options.clone(),
      };
      self.visit(&dep.name, dep_request, Requester::Formula(name.to_string()))?;
    }
    self.stack.pop();

    self.targets.insert(name.to_string(), target);
    Ok(())
  }
}
