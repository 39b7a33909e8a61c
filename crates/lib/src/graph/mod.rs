//! Dependency graph of resolved targets.
//!
//! A `BuildGraph` is produced once by [`GraphBuilder`] and is read-only
//! afterwards; the executor shares it across workers behind an `Arc`.
//! Edges point from a dependency to its dependent.

mod builder;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use crate::resolve::{ResolutionError, ResolvedTarget};

pub use builder::GraphBuilder;

/// Who asked for a formula, used in option mismatch reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requester {
  /// Named directly in the install request.
  Root,
  /// Pulled in as a dependency of another formula.
  Formula(String),
}

impl fmt::Display for Requester {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Requester::Root => write!(f, "the install request"),
      Requester::Formula(name) => write!(f, "{name}"),
    }
  }
}

fn format_options(options: &BTreeSet<String>) -> String {
  if options.is_empty() {
    "no options".to_string()
  } else {
    options.iter().cloned().collect::<Vec<_>>().join(" ")
  }
}

fn required_by_suffix(required_by: &Option<String>) -> String {
  required_by
    .as_ref()
    .map(|r| format!(" (required by {r})"))
    .unwrap_or_default()
}

/// Errors detected while building or scheduling a graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
  #[error("no formula named '{name}'{}", required_by_suffix(.required_by))]
  UnknownFormula { name: String, required_by: Option<String> },

  #[error(
    "{name} is requested with {} by {first_requester} but with {} by {second_requester}",
    format_options(.first),
    format_options(.second)
  )]
  OptionMismatch {
    name: String,
    first_requester: Requester,
    first: BTreeSet<String>,
    second_requester: Requester,
    second: BTreeSet<String>,
  },

  #[error("dependency cycle: {}", .cycle.join(" -> "))]
  CyclicDependency { cycle: Vec<String> },

  #[error(transparent)]
  Resolution(#[from] ResolutionError),
}

/// Resolved targets plus the edges between them.
#[derive(Debug, Clone)]
pub struct BuildGraph {
  targets: BTreeMap<String, ResolvedTarget>,
  graph: DiGraph<String, ()>,
  nodes: HashMap<String, NodeIndex>,
  roots: Vec<String>,
}

impl BuildGraph {
  /// Assemble a graph from fully resolved targets.
  ///
  /// Every dependency named by a target must itself be present; the builder
  /// guarantees this.
  pub(crate) fn from_targets(targets: BTreeMap<String, ResolvedTarget>, roots: Vec<String>) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for name in targets.keys() {
      nodes.insert(name.clone(), graph.add_node(name.clone()));
    }

    for (name, target) in &targets {
      let dependent = nodes[name];
      for dep in target.dependency_names() {
        if let Some(&dependency) = nodes.get(dep) {
          graph.add_edge(dependency, dependent, ());
        }
      }
    }

    Self {
      targets,
      graph,
      nodes,
      roots,
    }
  }

  /// Targets sorted by name.
  pub fn targets(&self) -> impl Iterator<Item = &ResolvedTarget> {
    self.targets.values()
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.targets.keys().map(String::as_str)
  }

  pub fn get(&self, name: &str) -> Option<&ResolvedTarget> {
    self.targets.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.targets.contains_key(name)
  }

  /// Formulas named directly in the request, in request order.
  pub fn roots(&self) -> &[String] {
    &self.roots
  }

  pub fn is_root(&self, name: &str) -> bool {
    self.roots.iter().any(|r| r == name)
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  fn neighbors(&self, name: &str, direction: Direction) -> Vec<&str> {
    let Some(&idx) = self.nodes.get(name) else {
      return Vec::new();
    };
    let mut names: Vec<&str> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].as_str())
      .collect();
    names.sort_unstable();
    names.dedup();
    names
  }

  /// Direct dependencies of `name`, sorted.
  pub fn dependencies(&self, name: &str) -> Vec<&str> {
    self.neighbors(name, Direction::Incoming)
  }

  /// Direct dependents of `name`, sorted.
  pub fn dependents(&self, name: &str) -> Vec<&str> {
    self.neighbors(name, Direction::Outgoing)
  }

  /// Everything that depends on `name`, directly or not.
  pub fn transitive_dependents(&self, name: &str) -> BTreeSet<String> {
    let mut seen = BTreeSet::new();
    let mut queue: VecDeque<&str> = self.dependents(name).into();

    while let Some(next) = queue.pop_front() {
      if seen.insert(next.to_string()) {
        queue.extend(self.dependents(next));
      }
    }
    seen
  }

  /// Number of direct dependencies of every target.
  pub fn in_degrees(&self) -> BTreeMap<&str, usize> {
    self
      .targets
      .keys()
      .map(|name| (name.as_str(), self.dependencies(name).len()))
      .collect()
  }
}
