//! Batch scheduling.
//!
//! Kahn's algorithm over a [`BuildGraph`]: every round peels all targets whose
//! dependencies are already scheduled into one batch. Members of a batch
//! share no edge and may build concurrently; batches run in order.

use std::collections::BTreeMap;

use crate::graph::{BuildGraph, GraphError};

/// Target names safe to build concurrently, sorted lexicographically.
pub type Batch = Vec<String>;

/// Partition `graph` into ordered batches.
///
/// The builder never produces a cycle; if one is present anyway, the targets
/// that could not be peeled are reported.
pub fn schedule(graph: &BuildGraph) -> Result<Vec<Batch>, GraphError> {
  let mut in_degree: BTreeMap<&str, usize> = graph.in_degrees();
  let mut batches: Vec<Batch> = Vec::new();

  while !in_degree.is_empty() {
    // BTreeMap iteration keeps each batch sorted.
    let ready: Vec<&str> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(name, _)| *name)
      .collect();

    if ready.is_empty() {
      let mut cycle: Vec<String> = in_degree.keys().map(|n| n.to_string()).collect();
      if let Some(first) = cycle.first().cloned() {
        cycle.push(first);
      }
      return Err(GraphError::CyclicDependency { cycle });
    }

    for name in &ready {
      in_degree.remove(name);
      for dependent in graph.dependents(name) {
        if let Some(degree) = in_degree.get_mut(dependent) {
          *degree = degree.saturating_sub(1);
        }
      }
    }

    batches.push(ready.into_iter().map(String::from).collect());
  }

  Ok(batches)
}
