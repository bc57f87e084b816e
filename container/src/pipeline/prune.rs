//! Dead private definition elimination.

use std::collections::HashSet;

use tracing::debug;

use crate::error::GraphError;
use crate::id::ServiceId;
use crate::pipeline::{Pass, PassContext};
use crate::resolver::reference_targets;

/// Removes private definitions nothing reachable refers to.
///
/// Roots are the public definitions and every alias target; reachability
/// follows all reference edges, including lazy and optional ones, since
/// any of them can demand the target at runtime. Removal preserves the
/// declaration order of the survivors.
pub struct PrunePrivate;

impl Pass for PrunePrivate {
  fn name(&self) -> &'static str {
    "prune-private"
  }

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError> {
    let graph = &mut ctx.graph;

    let mut reachable: HashSet<ServiceId> = HashSet::with_capacity(graph.len());
    let mut worklist: Vec<ServiceId> = Vec::new();
    for (id, def) in graph.definitions() {
      if def.is_public() && reachable.insert(id.clone()) {
        worklist.push(id.clone());
      }
    }
    for (_, target) in graph.aliases() {
      if graph.contains_definition(target.as_str()) && reachable.insert(target.clone()) {
        worklist.push(target.clone());
      }
    }

    while let Some(id) = worklist.pop() {
      let targets = match graph.get(id.as_str()) {
        Some(def) => reference_targets(def),
        None => continue,
      };
      for target in targets {
        if graph.contains_definition(target.as_str()) && reachable.insert(target.clone()) {
          worklist.push(target);
        }
      }
    }

    let doomed: Vec<ServiceId> = graph
      .definitions()
      .filter(|(id, _)| !reachable.contains(*id))
      .map(|(id, _)| id.clone())
      .collect();
    for id in &doomed {
      graph.remove(id.as_str());
    }
    if !doomed.is_empty() {
      debug!(removed = doomed.len(), "pruned unreachable private definitions");
    }
    Ok(())
  }
}
