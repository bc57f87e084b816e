//! Tag index collection.

use crate::error::GraphError;
use crate::graph::collect_tags;
use crate::pipeline::{Pass, PassContext};

/// Builds the tag index: for each tag name, the tagged definitions and
/// their attributes, in declaration order.
///
/// Runs after interpolation and before pruning, so the index reflects
/// the full graph, including private definitions that may be pruned
/// later. Consumers that iterate a tag and resolve each entry should
/// reference the entries somewhere reachable, or accept that pruned
/// ids will not resolve.
pub struct CollectTags;

impl Pass for CollectTags {
  fn name(&self) -> &'static str {
    "collect-tags"
  }

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError> {
    ctx.tags = Some(collect_tags(&ctx.graph));
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::definition::{Definition, Tag};
  use crate::graph::DefinitionGraph;
  use crate::processor::ProcessorRegistry;

  struct Stub;

  #[test]
  fn the_index_lands_in_the_context() {
    let mut graph = DefinitionGraph::new();
    graph.define(Definition::service("a", |_| Ok(Stub)).tag("worker"));
    graph.define(
      Definition::service("b", |_| Ok(Stub))
        .tag_with(Tag::new("worker").with_attribute("weight", 2i64)),
    );
    let processors = ProcessorRegistry::empty();
    let mut ctx = PassContext {
      graph,
      processors: &processors,
      tags: None,
      resolved: None,
    };
    CollectTags.run(&mut ctx).unwrap();
    let tags = ctx.tags.unwrap();
    let workers = tags.get("worker").unwrap();
    assert_eq!(workers.len(), 2);
    assert_eq!(workers[0].0, "a");
    assert_eq!(workers[1].0, "b");
  }
}
