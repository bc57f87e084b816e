//! The final resolution pass.

use crate::error::GraphError;
use crate::graph::collect_tags;
use crate::pipeline::{Pass, PassContext};
use crate::resolver::ReferenceResolver;

/// Validates every reference, proves the eager edges acyclic, and
/// lowers the graph into the [`ResolvedGraph`](crate::resolver::ResolvedGraph)
/// stored in the context.
///
/// Always the last pass. It consumes the working graph; passes placed
/// after it would see an empty one.
pub struct ResolveReferences;

impl Pass for ResolveReferences {
  fn name(&self) -> &'static str {
    "resolve-references"
  }

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError> {
    let tags = match ctx.tags.take() {
      Some(tags) => tags,
      None => collect_tags(&ctx.graph),
    };
    let graph = std::mem::take(&mut ctx.graph);
    let resolved = ReferenceResolver::new().resolve_prepared(graph, tags)?;
    ctx.resolved = Some(resolved);
    Ok(())
  }
}
