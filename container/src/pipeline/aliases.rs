//! Alias chain flattening.

use crate::error::GraphError;
use crate::pipeline::{Pass, PassContext};
use crate::reference::Reference;
use crate::resolver::flatten_aliases;

/// Flattens every alias chain to a single hop and rewrites references
/// so they point straight at the terminal id.
///
/// Chains longer than [`MAX_ALIAS_DEPTH`](crate::resolver::MAX_ALIAS_DEPTH)
/// fail here, which also catches accidental alias loops. Aliases whose
/// terminal is not a definition survive this pass; the resolution pass
/// rejects them with the alias named as the referencing site.
pub struct ResolveAliases;

impl Pass for ResolveAliases {
  fn name(&self) -> &'static str {
    "resolve-aliases"
  }

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError> {
    let flat = flatten_aliases(&ctx.graph)?;
    for (_, def) in ctx.graph.definitions_mut() {
      def.visit_references_mut(&mut |r: &mut Reference| {
        if let Some(terminal) = flat.get(r.target()) {
          r.retarget(terminal.clone());
        }
      });
    }
    ctx.graph.replace_aliases(flat);
    Ok(())
  }
}
