//! Structural validation of every definition.

use crate::error::GraphError;
use crate::pipeline::{Pass, PassContext};

/// Checks each definition in isolation and folds named arguments into
/// their positional slots.
///
/// After this pass every definition carries a purely positional
/// argument list, which is what the later passes and the compiler
/// operate on.
pub struct ValidateDefinitions;

impl Pass for ValidateDefinitions {
  fn name(&self) -> &'static str {
    "validate-definitions"
  }

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError> {
    for (_, def) in ctx.graph.definitions_mut() {
      def.normalize_arguments()?;
    }
    Ok(())
  }
}
