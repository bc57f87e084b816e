//! The multi-pass compilation pipeline.
//!
//! A [`Pipeline`] owns an ordered list of passes and runs them over a
//! [`DefinitionGraph`], producing the [`ResolvedGraph`] a container
//! executes. The standard order is fixed:
//!
//! 1. `validate-definitions`: structural checks, named argument merge
//! 2. `resolve-aliases`: flatten alias chains, rewrite references
//! 3. `interpolate-parameters`: substitute `%scheme:key%` placeholders
//! 4. `collect-tags`: build the tag index
//! 5. `prune-private`: drop unreachable private definitions
//! 6. `resolve-references`: validate edges, detect cycles, lower plans
//!
//! Later passes rely on the guarantees of earlier ones, so custom
//! pipelines assembled through [`Pipeline::new`] should preserve the
//! relative order of the built-in passes they keep. A pipeline whose
//! passes never produce a resolved graph gets a final resolution pass
//! run on its behalf.

use std::time::Instant;

use tracing::{debug, error};

use crate::error::{GraphError, PipelineError};
use crate::graph::DefinitionGraph;
use crate::processor::{ParameterProcessor, ProcessorRegistry};
use crate::resolver::{ResolvedGraph, TagIndex};

mod aliases;
mod params;
mod prune;
mod resolve;
mod tags;
mod validate;

pub use aliases::ResolveAliases;
pub use params::InterpolateParameters;
pub use prune::PrunePrivate;
pub use resolve::ResolveReferences;
pub use tags::CollectTags;
pub use validate::ValidateDefinitions;

/// Shared state threaded through the passes of one pipeline run.
pub struct PassContext<'a> {
  /// The working graph. Passes mutate it in place.
  pub graph: DefinitionGraph,
  /// Processors available to the interpolation pass.
  pub processors: &'a ProcessorRegistry,
  /// The tag index, once a pass has collected it.
  pub tags: Option<TagIndex>,
  /// The final product, set by the resolution pass.
  pub resolved: Option<ResolvedGraph>,
}

/// One transformation step over the working graph.
pub trait Pass: Send + Sync {
  /// A stable name, used in diagnostics and logging.
  fn name(&self) -> &'static str;

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError>;
}

/// An ordered list of passes plus the processor registry they share.
pub struct Pipeline {
  passes: Vec<Box<dyn Pass>>,
  processors: ProcessorRegistry,
}

impl Pipeline {
  /// The standard six-pass pipeline with the default processors.
  pub fn standard() -> Self {
    Pipeline {
      passes: vec![
        Box::new(ValidateDefinitions),
        Box::new(ResolveAliases),
        Box::new(InterpolateParameters),
        Box::new(CollectTags),
        Box::new(PrunePrivate),
        Box::new(ResolveReferences),
      ],
      processors: ProcessorRegistry::with_defaults(),
    }
  }

  /// A pipeline over a caller-assembled pass list.
  pub fn new(passes: Vec<Box<dyn Pass>>) -> Self {
    Pipeline {
      passes,
      processors: ProcessorRegistry::with_defaults(),
    }
  }

  /// Registers an extra parameter processor.
  pub fn with_processor(mut self, processor: impl ParameterProcessor + 'static) -> Self {
    self.processors.register(processor);
    self
  }

  /// Replaces the whole processor registry.
  pub fn with_registry(mut self, registry: ProcessorRegistry) -> Self {
    self.processors = registry;
    self
  }

  /// The pass names in execution order.
  pub fn pass_names(&self) -> Vec<&'static str> {
    self.passes.iter().map(|p| p.name()).collect()
  }

  /// Runs every pass in order and returns the resolved graph.
  ///
  /// The first failing pass aborts the run; the error carries the pass
  /// name alongside the underlying graph error.
  pub fn run(&self, graph: DefinitionGraph) -> Result<ResolvedGraph, PipelineError> {
    let mut ctx = PassContext {
      graph,
      processors: &self.processors,
      tags: None,
      resolved: None,
    };
    for pass in &self.passes {
      self.run_one(pass.as_ref(), &mut ctx)?;
    }
    if ctx.resolved.is_none() {
      self.run_one(&ResolveReferences, &mut ctx)?;
    }
    // The resolution pass always fills this in.
    Ok(ctx.resolved.unwrap_or_default())
  }

  fn run_one(&self, pass: &dyn Pass, ctx: &mut PassContext<'_>) -> Result<(), PipelineError> {
    let started = Instant::now();
    match pass.run(ctx) {
      Ok(()) => {
        debug!(
          pass = pass.name(),
          elapsed_us = started.elapsed().as_micros() as u64,
          "pass complete"
        );
        Ok(())
      }
      Err(source) => {
        error!(pass = pass.name(), error = %source, "pass failed");
        Err(PipelineError {
          pass: pass.name(),
          source,
        })
      }
    }
  }
}

impl Default for Pipeline {
  fn default() -> Self {
    Pipeline::standard()
  }
}

impl std::fmt::Debug for Pipeline {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Pipeline")
      .field("passes", &self.pass_names())
      .field("processors", &self.processors)
      .finish()
  }
}

#[cfg(test)]
mod pipeline_tests {
  use super::*;
  use crate::definition::Definition;
  use crate::reference::Argument;

  struct Stub;

  #[test]
  fn the_standard_pass_order_is_fixed() {
    assert_eq!(
      Pipeline::standard().pass_names(),
      vec![
        "validate-definitions",
        "resolve-aliases",
        "interpolate-parameters",
        "collect-tags",
        "prune-private",
        "resolve-references",
      ]
    );
  }

  #[test]
  fn failures_carry_the_pass_name() {
    let mut graph = DefinitionGraph::new();
    graph.define(
      Definition::service("app", |_| Ok(Stub))
        .public()
        .argument(Argument::reference("missing")),
    );
    let err = Pipeline::standard().run(graph).unwrap_err();
    assert_eq!(err.pass, "resolve-references");
  }

  #[test]
  fn a_pipeline_without_a_resolution_pass_still_resolves() {
    let mut graph = DefinitionGraph::new();
    graph.singleton("stub", |_| Ok(Stub));
    let resolved = Pipeline::new(vec![Box::new(ValidateDefinitions)])
      .run(graph)
      .unwrap();
    assert!(resolved.contains("stub"));
  }
}
