//! # weave
//!
//! A compiled dependency-injection container: declarative service
//! graphs, multi-pass validation, and lazy, thread-safe resolution.
//!
//! Services are registered as [`Definition`]s in a [`DefinitionGraph`]:
//! a factory closure plus declarative arguments, method calls, tags,
//! lifetime, and visibility. A [`Pipeline`] validates and transforms
//! the graph in a fixed pass order and produces a [`ResolvedGraph`],
//! where every reference has been checked, alias chains flattened,
//! `%scheme:key%` placeholders substituted, and eager cycles rejected
//! with the full path. A [`Container`] then executes that graph:
//! singletons are built once on first request and shared, transients
//! are built per request, and lazy edges are delivered as proxies that
//! construct their target on first touch.
//!
//! ## Features
//!
//! * **Declarative wiring**: positional and named arguments, nested
//!   collections, optional and lazy references.
//! * **Deterministic compilation**: insertion order is preserved end to
//!   end, so the same registrations always produce the same resolved
//!   graph. The companion `weave_codegen` crate builds on this to cache
//!   compiled containers across process restarts.
//! * **Cycle safety twice over**: the pipeline proves the eager edge
//!   graph acyclic before a container ever runs, and a per-thread guard
//!   backstops factories that re-enter the container at runtime.
//! * **Parameter processors**: pluggable `%env:...%` style placeholder
//!   sources, substituted once at pipeline time.
//! * **`serde` feature**: serialization for [`Value`], used by the
//!   compiled artifact format.
//!
//! ## Quick start
//!
//! ```rust
//! use weave::{Argument, Container, Definition, DefinitionGraph, Pipeline};
//! use std::sync::Arc;
//!
//! struct Logger { level: String }
//! struct Mailer { logger: Arc<Logger> }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = DefinitionGraph::new();
//! graph.define(
//!   Definition::service("logger", |args| {
//!     Ok(Logger { level: args.str(0)?.to_owned() })
//!   })
//!   .argument(Argument::value("info")),
//! );
//! graph.define(
//!   Definition::service("mailer", |args| {
//!     Ok(Mailer { logger: args.service(0)? })
//!   })
//!   .public()
//!   .argument(Argument::reference("logger")),
//! );
//!
//! let resolved = Pipeline::standard().run(graph)?;
//! let container = Container::new(resolved);
//!
//! let mailer = container.get::<Mailer>("mailer")?;
//! assert_eq!(mailer.logger.level, "info");
//! # Ok(())
//! # }
//! ```

// --- Public API Modules ---

pub mod args;
pub mod definition;
pub mod error;
pub mod graph;
pub mod id;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod proxy;
pub mod reference;
pub mod resolver;
pub mod runtime;
pub mod value;

// --- Public API Re-exports ---

pub use args::{ResolvedArg, ResolvedArgs};
pub use definition::{
  BoxedService, Definition, Lifetime, MethodApplier, MethodCall, ServiceFactory, ServiceInstance,
  Tag, TagAttributes, Visibility,
};
pub use error::{
  ArgAccessError, BoxError, DefinitionError, GraphError, PipelineError, ProcessorError,
  ResolveError,
};
pub use graph::DefinitionGraph;
pub use id::ServiceId;
pub use metrics::MetricsSnapshot;
pub use pipeline::{Pass, PassContext, Pipeline};
pub use processor::{ConstProcessor, EnvProcessor, ParameterProcessor, ProcessorRegistry};
pub use proxy::{FailurePolicy, Lazy, ProxyFactory, ProxyHandle};
pub use resolver::{
  ArgPlan, CallPlan, ReferenceResolver, ResolvedDefinition, ResolvedGraph, TagIndex,
  MAX_ALIAS_DEPTH,
};
pub use reference::{Argument, Reference, ReferenceMode};
pub use runtime::{Container, ContainerOptions, ResolutionGuard};
pub use value::Value;
