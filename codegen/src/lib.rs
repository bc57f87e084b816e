//! # weave_codegen
//!
//! Ahead-of-time compilation for [`weave`] service graphs.
//!
//! The dev-time [`weave::Container`] runs the full pipeline at every
//! startup. This crate does that work once. [`compile`] fingerprints a
//! [`weave::DefinitionGraph`], runs the pipeline, lowers the resolved
//! graph into a [`CompiledTable`], and renders the table as Rust
//! source. An [`ArtifactStore`] keeps compiled artifacts on disk,
//! keyed by the graph fingerprint, so the usual startup is hash,
//! read, hydrate; the pipeline only runs again when the registrations
//! actually changed. A [`SealedContainer`] executes a table directly
//! with the closures rebound through a [`FactorySet`], matching the
//! dev-time container's observable behavior.
//!
//! Closures cannot be serialized, so a table's identity is structural:
//! ids, arguments, lifetimes, visibility, tags, and aliases, plus the
//! schema and crate versions. Editing only a factory body reuses the
//! cached table, which is correct because the factory set always comes
//! from the live graph.
//!
//! ## Quick start
//!
//! ```rust
//! use weave::{Argument, ContainerOptions, Definition, DefinitionGraph, Pipeline};
//! use weave_codegen::{compile, FactorySet, SealedContainer};
//!
//! struct Greeter { greeting: String }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut graph = DefinitionGraph::new();
//! graph.define(
//!   Definition::service("greeter", |args| {
//!     Ok(Greeter { greeting: args.str(0)?.to_owned() })
//!   })
//!   .argument(Argument::value("hello"))
//!   .public(),
//! );
//!
//! let artifact = compile(&graph, &Pipeline::standard())?;
//! let container = SealedContainer::hydrate(
//!   &artifact.table,
//!   FactorySet::from_graph(&graph),
//!   ContainerOptions::default(),
//! )?;
//!
//! let greeter = container.get::<Greeter>("greeter")?;
//! assert_eq!(greeter.greeting, "hello");
//! # Ok(())
//! # }
//! ```
//!
//! With an [`ArtifactStore`] the compile step disappears from warm
//! startups:
//!
//! ```rust,no_run
//! use weave::{ContainerOptions, DefinitionGraph, Pipeline};
//! use weave_codegen::{ArtifactStore, CacheOutcome};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # let graph = DefinitionGraph::new();
//! let store = ArtifactStore::new("target/weave");
//! let compiled = store.load_or_compile(&graph, &Pipeline::standard(), ContainerOptions::default())?;
//! match compiled.outcome {
//!   CacheOutcome::Reused => {}
//!   CacheOutcome::Recompiled(reason) => eprintln!("rebuilt container: {:?}", reason),
//! }
//! # Ok(())
//! # }
//! ```

// --- Public API Modules ---

pub mod artifact;
pub mod error;
pub mod fingerprint;
pub mod sealed;
pub mod source;
pub mod table;

/// Version of the table and manifest layout. Bumped on incompatible
/// changes; artifacts from other schemas are recompiled.
pub const SCHEMA_VERSION: u32 = 1;

// --- Public API Re-exports ---

pub use artifact::{
  compile, ArtifactManifest, ArtifactStore, CacheOutcome, CompiledArtifact, CompiledContainer,
  RecompileReason, ARTIFACT_DIR, MANIFEST_FILE, SOURCE_FILE, TABLE_FILE,
};
pub use error::CompileError;
pub use fingerprint::{graph_fingerprint, resolved_fingerprint, Fingerprint};
pub use sealed::{FactorySet, SealedContainer};
pub use source::generate_source;
pub use table::{
  lower, CompiledArg, CompiledCall, CompiledSlot, CompiledTable, CompiledTag, LookupEntry,
  TaggedSlot,
};
