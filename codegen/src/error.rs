//! Failures while compiling, storing, or rehydrating an artifact.

use std::path::PathBuf;

use thiserror::Error as ThisError;
use weave::{PipelineError, ServiceId};

/// Anything that can go wrong between a definition graph and a running
/// sealed container.
///
/// Torn or stale artifacts on disk are deliberately NOT errors: the
/// store treats them as cache misses and recompiles. Only real I/O
/// failures and graphs that cannot satisfy their own table surface
/// here.
#[derive(Debug, ThisError)]
pub enum CompileError {
  /// The pipeline rejected the graph.
  #[error(transparent)]
  Pipeline(#[from] PipelineError),

  /// Reading or writing an artifact file failed.
  #[error("artifact io at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// An artifact could not be serialized.
  #[error("artifact serialization failed: {source}")]
  Serialize {
    #[source]
    source: serde_json::Error,
  },

  /// The table names a service the factory set has no closure for.
  #[error("no factory registered for service '{id}'")]
  MissingFactory { id: ServiceId },

  /// The table names a method call the factory set has no applier for.
  #[error("no applier registered for method call '{call}' on service '{id}'")]
  MissingApplier { id: ServiceId, call: String },

  /// The table was written by an incompatible schema.
  #[error("artifact schema {found} is not the supported schema {expected}")]
  SchemaMismatch { found: u32, expected: u32 },

  /// The table is internally inconsistent.
  #[error("malformed service table: {detail}")]
  MalformedTable { detail: String },
}
