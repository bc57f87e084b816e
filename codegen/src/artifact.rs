//! Artifact compilation and the on-disk store.
//!
//! An artifact is one compiled graph: a manifest with both
//! fingerprints, the lowered table as JSON, and the generated source
//! module. A store keeps a single current artifact and judges it by
//! the graph fingerprint in its manifest, which is computable without
//! running the pipeline, so the hot path of
//! [`ArtifactStore::load_or_compile`] is hash, read, hydrate. The
//! pipeline only runs when registrations changed or nothing usable is
//! on disk.
//!
//! Writes go into a sibling `.tmp` directory that is renamed into
//! place, so a crash mid-write leaves either the old artifact or none;
//! readers never observe a torn one. Torn or stale artifacts are cache
//! misses, not errors.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use weave::{ContainerOptions, DefinitionGraph, Pipeline};

use crate::error::CompileError;
use crate::fingerprint::{graph_fingerprint, resolved_fingerprint, Fingerprint};
use crate::sealed::{FactorySet, SealedContainer};
use crate::source::generate_source;
use crate::table::{lower, CompiledTable};
use crate::SCHEMA_VERSION;

pub const ARTIFACT_DIR: &str = "weave-container";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const TABLE_FILE: &str = "table.json";
pub const SOURCE_FILE: &str = "container.rs";

/// Everything needed to judge an artifact without opening the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
  pub schema_version: u32,
  /// Short resolved fingerprint, for directory listings and logs.
  pub build_id: String,
  /// Identity of the resolved plan the table was lowered from.
  pub fingerprint: Fingerprint,
  /// Identity of the definition graph before the pipeline ran.
  pub source_fingerprint: Fingerprint,
  pub services: usize,
  pub built_at: DateTime<Utc>,
}

/// A compiled graph, ready to store or hydrate.
#[derive(Debug, Clone)]
pub struct CompiledArtifact {
  pub manifest: ArtifactManifest,
  pub table: CompiledTable,
  pub source: String,
}

/// Runs the pipeline over `graph` and packages the result.
///
/// The graph fingerprint is taken first, on the untouched graph; it
/// has to match what a later [`ArtifactStore::load`] will compute from
/// the same registrations.
pub fn compile(graph: &DefinitionGraph, pipeline: &Pipeline) -> Result<CompiledArtifact, CompileError> {
  let source_fingerprint = graph_fingerprint(graph);
  let resolved = pipeline.run(graph.clone())?;
  let fingerprint = resolved_fingerprint(&resolved);
  let table = lower(&resolved)?;
  let source = generate_source(&table, &fingerprint);
  let manifest = ArtifactManifest {
    schema_version: SCHEMA_VERSION,
    build_id: fingerprint.short().to_owned(),
    fingerprint,
    source_fingerprint,
    services: table.slots.len(),
    built_at: Utc::now(),
  };
  Ok(CompiledArtifact {
    manifest,
    table,
    source,
  })
}

/// Why a cached artifact could not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecompileReason {
  /// Nothing stored under this graph's fingerprint.
  MissingArtifact,
  /// A stored artifact exists but was built from a different graph.
  StaleFingerprint,
  /// A stored artifact exists but could not be read back or satisfied.
  CorruptArtifact,
}

/// What [`ArtifactStore::load_or_compile`] did to produce a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
  Reused,
  Recompiled(RecompileReason),
}

/// A hydrated container plus the provenance of its table.
#[derive(Debug)]
pub struct CompiledContainer {
  pub container: SealedContainer,
  pub manifest: ArtifactManifest,
  pub outcome: CacheOutcome,
}

enum LoadOutcome {
  Loaded(CompiledArtifact),
  Recompile(RecompileReason),
}

/// An on-disk cache holding the current compiled artifact.
///
/// One store, one artifact: recompiles replace the previous build, so
/// nothing accumulates across graph changes. Applications with several
/// independent graphs use a store root per graph.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
  root: PathBuf,
}

impl ArtifactStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    ArtifactStore { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// The directory the current artifact lives in.
  pub fn artifact_dir(&self) -> PathBuf {
    self.root.join(ARTIFACT_DIR)
  }

  /// Writes `artifact` as the current one, replacing any earlier build.
  ///
  /// Returns the artifact directory.
  pub fn store(&self, artifact: &CompiledArtifact) -> Result<PathBuf, CompileError> {
    let dir = self.artifact_dir();
    let tmp = dir.with_extension("tmp");

    remove_dir_if_present(&tmp)?;
    fs::create_dir_all(&tmp).map_err(|e| io_err(&tmp, e))?;

    let manifest =
      serde_json::to_vec_pretty(&artifact.manifest).map_err(|e| CompileError::Serialize { source: e })?;
    write_file(&tmp.join(MANIFEST_FILE), &manifest)?;
    let table =
      serde_json::to_vec_pretty(&artifact.table).map_err(|e| CompileError::Serialize { source: e })?;
    write_file(&tmp.join(TABLE_FILE), &table)?;
    write_file(&tmp.join(SOURCE_FILE), artifact.source.as_bytes())?;

    remove_dir_if_present(&dir)?;
    fs::rename(&tmp, &dir).map_err(|e| io_err(&dir, e))?;
    Ok(dir)
  }

  /// Loads the artifact for `graph`, if a usable one is stored.
  ///
  /// `None` means compile: nothing stored, stored for a different
  /// graph, or stored but unreadable. Only real I/O failures error.
  pub fn load(&self, graph: &DefinitionGraph) -> Result<Option<CompiledArtifact>, CompileError> {
    let source_fingerprint = graph_fingerprint(graph);
    match self.try_load(&source_fingerprint)? {
      LoadOutcome::Loaded(artifact) => Ok(Some(artifact)),
      LoadOutcome::Recompile(_) => Ok(None),
    }
  }

  /// The startup path: reuse the stored artifact when the graph still
  /// matches, otherwise compile, store, and hydrate fresh.
  pub fn load_or_compile(
    &self,
    graph: &DefinitionGraph,
    pipeline: &Pipeline,
    options: ContainerOptions,
  ) -> Result<CompiledContainer, CompileError> {
    let source_fingerprint = graph_fingerprint(graph);
    let reason = match self.try_load(&source_fingerprint)? {
      LoadOutcome::Loaded(artifact) => {
        match SealedContainer::hydrate(&artifact.table, FactorySet::from_graph(graph), options) {
          Ok(container) => {
            debug!(build_id = %artifact.manifest.build_id, "reusing compiled container");
            return Ok(CompiledContainer {
              container,
              manifest: artifact.manifest,
              outcome: CacheOutcome::Reused,
            });
          }
          Err(e) => {
            // A table this graph cannot satisfy is as unusable as a
            // torn file.
            warn!(error = %e, "stored table does not hydrate, recompiling");
            RecompileReason::CorruptArtifact
          }
        }
      }
      LoadOutcome::Recompile(reason) => reason,
    };

    let artifact = compile(graph, pipeline)?;
    let dir = self.store(&artifact)?;
    let container = SealedContainer::hydrate(&artifact.table, FactorySet::from_graph(graph), options)?;
    info!(
      build_id = %artifact.manifest.build_id,
      path = %dir.display(),
      reason = ?reason,
      "compiled container artifact"
    );
    Ok(CompiledContainer {
      container,
      manifest: artifact.manifest,
      outcome: CacheOutcome::Recompiled(reason),
    })
  }

  fn try_load(&self, source_fingerprint: &Fingerprint) -> Result<LoadOutcome, CompileError> {
    let dir = self.artifact_dir();

    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest_bytes = match fs::read(&manifest_path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(LoadOutcome::Recompile(RecompileReason::MissingArtifact));
      }
      Err(e) => return Err(io_err(&manifest_path, e)),
    };
    let manifest: ArtifactManifest = match serde_json::from_slice(&manifest_bytes) {
      Ok(manifest) => manifest,
      Err(_) => return Ok(LoadOutcome::Recompile(RecompileReason::CorruptArtifact)),
    };
    if manifest.schema_version != SCHEMA_VERSION {
      return Ok(LoadOutcome::Recompile(RecompileReason::CorruptArtifact));
    }
    // The normal invalidation path: registrations changed since the
    // stored artifact was built.
    if manifest.source_fingerprint != *source_fingerprint {
      debug!(build_id = %manifest.build_id, "stored artifact was built from a different graph");
      return Ok(LoadOutcome::Recompile(RecompileReason::StaleFingerprint));
    }

    let table_path = dir.join(TABLE_FILE);
    let table_bytes = match fs::read(&table_path) {
      Ok(bytes) => bytes,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(LoadOutcome::Recompile(RecompileReason::CorruptArtifact));
      }
      Err(e) => return Err(io_err(&table_path, e)),
    };
    let table: CompiledTable = match serde_json::from_slice(&table_bytes) {
      Ok(table) => table,
      Err(_) => return Ok(LoadOutcome::Recompile(RecompileReason::CorruptArtifact)),
    };
    if table.schema_version != SCHEMA_VERSION {
      return Ok(LoadOutcome::Recompile(RecompileReason::CorruptArtifact));
    }

    let source_path = dir.join(SOURCE_FILE);
    let source = match fs::read_to_string(&source_path) {
      Ok(source) => source,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        return Ok(LoadOutcome::Recompile(RecompileReason::CorruptArtifact));
      }
      Err(e) => return Err(io_err(&source_path, e)),
    };

    Ok(LoadOutcome::Loaded(CompiledArtifact {
      manifest,
      table,
      source,
    }))
  }
}

fn io_err(path: &Path, source: std::io::Error) -> CompileError {
  CompileError::Io {
    path: path.to_path_buf(),
    source,
  }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CompileError> {
  fs::write(path, bytes).map_err(|e| io_err(path, e))
}

fn remove_dir_if_present(path: &Path) -> Result<(), CompileError> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(io_err(path, e)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weave::Definition;

  struct Clockwork;

  fn sample_graph() -> DefinitionGraph {
    let mut graph = DefinitionGraph::new();
    graph.define(Definition::service("clockwork", |_| Ok(Clockwork)).public());
    graph
  }

  #[test]
  fn compile_packages_consistent_parts() {
    let graph = sample_graph();
    let artifact = compile(&graph, &Pipeline::standard()).unwrap();

    assert_eq!(artifact.manifest.schema_version, SCHEMA_VERSION);
    assert_eq!(artifact.manifest.services, artifact.table.slots.len());
    assert_eq!(artifact.manifest.build_id, artifact.manifest.fingerprint.short());
    assert_eq!(
      artifact.manifest.source_fingerprint,
      graph_fingerprint(&graph)
    );
    assert!(artifact
      .source
      .contains(artifact.manifest.fingerprint.as_str()));
  }

  #[test]
  fn compiling_twice_is_reproducible_except_for_the_clock() {
    let first = compile(&sample_graph(), &Pipeline::standard()).unwrap();
    let second = compile(&sample_graph(), &Pipeline::standard()).unwrap();
    assert_eq!(first.manifest.fingerprint, second.manifest.fingerprint);
    assert_eq!(first.table, second.table);
    assert_eq!(first.source, second.source);
  }
}
