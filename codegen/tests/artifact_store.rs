// The on-disk artifact store: cold compiles, warm reuse, and every
// invalidation path.

use std::fs;

use tempfile::tempdir;
use weave::{Argument, ContainerOptions, Definition, DefinitionGraph, Pipeline};
use weave_codegen::{
  compile, ArtifactStore, CacheOutcome, RecompileReason, MANIFEST_FILE, TABLE_FILE,
};

struct Engine {
  threshold: i64,
}

struct Pump;

fn wiring(threshold: i64) -> DefinitionGraph {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("engine", move |args| {
      Ok(Engine {
        threshold: args.int(0)?,
      })
    })
    .public()
    .argument(Argument::value(threshold)),
  );
  graph.define(
    Definition::service("pump", |args| {
      args.service::<Engine>(0)?;
      Ok(Pump)
    })
    .public()
    .argument(Argument::reference("engine")),
  );
  graph
}

#[test]
fn a_cold_store_compiles_and_a_warm_store_reuses() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  let first = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(
    first.outcome,
    CacheOutcome::Recompiled(RecompileReason::MissingArtifact)
  );

  let second = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(second.outcome, CacheOutcome::Reused);
  assert_eq!(second.manifest.fingerprint, first.manifest.fingerprint);

  // The rehydrated container serves the same wiring.
  let engine = second.container.get::<Engine>("engine").unwrap();
  assert_eq!(engine.threshold, 5);
  assert!(second.container.has("pump"));
}

#[test]
fn changed_registrations_recompile_as_stale() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  let first = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  let second = store
    .load_or_compile(&wiring(9), &pipeline, ContainerOptions::default())
    .unwrap();

  assert_eq!(
    second.outcome,
    CacheOutcome::Recompiled(RecompileReason::StaleFingerprint)
  );
  assert_ne!(second.manifest.fingerprint, first.manifest.fingerprint);
  let engine = second.container.get::<Engine>("engine").unwrap();
  assert_eq!(engine.threshold, 9);
}

#[test]
fn a_recompile_replaces_the_previous_artifact() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  store
    .load_or_compile(&wiring(9), &pipeline, ContainerOptions::default())
    .unwrap();

  // One store, one artifact: the old build is gone, the new one loads.
  assert!(store.load(&wiring(5)).unwrap().is_none());
  assert!(store.load(&wiring(9)).unwrap().is_some());
}

#[test]
fn store_then_load_round_trips_the_artifact() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());

  let compiled = compile(&wiring(5), &Pipeline::standard()).unwrap();
  store.store(&compiled).unwrap();

  let loaded = store.load(&wiring(5)).unwrap().expect("stored artifact");
  assert_eq!(loaded.table, compiled.table);
  assert_eq!(loaded.source, compiled.source);
  assert_eq!(loaded.manifest.fingerprint, compiled.manifest.fingerprint);
  assert_eq!(
    loaded.manifest.source_fingerprint,
    compiled.manifest.source_fingerprint
  );
}

#[test]
fn a_torn_manifest_is_a_cache_miss_not_an_error() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  fs::write(store.artifact_dir().join(MANIFEST_FILE), b"not json {").unwrap();

  assert!(store.load(&wiring(5)).unwrap().is_none());
  let rebuilt = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(
    rebuilt.outcome,
    CacheOutcome::Recompiled(RecompileReason::CorruptArtifact)
  );

  // The recompile healed the store.
  let again = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(again.outcome, CacheOutcome::Reused);
}

#[test]
fn a_missing_table_file_recompiles() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  fs::remove_file(store.artifact_dir().join(TABLE_FILE)).unwrap();

  let rebuilt = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(
    rebuilt.outcome,
    CacheOutcome::Recompiled(RecompileReason::CorruptArtifact)
  );
}

#[test]
fn an_artifact_from_another_schema_recompiles() {
  let dir = tempdir().unwrap();
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();

  let manifest_path = store.artifact_dir().join(MANIFEST_FILE);
  let mut manifest: serde_json::Value =
    serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
  manifest["schema_version"] = serde_json::json!(999);
  fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();

  let rebuilt = store
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(
    rebuilt.outcome,
    CacheOutcome::Recompiled(RecompileReason::CorruptArtifact)
  );
}

#[test]
fn stores_at_different_roots_are_independent() {
  let left_dir = tempdir().unwrap();
  let right_dir = tempdir().unwrap();
  let pipeline = Pipeline::standard();

  let left = ArtifactStore::new(left_dir.path());
  left
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();

  let right = ArtifactStore::new(right_dir.path());
  let cold = right
    .load_or_compile(&wiring(5), &pipeline, ContainerOptions::default())
    .unwrap();
  assert_eq!(
    cold.outcome,
    CacheOutcome::Recompiled(RecompileReason::MissingArtifact)
  );
}
