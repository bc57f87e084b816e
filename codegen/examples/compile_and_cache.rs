use weave::{Argument, ContainerOptions, Definition, DefinitionGraph, Pipeline};
use weave_codegen::{ArtifactStore, CacheOutcome, RecompileReason};

struct HttpClient {
  timeout_ms: i64,
}

struct Crawler {
  client_timeout: i64,
}

// The registration code an application would run at every startup.
fn wiring(timeout_ms: i64) -> DefinitionGraph {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("http_client", move |args| {
      Ok(HttpClient {
        timeout_ms: args.int(0)?,
      })
    })
    .argument(Argument::value(timeout_ms)),
  );
  graph.define(
    Definition::service("crawler", |args| {
      let client = args.service::<HttpClient>(0)?;
      Ok(Crawler {
        client_timeout: client.timeout_ms,
      })
    })
    .public()
    .argument(Argument::reference("http_client")),
  );
  graph
}

fn describe(outcome: CacheOutcome) -> String {
  match outcome {
    CacheOutcome::Reused => "reused the stored artifact".to_owned(),
    CacheOutcome::Recompiled(reason) => format!("recompiled ({:?})", reason),
  }
}

fn main() {
  let dir = tempfile::tempdir().expect("temp dir");
  let store = ArtifactStore::new(dir.path());
  let pipeline = Pipeline::standard();

  // --- Cold start ---
  // Nothing on disk yet: the pipeline runs, the artifact is stored.
  let cold = store
    .load_or_compile(&wiring(500), &pipeline, ContainerOptions::default())
    .unwrap();
  println!(
    "Cold start:  {} (build {}).",
    describe(cold.outcome),
    cold.manifest.build_id
  );

  // --- Warm start ---
  // Same registrations: the stored table is hydrated without running
  // the pipeline at all.
  let warm = store
    .load_or_compile(&wiring(500), &pipeline, ContainerOptions::default())
    .unwrap();
  println!(
    "Warm start:  {} (build {}).",
    describe(warm.outcome),
    warm.manifest.build_id
  );
  assert_eq!(warm.outcome, CacheOutcome::Reused);
  assert_eq!(warm.manifest.fingerprint, cold.manifest.fingerprint);

  let crawler = warm.container.get::<Crawler>("crawler").unwrap();
  println!("Crawler resolved with a {}ms client timeout.", crawler.client_timeout);
  assert_eq!(crawler.client_timeout, 500);

  // --- Changed registrations ---
  // A different argument moves the graph fingerprint; the stored
  // artifact is stale and gets replaced.
  let changed = store
    .load_or_compile(&wiring(250), &pipeline, ContainerOptions::default())
    .unwrap();
  println!(
    "After edit:  {} (build {}).",
    describe(changed.outcome),
    changed.manifest.build_id
  );
  assert_eq!(
    changed.outcome,
    CacheOutcome::Recompiled(RecompileReason::StaleFingerprint)
  );
  assert_ne!(changed.manifest.fingerprint, cold.manifest.fingerprint);

  let crawler = changed.container.get::<Crawler>("crawler").unwrap();
  assert_eq!(crawler.client_timeout, 250);
  println!("The rebuilt container serves the new wiring.");
}
