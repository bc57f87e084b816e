use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weave::{Argument, Container, Definition, DefinitionGraph, Lazy, Pipeline};

// An expensive backend nobody wants to pay for at startup.
struct SearchIndex {
  documents: usize,
}

struct Api {
  index: Lazy<SearchIndex>,
}

static INDEX_BUILDS: AtomicUsize = AtomicUsize::new(0);

fn main() {
  // --- Registration ---
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("search_index", |_| {
      INDEX_BUILDS.fetch_add(1, Ordering::SeqCst);
      println!("Building the search index (expensive)...");
      Ok(SearchIndex { documents: 1_000 })
    })
    // The lazy flag defers every dependent edge.
    .lazy(),
  );
  graph.define(
    Definition::service("api", |args| {
      Ok(Api {
        index: args.lazy(0)?,
      })
    })
    .public()
    .argument(Argument::reference("search_index")),
  );

  let resolved = Pipeline::standard().run(graph).expect("wiring is sound");
  let container = Container::new(resolved);

  // --- Resolution ---
  // Building the API does not build the index.
  let api = container.get::<Api>("api").unwrap();
  assert_eq!(INDEX_BUILDS.load(Ordering::SeqCst), 0);
  assert!(!api.index.is_initialized());
  println!("API is up; the index has not been built yet.");

  // --- First touch ---
  let index = api.index.get().unwrap();
  println!("First query touched the proxy: {} documents.", index.documents);
  assert_eq!(INDEX_BUILDS.load(Ordering::SeqCst), 1);

  // Later touches, and other proxies, share the same singleton.
  let again = api.index.get().unwrap();
  assert!(
    Arc::ptr_eq(&index, &again),
    "Proxy touches should reuse the built instance"
  );
  assert_eq!(INDEX_BUILDS.load(Ordering::SeqCst), 1);
  println!("The index factory ran exactly once.");

  let metrics = container.metrics();
  println!(
    "Metrics -> resolutions: {}, instances built: {}, proxies created: {}",
    metrics.resolutions, metrics.instances_built, metrics.proxies_created
  );
}
