use std::sync::Arc;

use weave::{Argument, Container, Definition, DefinitionGraph, Pipeline};

// A cache layer is optional: the reader works without one and picks it
// up when it happens to be registered and already warm.
struct Cache {
  entries: usize,
}

struct Reader {
  cache: Option<Arc<Cache>>,
}

fn reader_definition() -> Definition {
  Definition::service("reader", |args| {
    Ok(Reader {
      cache: args.optional_service(0)?,
    })
  })
  .public()
  .transient()
  .argument(Argument::optional_reference("cache"))
}

fn main() {
  // --- Without the optional target ---
  // A strict reference to a missing id would fail the pipeline; an
  // optional one lowers to an absent argument instead.
  let mut graph = DefinitionGraph::new();
  graph.define(reader_definition());

  let container = Container::new(Pipeline::standard().run(graph).expect("wiring is sound"));
  let reader = container.get::<Reader>("reader").unwrap();
  assert!(reader.cache.is_none());
  println!("No cache registered: the reader runs uncached.");

  // --- With the target registered ---
  // An optional reference to an existing singleton peeks: it sees the
  // instance only once something else has built it.
  let mut graph = DefinitionGraph::new();
  graph.singleton("cache", |_| Ok(Cache { entries: 4_096 }));
  graph.define(reader_definition());

  let container = Container::new(Pipeline::standard().run(graph).expect("wiring is sound"));

  let cold = container.get::<Reader>("reader").unwrap();
  assert!(cold.cache.is_none());
  println!("Cache registered but not built yet: still uncached.");

  container.get::<Cache>("cache").unwrap();
  let warm = container.get::<Reader>("reader").unwrap();
  let cache = warm.cache.as_ref().expect("cache is warm now");
  println!("Cache warmed elsewhere: the reader sees {} entries.", cache.entries);
}
