use weave::{Argument, Container, Definition, DefinitionGraph, Pipeline};

// A connection pool with several knobs. Binding the knobs by name keeps
// registrations readable and lets a later layer override just one slot.
struct Pool {
  url: String,
  max_connections: i64,
  lazy_connect: bool,
}

fn main() {
  // --- Registration ---
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("pool", |args| {
      Ok(Pool {
        url: args.str(0)?.to_owned(),
        max_connections: args.int(1)?,
        lazy_connect: args.bool(2)?,
      })
    })
    .public()
    // Declared names give named arguments their slots.
    .parameter_names(["url", "max_connections", "lazy_connect"])
    .argument(Argument::value("postgres://localhost"))
    .argument(Argument::value(8i64))
    .argument(Argument::value(false))
    // A named binding overrides the positional argument in its slot.
    .named_argument("max_connections", Argument::value(32i64)),
  );

  // --- Resolution ---
  let resolved = Pipeline::standard().run(graph).expect("wiring is sound");
  let container = Container::new(resolved);

  let pool = container.get::<Pool>("pool").unwrap();
  println!(
    "Pool -> url: {}, max_connections: {}, lazy_connect: {}",
    pool.url, pool.max_connections, pool.lazy_connect
  );

  assert_eq!(pool.url, "postgres://localhost");
  assert_eq!(
    pool.max_connections, 32,
    "The named argument should override the positional one"
  );
  assert!(!pool.lazy_connect);
  println!("The named argument overrode slot 1; other slots kept their positional values.");
}
