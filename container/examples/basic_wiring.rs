use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weave::{Argument, Container, Definition, DefinitionGraph, Pipeline};

// A service with a dependency and a plain configuration value.
struct Logger {
  level: String,
}

struct Mailer {
  logger: Arc<Logger>,
  transport: String,
}

static BUILDS: AtomicUsize = AtomicUsize::new(0);

fn main() {
  // --- Registration ---
  // Definitions are declarative: a factory closure plus arguments.
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("logger", |args| {
      BUILDS.fetch_add(1, Ordering::SeqCst);
      println!("Building the logger...");
      Ok(Logger {
        level: args.str(0)?.to_owned(),
      })
    })
    .argument(Argument::value("debug")),
  );
  graph.define(
    Definition::service("mailer", |args| {
      Ok(Mailer {
        logger: args.service(0)?,
        transport: args.str(1)?.to_owned(),
      })
    })
    .public()
    .argument(Argument::reference("logger"))
    .argument(Argument::value("smtp")),
  );

  // --- Compilation ---
  // The pipeline validates every reference before anything is built.
  let resolved = Pipeline::standard().run(graph).expect("wiring is sound");
  let container = Container::new(resolved);

  // --- Resolution ---
  let mailer = container.get::<Mailer>("mailer").unwrap();
  println!(
    "Mailer uses {} transport at log level '{}'.",
    mailer.transport, mailer.logger.level
  );

  // Singletons are built once and shared.
  let again = container.get::<Mailer>("mailer").unwrap();
  assert!(
    Arc::ptr_eq(&mailer, &again),
    "Singleton instances should be identical"
  );
  assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
  println!("The logger factory ran exactly once, as expected.");

  // The logger itself is private: only 'mailer' can reach it.
  assert!(container.get::<Logger>("logger").is_err());
  println!("Private services are invisible from outside the container.");
}
