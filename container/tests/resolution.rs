// Runtime container behavior: caching, lifetimes, visibility, values,
// method calls, and the error surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weave::{
  Argument, Container, Definition, DefinitionGraph, Lifetime, Pipeline, ResolveError, Value,
};

#[derive(Debug)]
struct Logger {
  level: String,
}

#[derive(Debug)]
struct Mailer {
  logger: Arc<Logger>,
  transport: String,
}

#[derive(Debug)]
struct Repository {
  connections: i64,
}

fn compile(graph: DefinitionGraph) -> Container {
  Container::new(Pipeline::standard().run(graph).unwrap())
}

#[test]
fn singletons_are_built_once_and_shared() {
  let built = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&built);

  let mut graph = DefinitionGraph::new();
  graph.singleton("logger", move |_| {
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(Logger {
      level: "info".into(),
    })
  });

  let container = compile(graph);
  let first = container.get::<Logger>("logger").unwrap();
  let second = container.get::<Logger>("logger").unwrap();

  assert!(Arc::ptr_eq(&first, &second));
  assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[test]
fn transients_get_a_fresh_instance_every_time() {
  let built = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&built);

  let mut graph = DefinitionGraph::new();
  graph.transient("repo", move |_| {
    let n = counter.fetch_add(1, Ordering::SeqCst);
    Ok(Repository {
      connections: n as i64,
    })
  });

  let container = compile(graph);
  let first = container.get::<Repository>("repo").unwrap();
  let second = container.get::<Repository>("repo").unwrap();

  assert!(!Arc::ptr_eq(&first, &second));
  assert_eq!(built.load(Ordering::SeqCst), 2);
  assert_ne!(first.connections, second.connections);
}

#[test]
fn dependencies_arrive_through_resolved_args() {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("logger", |args| {
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

  let container = compile(graph);
  let mailer = container.get::<Mailer>("mailer").unwrap();
  assert_eq!(mailer.logger.level, "debug");
  assert_eq!(mailer.transport, "smtp");
}

#[test]
fn a_shared_dependency_is_the_same_instance_everywhere() {
  let mut graph = DefinitionGraph::new();
  graph.define(Definition::service("logger", |_| {
    Ok(Logger {
      level: "info".into(),
    })
  }));
  graph.define(
    Definition::service("mailer_a", |args| {
      Ok(Mailer {
        logger: args.service(0)?,
        transport: "a".into(),
      })
    })
    .public()
    .argument(Argument::reference("logger")),
  );
  graph.define(
    Definition::service("mailer_b", |args| {
      Ok(Mailer {
        logger: args.service(0)?,
        transport: "b".into(),
      })
    })
    .public()
    .argument(Argument::reference("logger")),
  );

  let container = compile(graph);
  let a = container.get::<Mailer>("mailer_a").unwrap();
  let b = container.get::<Mailer>("mailer_b").unwrap();
  assert!(Arc::ptr_eq(&a.logger, &b.logger));
}

#[test]
fn an_alias_serves_the_identical_singleton() {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("logger", |_| {
      Ok(Logger {
        level: "info".into(),
      })
    })
    .public(),
  );
  graph.define(
    Definition::service("mailer", |args| {
      Ok(Mailer {
        logger: args.service(0)?,
        transport: "smtp".into(),
      })
    })
    .public()
    .argument(Argument::reference("logger")),
  );
  graph.alias("log", "logger");

  let container = compile(graph);
  let direct = container.get::<Logger>("logger").unwrap();
  let aliased = container.get::<Logger>("log").unwrap();
  assert!(Arc::ptr_eq(&direct, &aliased));

  let mailer = container.get::<Mailer>("mailer").unwrap();
  assert!(Arc::ptr_eq(&mailer.logger, &direct));
}

#[test]
fn private_services_are_invisible_from_outside() {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("internal", |_| {
      Ok(Logger {
        level: "info".into(),
      })
    })
    .public(),
  );
  graph.define(Definition::service("hidden", |_| {
    Ok(Logger {
      level: "secret".into(),
    })
  }));
  // Keep the private service reachable so pruning leaves it in place.
  graph.alias("hidden_api", "hidden");

  let container = compile(graph);
  assert!(container.has("internal"));
  assert!(!container.has("hidden"));
  assert!(container.has("hidden_api"));

  let err = container.get::<Logger>("hidden").unwrap_err();
  assert!(matches!(err, ResolveError::NotPublic { .. }));

  // Aliases are public entry points, even onto private targets.
  assert!(container.get::<Logger>("hidden_api").is_ok());

  let err = container.get::<Logger>("nowhere").unwrap_err();
  assert!(matches!(err, ResolveError::NotFound { .. }));
}

#[test]
fn value_definitions_resolve_to_their_payload() {
  let mut graph = DefinitionGraph::new();
  graph.value("retries", 5i64);
  graph.value("hosts", vec!["a", "b"]);

  let container = compile(graph);
  assert_eq!(container.get_value("retries").unwrap(), Value::Int(5));
  assert_eq!(
    container.get_value("hosts").unwrap(),
    Value::Seq(vec![Value::Str("a".into()), Value::Str("b".into())])
  );
  // The typed surface works too; values are ordinary instances.
  let typed = container.get::<Value>("retries").unwrap();
  assert_eq!(*typed, Value::Int(5));
}

#[test]
fn method_calls_run_in_registration_order_before_sharing() {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("logger", |_| {
      Ok(Logger {
        level: String::new(),
      })
    })
    .public()
    .method_call::<Logger, _>("set_level", [Argument::value("warn")], |logger, args| {
      logger.level = args.str(0)?.to_owned();
      Ok(())
    })
    .method_call::<Logger, _>("append_suffix", [], |logger, _| {
      logger.level.push_str("+audit");
      Ok(())
    }),
  );

  let container = compile(graph);
  let logger = container.get::<Logger>("logger").unwrap();
  assert_eq!(logger.level, "warn+audit");
}

#[test]
fn optional_references_peek_at_the_singleton_cache() {
  let mut graph = DefinitionGraph::new();
  graph.singleton("maybe_logger", |_| {
    Ok(Logger {
      level: "info".into(),
    })
  });
  graph.define(
    Definition::service("consumer", |args| {
      let seen = args.optional_service::<Logger>(0)?.is_some();
      Ok(Repository {
        connections: if seen { 1 } else { 0 },
      })
    })
    .public()
    .transient()
    .argument(Argument::optional_reference("maybe_logger")),
  );

  let container = compile(graph);
  // Not built yet: the optional edge sees nothing.
  let before = container.get::<Repository>("consumer").unwrap();
  assert_eq!(before.connections, 0);

  container.get::<Logger>("maybe_logger").unwrap();
  let after = container.get::<Repository>("consumer").unwrap();
  assert_eq!(after.connections, 1);
}

#[test]
fn missing_optional_references_inject_nothing() {
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("consumer", |args| {
      assert!(args.optional_service::<Logger>(0)?.is_none());
      Ok(Repository { connections: 0 })
    })
    .public()
    .argument(Argument::optional_reference("never_registered")),
  );

  let container = compile(graph);
  assert!(container.get::<Repository>("consumer").is_ok());
}

#[test]
fn collection_arguments_deliver_nested_plans() {
  let mut graph = DefinitionGraph::new();
  graph.define(Definition::service("logger", |_| {
    Ok(Logger {
      level: "info".into(),
    })
  }));
  graph.define(
    Definition::service("fanout", |args| {
      let items = args.seq(0)?;
      let mut connections = 0;
      for item in items {
        if item.as_service::<Logger>().is_some() || item.as_value().is_some() {
          connections += 1;
        }
      }
      Ok(Repository { connections })
    })
    .public()
    .argument(Argument::collection([
      Argument::reference("logger"),
      Argument::value(9i64),
    ])),
  );

  let container = compile(graph);
  let fanout = container.get::<Repository>("fanout").unwrap();
  assert_eq!(fanout.connections, 2);
}

#[test]
fn factory_failures_surface_as_binding_errors() {
  let mut graph = DefinitionGraph::new();
  graph.singleton("db", |_| -> Result<Repository, weave::BoxError> {
    Err("connection refused".into())
  });

  let container = compile(graph);
  let err = container.get::<Repository>("db").unwrap_err();
  match &err {
    ResolveError::Binding { id, .. } => {
      assert_eq!(*id, "db");
      assert!(err.to_string().contains("connection refused"));
    }
    other => panic!("expected a binding error, got {:?}", other),
  }
}

#[test]
fn requesting_the_wrong_type_is_reported() {
  let mut graph = DefinitionGraph::new();
  graph.singleton("logger", |_| {
    Ok(Logger {
      level: "info".into(),
    })
  });
  let container = compile(graph);
  let err = container.get::<Mailer>("logger").unwrap_err();
  assert!(matches!(err, ResolveError::TypeMismatch { .. }));
}

#[test]
fn tagged_lookup_resolves_in_declaration_order() {
  let mut graph = DefinitionGraph::new();
  for name in ["first", "second", "third"] {
    let level = name.to_owned();
    graph.define(
      Definition::service(name, move |_| {
        Ok(Logger {
          level: level.clone(),
        })
      })
      .public()
      .tag("sink"),
    );
  }

  let container = compile(graph);
  let levels: Vec<String> = container
    .tagged("sink")
    .iter()
    .map(|(id, _)| {
      container
        .get::<Logger>(id.as_str())
        .unwrap()
        .level
        .clone()
    })
    .collect();
  assert_eq!(levels, vec!["first", "second", "third"]);
}

#[test]
fn metrics_track_builds_and_cache_hits() {
  let mut graph = DefinitionGraph::new();
  graph.singleton("logger", |_| {
    Ok(Logger {
      level: "info".into(),
    })
  });
  graph
    .transient("repo", |_| Ok(Repository { connections: 1 }))
    .add_tag(weave::Tag::new("data"));

  let container = compile(graph);
  container.get::<Logger>("logger").unwrap();
  container.get::<Logger>("logger").unwrap();
  container.get::<Repository>("repo").unwrap();

  let metrics = container.metrics();
  assert_eq!(metrics.resolutions, 3);
  assert_eq!(metrics.singleton_hits, 1);
  assert_eq!(metrics.instances_built, 2);
}

#[test]
fn lifetimes_are_visible_on_the_resolved_graph() {
  let mut graph = DefinitionGraph::new();
  graph.singleton("single", |_| Ok(Logger { level: "a".into() }));
  graph.transient("fresh", |_| Ok(Logger { level: "b".into() }));
  let container = compile(graph);
  let graph = container.graph();
  assert_eq!(
    graph.get("single").unwrap().definition().lifetime(),
    Lifetime::Singleton
  );
  assert_eq!(
    graph.get("fresh").unwrap().definition().lifetime(),
    Lifetime::Transient
  );
}
