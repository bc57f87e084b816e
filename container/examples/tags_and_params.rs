use weave::{
  Argument, ConstProcessor, Container, Definition, DefinitionGraph, Pipeline, Tag, Value,
};

// Event subscribers discovered through a shared tag, configured through
// %scheme:key% placeholders substituted at pipeline time.
struct Subscriber {
  endpoint: String,
}

fn main() {
  // --- Registration ---
  let mut graph = DefinitionGraph::new();
  graph.define(
    Definition::service("billing_subscriber", |args| {
      Ok(Subscriber {
        endpoint: args.str(0)?.to_owned(),
      })
    })
    .public()
    // An embedded placeholder renders into the surrounding string.
    .argument(Argument::value("https://%const:host%/billing"))
    .tag_with(Tag::new("event.subscriber").with_attribute("priority", 10i64)),
  );
  graph.define(
    Definition::service("audit_subscriber", |args| {
      Ok(Subscriber {
        endpoint: args.str(0)?.to_owned(),
      })
    })
    .public()
    .argument(Argument::value("https://%const:host%/audit"))
    .tag_with(Tag::new("event.subscriber").with_attribute("priority", 90i64)),
  );

  // --- Compilation ---
  // The const processor supplies %const:...% values once, here. The
  // container never re-reads the source at resolution time.
  let pipeline = Pipeline::standard().with_processor(ConstProcessor::new([(
    "host".to_owned(),
    Value::Str("events.internal".into()),
  )]));
  let resolved = pipeline.run(graph).expect("wiring is sound");
  let container = Container::new(resolved);

  // --- Discovery through the tag index ---
  let subscribers = container.tagged("event.subscriber");
  assert_eq!(subscribers.len(), 2);
  println!("Found {} tagged subscribers:", subscribers.len());
  for (id, attributes) in subscribers {
    let subscriber = container.get::<Subscriber>(id.as_str()).unwrap();
    println!(
      "  {} -> {} (priority {:?})",
      id,
      subscriber.endpoint,
      attributes.get("priority").unwrap()
    );
    assert!(
      subscriber.endpoint.starts_with("https://events.internal/"),
      "Placeholders should be substituted at pipeline time"
    );
  }

  // Declaration order is preserved; attributes ride along.
  assert_eq!(subscribers[0].0, "billing_subscriber");
  assert_eq!(subscribers[0].1.get("priority"), Some(&Value::Int(10)));
}
