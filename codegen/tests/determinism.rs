// Artifact determinism: the same registrations always compile to the
// same bytes, and every structural change moves the graph fingerprint.

use pretty_assertions::assert_eq;
use weave::{Argument, ConstProcessor, Definition, DefinitionGraph, Pipeline, Tag, Value};
use weave_codegen::{compile, graph_fingerprint, lower, resolved_fingerprint};

struct Registry;

struct Dispatcher;

struct Auditor;

// A wiring that exercises every feature the fingerprint has to see:
// values, interpolation, references, lazy edges, method calls, tags
// with attributes, visibility, and an alias.
fn wiring_with(priority: i64, call_limit: i64) -> DefinitionGraph {
  let mut graph = DefinitionGraph::new();
  graph.value("region", "%const:region%");
  graph.define(
    Definition::service("registry", |args| {
      args.service::<Value>(0)?;
      Ok(Registry)
    })
    .argument(Argument::reference("region")),
  );
  graph.define(
    Definition::service("dispatcher", |args| {
      args.service::<Registry>(0)?;
      Ok(Dispatcher)
    })
    .public()
    .argument(Argument::reference("registry"))
    .method_call(
      "set_limit",
      [Argument::value(call_limit)],
      |_: &mut Dispatcher, args| {
        args.int(0)?;
        Ok(())
      },
    )
    .tag_with(Tag::new("bus.handler").with_attribute("priority", priority)),
  );
  graph.define(
    Definition::service("auditor", |args| {
      args.lazy::<Dispatcher>(0)?;
      Ok(Auditor)
    })
    .public()
    .argument(Argument::lazy_reference("dispatcher"))
    .tag("bus.handler"),
  );
  graph.alias("router", "dispatcher");
  graph
}

fn wiring() -> DefinitionGraph {
  wiring_with(10, 16)
}

fn pipeline_with(region: &str) -> Pipeline {
  Pipeline::standard().with_processor(ConstProcessor::new([(
    "region".to_owned(),
    Value::Str(region.to_owned()),
  )]))
}

#[test]
fn identical_registrations_compile_identical_artifacts() {
  let first = compile(&wiring(), &pipeline_with("eu-west")).unwrap();
  let second = compile(&wiring(), &pipeline_with("eu-west")).unwrap();

  assert_eq!(first.source, second.source);
  assert_eq!(first.table, second.table);
  assert_eq!(first.manifest.fingerprint, second.manifest.fingerprint);
  assert_eq!(
    first.manifest.source_fingerprint,
    second.manifest.source_fingerprint
  );
}

#[test]
fn slot_layout_follows_declaration_order() {
  let table = lower(&pipeline_with("eu-west").run(wiring()).unwrap()).unwrap();

  let ids: Vec<_> = table.slots.iter().map(|slot| slot.id.as_str()).collect();
  assert_eq!(ids, vec!["region", "registry", "dispatcher", "auditor"]);

  let router = table
    .lookup
    .iter()
    .find(|entry| entry.name == "router")
    .expect("alias entry");
  assert!(router.alias);
  assert_eq!(table.slots[router.slot].id, "dispatcher");
}

#[test]
fn structural_changes_move_the_graph_fingerprint() {
  let base = graph_fingerprint(&wiring());

  let mut replaced_value = wiring();
  replaced_value.value("region", "%const:other%");

  let mut extra_tag = wiring();
  extra_tag.tag("dispatcher", "audited");

  // Identical to the base auditor except for the lifetime bit.
  let mut made_transient = wiring();
  made_transient.define(
    Definition::service("auditor", |args| {
      args.lazy::<Dispatcher>(0)?;
      Ok(Auditor)
    })
    .public()
    .transient()
    .argument(Argument::lazy_reference("dispatcher"))
    .tag("bus.handler"),
  );

  let mut extra_alias = wiring();
  extra_alias.alias("spare", "auditor");

  let mut retargeted_alias = wiring();
  retargeted_alias.alias("router", "auditor");

  let mut extra_definition = wiring();
  extra_definition.singleton("warmup", |_| Ok(Registry));

  let cases = [
    ("replaced value payload", replaced_value),
    ("added tag", extra_tag),
    ("changed tag attribute", wiring_with(11, 16)),
    ("changed call argument", wiring_with(10, 32)),
    ("changed lifetime", made_transient),
    ("added alias", extra_alias),
    ("retargeted alias", retargeted_alias),
    ("added definition", extra_definition),
  ];
  for (label, graph) in cases {
    assert_ne!(base, graph_fingerprint(&graph), "{} went unnoticed", label);
  }
}

// The two digests split responsibilities: the graph fingerprint keys
// the cache and sees only registrations, while the resolved fingerprint
// identifies the final plan, interpolated parameters included.
#[test]
fn parameter_sources_shape_only_the_resolved_fingerprint() {
  let graph = wiring();
  assert_eq!(graph_fingerprint(&graph), graph_fingerprint(&wiring()));

  let west = pipeline_with("eu-west").run(graph.clone()).unwrap();
  let east = pipeline_with("us-east").run(graph).unwrap();
  assert_ne!(resolved_fingerprint(&west), resolved_fingerprint(&east));
}

#[test]
fn the_generated_source_is_self_describing() {
  let artifact = compile(&wiring(), &pipeline_with("eu-west")).unwrap();

  let fingerprint = artifact.manifest.fingerprint.as_str();
  assert!(artifact
    .source
    .contains(&format!("pub const FINGERPRINT: &str = \"{}\";", fingerprint)));
  assert!(artifact.source.contains(&format!(
    "pub const SERVICE_COUNT: usize = {};",
    artifact.table.slots.len()
  )));
  assert!(artifact.source.contains("pub fn table()"));
  assert!(artifact.source.contains("pub fn slot_index(id: &str)"));
  // The interpolated parameter is baked in; the placeholder is gone.
  assert!(artifact.source.contains("eu-west"));
  assert!(!artifact.source.contains("%const:region%"));
}
