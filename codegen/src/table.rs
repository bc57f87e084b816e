//! The portable form of a resolved graph.
//!
//! A [`CompiledTable`] carries everything a resolved graph knows except
//! the closures: slots in declaration order, every argument lowered to
//! a slot index or a frozen value, a name lookup covering definitions
//! and aliases, and the tag index. Tables serialize to JSON, embed in
//! generated source, and rehydrate into a
//! [`SealedContainer`](crate::sealed::SealedContainer) once the
//! closures are supplied.
//!
//! Interpolated parameters are frozen here: the pipeline has already
//! rewritten every `%scheme:key%` placeholder, so the table stores the
//! final values and the sealed runtime never consults a processor.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use weave::{ArgPlan, Lifetime, ResolvedGraph, Value};

use crate::error::CompileError;
use crate::SCHEMA_VERSION;

/// A resolved graph with every id replaced by a slot index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTable {
  pub schema_version: u32,
  /// Services in declaration order. Index is the slot number.
  pub slots: Vec<CompiledSlot>,
  /// Every addressable name, public or not, plus all aliases.
  pub lookup: Vec<LookupEntry>,
  /// Tag index in declaration order.
  pub tags: Vec<CompiledTag>,
}

/// One service, stripped to what the sealed runtime needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledSlot {
  pub id: String,
  pub type_name: String,
  pub singleton: bool,
  pub public: bool,
  pub lazy: bool,
  /// The payload for value definitions; `None` for factory-backed ones.
  pub value: Option<Value>,
  pub args: Vec<CompiledArg>,
  pub calls: Vec<CompiledCall>,
}

/// A method call with lowered arguments. The applier itself lives in
/// the factory set, keyed by slot id and call position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCall {
  pub name: String,
  pub args: Vec<CompiledArg>,
}

/// An [`ArgPlan`] with service ids turned into slot indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompiledArg {
  Value(Value),
  /// Build the slot before the dependent service.
  Slot(usize),
  /// Deliver a proxy over the slot.
  LazySlot(usize),
  /// Deliver the slot only if its singleton is already built.
  Peek(usize),
  Absent,
  Seq(Vec<CompiledArg>),
}

/// One name the container answers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntry {
  pub name: String,
  pub slot: usize,
  pub public: bool,
  /// Aliases are entry points even when their slot is private.
  pub alias: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTag {
  pub name: String,
  pub entries: Vec<TaggedSlot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedSlot {
  pub slot: usize,
  pub attributes: BTreeMap<String, Value>,
}

/// Lowers a resolved graph into its table form.
///
/// The resolver has already proven every argument and alias target, so
/// a missing slot for one of those means the graph was mutated behind
/// the resolver's back; it is reported as a malformed table rather
/// than silently dropped.
pub fn lower(graph: &ResolvedGraph) -> Result<CompiledTable, CompileError> {
  let mut index: HashMap<&str, usize> = HashMap::with_capacity(graph.len());
  for (position, (id, _)) in graph.definitions().enumerate() {
    index.insert(id.as_str(), position);
  }

  let mut slots = Vec::with_capacity(graph.len());
  for (id, resolved) in graph.definitions() {
    let def = resolved.definition();
    let mut calls = Vec::with_capacity(resolved.call_plans().len());
    for call in resolved.call_plans() {
      calls.push(CompiledCall {
        name: call.name().to_owned(),
        args: lower_plans(&index, call.args())?,
      });
    }
    slots.push(CompiledSlot {
      id: id.as_str().to_owned(),
      type_name: def.type_name().to_owned(),
      singleton: matches!(def.lifetime(), Lifetime::Singleton),
      public: def.is_public(),
      lazy: def.is_lazy(),
      value: def.value_payload().cloned(),
      args: lower_plans(&index, resolved.arg_plans())?,
      calls,
    });
  }

  let mut lookup = Vec::with_capacity(graph.len());
  for (id, resolved) in graph.definitions() {
    lookup.push(LookupEntry {
      name: id.as_str().to_owned(),
      slot: slot_of(&index, id.as_str())?,
      public: resolved.definition().is_public(),
      alias: false,
    });
  }
  for (alias, target) in graph.aliases() {
    lookup.push(LookupEntry {
      name: alias.as_str().to_owned(),
      slot: slot_of(&index, target.as_str())?,
      public: true,
      alias: true,
    });
  }

  // The tag index is collected before pruning, so entries may name
  // definitions that no longer exist. Those can never resolve, so the
  // table does not carry them.
  let mut tags = Vec::with_capacity(graph.tags().len());
  for (name, entries) in graph.tags() {
    let mut lowered = Vec::with_capacity(entries.len());
    for (id, attributes) in entries {
      if let Some(slot) = index.get(id.as_str()).copied() {
        lowered.push(TaggedSlot {
          slot,
          attributes: attributes.clone(),
        });
      }
    }
    tags.push(CompiledTag {
      name: name.clone(),
      entries: lowered,
    });
  }

  Ok(CompiledTable {
    schema_version: SCHEMA_VERSION,
    slots,
    lookup,
    tags,
  })
}

fn slot_of(index: &HashMap<&str, usize>, id: &str) -> Result<usize, CompileError> {
  index
    .get(id)
    .copied()
    .ok_or_else(|| CompileError::MalformedTable {
      detail: format!("reference to unknown service '{}'", id),
    })
}

fn lower_plans(
  index: &HashMap<&str, usize>,
  plans: &[ArgPlan],
) -> Result<Vec<CompiledArg>, CompileError> {
  let mut out = Vec::with_capacity(plans.len());
  for plan in plans {
    out.push(lower_plan(index, plan)?);
  }
  Ok(out)
}

fn lower_plan(index: &HashMap<&str, usize>, plan: &ArgPlan) -> Result<CompiledArg, CompileError> {
  Ok(match plan {
    ArgPlan::Value(v) => CompiledArg::Value(v.clone()),
    ArgPlan::Eager(id) => CompiledArg::Slot(slot_of(index, id.as_str())?),
    ArgPlan::Lazy(id) => CompiledArg::LazySlot(slot_of(index, id.as_str())?),
    ArgPlan::Peek(id) => CompiledArg::Peek(slot_of(index, id.as_str())?),
    ArgPlan::Absent => CompiledArg::Absent,
    ArgPlan::Seq(items) => CompiledArg::Seq(lower_plans(index, items)?),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use weave::{Argument, Definition, DefinitionGraph, Pipeline};

  struct Cache;
  struct Api;

  fn resolved() -> ResolvedGraph {
    let mut graph = DefinitionGraph::new();
    graph.define(Definition::service("cache", |_| Ok(Cache)).tag("infra"));
    graph.define(
      Definition::service("api", |_| Ok(Api))
        .argument(Argument::reference("cache"))
        .argument(Argument::optional_reference("tracer"))
        .public(),
    );
    graph.alias("gateway", "api");
    Pipeline::standard().run(graph).unwrap()
  }

  #[test]
  fn slots_follow_declaration_order() {
    let table = lower(&resolved()).unwrap();
    assert_eq!(table.schema_version, SCHEMA_VERSION);
    assert_eq!(table.slots.len(), 2);
    assert_eq!(table.slots[0].id, "cache");
    assert_eq!(table.slots[1].id, "api");
    assert!(!table.slots[0].public);
    assert!(table.slots[1].public);
  }

  #[test]
  fn references_become_slot_indices() {
    let table = lower(&resolved()).unwrap();
    let api = &table.slots[1];
    assert_eq!(api.args[0], CompiledArg::Slot(0));
    // The optional target does not exist, so nothing is injected.
    assert_eq!(api.args[1], CompiledArg::Absent);
  }

  #[test]
  fn lookup_covers_private_ids_and_aliases() {
    let table = lower(&resolved()).unwrap();
    let cache = table.lookup.iter().find(|e| e.name == "cache").unwrap();
    assert!(!cache.public);
    assert!(!cache.alias);
    let gateway = table.lookup.iter().find(|e| e.name == "gateway").unwrap();
    assert_eq!(gateway.slot, 1);
    assert!(gateway.public);
    assert!(gateway.alias);
  }

  #[test]
  fn tags_point_at_slots() {
    let table = lower(&resolved()).unwrap();
    assert_eq!(table.tags.len(), 1);
    assert_eq!(table.tags[0].name, "infra");
    assert_eq!(table.tags[0].entries[0].slot, 0);
  }

  #[test]
  fn tags_on_pruned_definitions_are_dropped() {
    let mut graph = DefinitionGraph::new();
    graph.define(Definition::service("orphan", |_| Ok(Cache)).tag("infra"));
    graph.define(Definition::service("api", |_| Ok(Api)).public());
    let resolved = Pipeline::standard().run(graph).unwrap();
    let table = lower(&resolved).unwrap();
    let infra = table.tags.iter().find(|t| t.name == "infra").unwrap();
    assert!(infra.entries.is_empty());
  }

  #[test]
  fn tables_round_trip_through_json() {
    let table = lower(&resolved()).unwrap();
    let json = serde_json::to_string(&table).unwrap();
    let back: CompiledTable = serde_json::from_str(&json).unwrap();
    assert_eq!(table, back);
  }
}
