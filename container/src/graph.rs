//! The mutable registry of definitions and aliases.
//!
//! A [`DefinitionGraph`] is what application code populates before
//! handing it to a [`Pipeline`](crate::pipeline::Pipeline). Insertion
//! order is preserved everywhere, which is what makes pipeline output
//! and compilation deterministic. Re-registering an id replaces the
//! earlier entry, so later configuration layers win.

use indexmap::IndexMap;

use crate::args::ResolvedArgs;
use crate::definition::{Definition, Lifetime, Tag};
use crate::error::BoxError;
use crate::id::ServiceId;
use crate::resolver::TagIndex;
use crate::value::Value;

/// An ordered collection of service definitions and aliases.
#[derive(Debug, Default, Clone)]
pub struct DefinitionGraph {
  definitions: IndexMap<ServiceId, Definition>,
  aliases: IndexMap<ServiceId, ServiceId>,
}

impl DefinitionGraph {
  pub fn new() -> Self {
    DefinitionGraph::default()
  }

  /// Inserts a definition, replacing any earlier definition or alias
  /// with the same id.
  pub fn define(&mut self, definition: Definition) -> &mut Definition {
    let id = definition.id().clone();
    self.aliases.shift_remove(&id);
    self.definitions.insert(id.clone(), definition);
    // The entry was just inserted, so the lookup cannot miss.
    self.definitions.get_mut(&id).unwrap()
  }

  /// Registers a public singleton backed by `factory`.
  ///
  /// Convenience for application roots. For private wiring build a
  /// [`Definition`] explicitly and pass it to [`define`](Self::define).
  pub fn singleton<T, F>(&mut self, id: impl Into<ServiceId>, factory: F) -> &mut Definition
  where
    T: Send + Sync + 'static,
    F: Fn(&ResolvedArgs) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    self.define(Definition::service(id, factory).public())
  }

  /// Registers a public transient service backed by `factory`.
  pub fn transient<T, F>(&mut self, id: impl Into<ServiceId>, factory: F) -> &mut Definition
  where
    T: Send + Sync + 'static,
    F: Fn(&ResolvedArgs) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    self.define(
      Definition::service(id, factory)
        .public()
        .with_lifetime(Lifetime::Transient),
    )
  }

  /// Registers a public value definition.
  pub fn value(&mut self, id: impl Into<ServiceId>, value: impl Into<Value>) -> &mut Definition {
    self.define(Definition::value(id, value).public())
  }

  /// Points `alias` at `target`. An existing definition or alias under
  /// `alias` is replaced. Aliases are public entry points.
  pub fn alias(&mut self, alias: impl Into<ServiceId>, target: impl Into<ServiceId>) {
    let alias = alias.into();
    self.definitions.shift_remove(&alias);
    self.aliases.insert(alias, target.into());
  }

  /// Attaches a bare tag to an existing definition. Returns `false`
  /// when no definition with that id exists.
  pub fn tag(&mut self, id: &str, tag: impl Into<String>) -> bool {
    self.tag_with(id, Tag::new(tag))
  }

  /// Attaches a tag with attributes to an existing definition.
  pub fn tag_with(&mut self, id: &str, tag: Tag) -> bool {
    match self.definitions.get_mut(id) {
      Some(def) => {
        def.add_tag(tag);
        true
      }
      None => false,
    }
  }

  // --- Lookup ---

  pub fn get(&self, id: &str) -> Option<&Definition> {
    self.definitions.get(id)
  }

  pub fn get_mut(&mut self, id: &str) -> Option<&mut Definition> {
    self.definitions.get_mut(id)
  }

  pub fn contains_definition(&self, id: &str) -> bool {
    self.definitions.contains_key(id)
  }

  pub fn contains_alias(&self, id: &str) -> bool {
    self.aliases.contains_key(id)
  }

  /// Whether `id` refers to anything, definition or alias.
  pub fn contains(&self, id: &str) -> bool {
    self.contains_definition(id) || self.contains_alias(id)
  }

  pub fn alias_target(&self, alias: &str) -> Option<&ServiceId> {
    self.aliases.get(alias)
  }

  pub fn definitions(&self) -> impl Iterator<Item = (&ServiceId, &Definition)> {
    self.definitions.iter()
  }

  pub(crate) fn definitions_mut(&mut self) -> impl Iterator<Item = (&ServiceId, &mut Definition)> {
    self.definitions.iter_mut()
  }

  pub fn aliases(&self) -> impl Iterator<Item = (&ServiceId, &ServiceId)> {
    self.aliases.iter()
  }

  pub fn len(&self) -> usize {
    self.definitions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.definitions.is_empty()
  }

  pub fn alias_count(&self) -> usize {
    self.aliases.len()
  }

  /// Removes a definition, preserving the order of the rest.
  pub fn remove(&mut self, id: &str) -> Option<Definition> {
    self.definitions.shift_remove(id)
  }

  pub(crate) fn replace_aliases(&mut self, aliases: IndexMap<ServiceId, ServiceId>) {
    self.aliases = aliases;
  }

  pub(crate) fn definition_ids(&self) -> Vec<ServiceId> {
    self.definitions.keys().cloned().collect()
  }
}

/// Builds the tag index for a graph: tag name to the definitions that
/// carry it, both in declaration order.
pub(crate) fn collect_tags(graph: &DefinitionGraph) -> TagIndex {
  let mut index: TagIndex = TagIndex::new();
  for (id, def) in graph.definitions() {
    for tag in def.tags() {
      index
        .entry(tag.name().to_owned())
        .or_default()
        .push((id.clone(), tag.attributes().clone()));
    }
  }
  index
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::definition::Definition;

  struct Noop;

  #[test]
  fn later_registration_wins() {
    let mut graph = DefinitionGraph::new();
    graph.value("threshold", 1i64);
    graph.value("threshold", 2i64);
    assert_eq!(graph.len(), 1);
    let def = graph.get("threshold").unwrap();
    assert_eq!(def.value_payload(), Some(&Value::Int(2)));
  }

  #[test]
  fn an_alias_replaces_a_definition_with_the_same_id() {
    let mut graph = DefinitionGraph::new();
    graph.singleton("log", |_| Ok(Noop));
    graph.singleton("stderr_log", |_| Ok(Noop));
    graph.alias("log", "stderr_log");
    assert!(!graph.contains_definition("log"));
    assert_eq!(graph.alias_target("log").unwrap(), "stderr_log");
  }

  #[test]
  fn removal_preserves_insertion_order() {
    let mut graph = DefinitionGraph::new();
    graph.value("a", 1i64);
    graph.value("b", 2i64);
    graph.value("c", 3i64);
    graph.remove("b");
    let ids: Vec<_> = graph.definitions().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
  }

  #[test]
  fn tags_collect_in_declaration_order() {
    let mut graph = DefinitionGraph::new();
    graph.define(Definition::service("first", |_| Ok(Noop)).tag("handler"));
    graph.define(
      Definition::service("second", |_| Ok(Noop))
        .tag_with(Tag::new("handler").with_attribute("priority", 5i64)),
    );
    let index = collect_tags(&graph);
    let entries = index.get("handler").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "first");
    assert_eq!(entries[1].0, "second");
    assert_eq!(entries[1].1.get("priority"), Some(&Value::Int(5)));
  }
}
