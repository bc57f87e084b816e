//! The sealed runtime: a container rebuilt from a compiled table.
//!
//! A [`SealedContainer`] executes a [`CompiledTable`] with the closures
//! supplied by a [`FactorySet`]. It resolves by slot index instead of
//! id lookup and never touches a pipeline, a resolver, or a parameter
//! processor; the table already carries the final, interpolated plan.
//! Observable behavior matches the dev-time container: one build per
//! singleton under arbitrary thread interleavings, guard-reported
//! re-entry cycles, lazy proxies sharing the slot's singleton, and the
//! same error surface.

use std::any::type_name;
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::trace;

use weave::{
  BoxError, BoxedService, ContainerOptions, DefinitionGraph, Lazy, MethodApplier, ProxyFactory,
  ProxyHandle, ResolutionGuard, ResolveError, ResolvedArg, ResolvedArgs, ServiceFactory,
  ServiceId, ServiceInstance, TagAttributes, Value,
};

use crate::error::CompileError;
use crate::table::{CompiledArg, CompiledTable};
use crate::SCHEMA_VERSION;

// --- Factory set ---

/// The closures a table cannot carry: factories by service id and
/// method appliers by id and call position.
///
/// Tables are data; this is the code half of an artifact. Hydration
/// fails loudly when a slot finds no closure here, which is what makes
/// a stale factory set detectable instead of a silent miswire.
#[derive(Default, Clone)]
pub struct FactorySet {
  factories: HashMap<String, ServiceFactory>,
  appliers: HashMap<(String, usize), MethodApplier>,
}

impl FactorySet {
  pub fn new() -> Self {
    FactorySet::default()
  }

  /// Harvests every factory and applier from a definition graph.
  ///
  /// The graph may be a superset of the table; pruned definitions just
  /// contribute closures nothing asks for. This is the usual path: the
  /// same registration code that produced the compiled graph also
  /// supplies the closures at startup.
  pub fn from_graph(graph: &DefinitionGraph) -> Self {
    let mut set = FactorySet::new();
    for (id, def) in graph.definitions() {
      if let Some(factory) = def.factory() {
        set.factories.insert(id.as_str().to_owned(), factory);
      }
      for (position, call) in def.method_calls().iter().enumerate() {
        set
          .appliers
          .insert((id.as_str().to_owned(), position), call.applier());
      }
    }
    set
  }

  /// Registers a factory for `id`, replacing any earlier one.
  pub fn register<T, F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
  where
    T: Send + Sync + 'static,
    F: Fn(&ResolvedArgs) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    let factory: ServiceFactory =
      Arc::new(move |args| factory(args).map(|service| Box::new(service) as BoxedService));
    self.factories.insert(id.into(), factory);
    self
  }

  /// Registers the applier for `id`'s method call at `position`.
  pub fn register_applier<T, F>(
    &mut self,
    id: impl Into<String>,
    position: usize,
    applier: F,
  ) -> &mut Self
  where
    T: Send + Sync + 'static,
    F: Fn(&mut T, &ResolvedArgs) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    let wrapped: MethodApplier = Arc::new(move |target, args| {
      let target = target
        .downcast_mut::<T>()
        .ok_or_else(|| -> BoxError { format!("receiver is not a {}", type_name::<T>()).into() })?;
      applier(target, args)
    });
    self.appliers.insert((id.into(), position), wrapped);
    self
  }

  pub fn len(&self) -> usize {
    self.factories.len()
  }

  pub fn is_empty(&self) -> bool {
    self.factories.is_empty()
  }
}

impl std::fmt::Debug for FactorySet {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("FactorySet")
      .field("factories", &self.factories.len())
      .field("appliers", &self.appliers.len())
      .finish()
  }
}

// --- Sealed container ---

struct SealedCall {
  applier: MethodApplier,
  args: Vec<CompiledArg>,
}

struct SealedSlot {
  id: ServiceId,
  singleton: bool,
  value: Option<Value>,
  factory: Option<ServiceFactory>,
  args: Vec<CompiledArg>,
  calls: Vec<SealedCall>,
  cell: OnceCell<ServiceInstance>,
}

struct LookupTarget {
  slot: usize,
  public: bool,
  alias: bool,
}

struct SealedInner {
  slots: Vec<SealedSlot>,
  lookup: HashMap<String, LookupTarget>,
  tags: HashMap<String, Vec<(ServiceId, TagAttributes)>>,
  proxies: ProxyFactory,
}

/// A thread-safe container executing a compiled table.
///
/// Cloning is cheap; every clone shares the same singleton cells.
#[derive(Clone)]
pub struct SealedContainer {
  inner: Arc<SealedInner>,
}

impl SealedContainer {
  /// Binds a table to its closures and validates the pairing.
  ///
  /// Every factory-backed slot must find its factory, every method
  /// call its applier, and every slot index must be in range. The
  /// table itself is trusted beyond that; it was proven by the
  /// resolver when it was lowered.
  pub fn hydrate(
    table: &CompiledTable,
    mut factories: FactorySet,
    options: ContainerOptions,
  ) -> Result<SealedContainer, CompileError> {
    if table.schema_version != SCHEMA_VERSION {
      return Err(CompileError::SchemaMismatch {
        found: table.schema_version,
        expected: SCHEMA_VERSION,
      });
    }

    let len = table.slots.len();
    let mut slots = Vec::with_capacity(len);
    for slot in &table.slots {
      for arg in &slot.args {
        check_arg(arg, len)?;
      }
      let factory = match &slot.value {
        Some(_) => None,
        None => Some(factories.factories.remove(&slot.id).ok_or_else(|| {
          CompileError::MissingFactory {
            id: ServiceId::new(&slot.id),
          }
        })?),
      };
      let mut calls = Vec::with_capacity(slot.calls.len());
      for (position, call) in slot.calls.iter().enumerate() {
        for arg in &call.args {
          check_arg(arg, len)?;
        }
        let applier = factories
          .appliers
          .remove(&(slot.id.clone(), position))
          .ok_or_else(|| CompileError::MissingApplier {
            id: ServiceId::new(&slot.id),
            call: call.name.clone(),
          })?;
        calls.push(SealedCall {
          applier,
          args: call.args.clone(),
        });
      }
      slots.push(SealedSlot {
        id: ServiceId::new(&slot.id),
        singleton: slot.singleton,
        value: slot.value.clone(),
        factory,
        args: slot.args.clone(),
        calls,
        cell: OnceCell::new(),
      });
    }

    let mut lookup = HashMap::with_capacity(table.lookup.len());
    for entry in &table.lookup {
      if entry.slot >= len {
        return Err(CompileError::MalformedTable {
          detail: format!("lookup entry '{}' points at slot {} of {}", entry.name, entry.slot, len),
        });
      }
      lookup.insert(
        entry.name.clone(),
        LookupTarget {
          slot: entry.slot,
          public: entry.public,
          alias: entry.alias,
        },
      );
    }

    let mut tags: HashMap<String, Vec<(ServiceId, TagAttributes)>> =
      HashMap::with_capacity(table.tags.len());
    for tag in &table.tags {
      let mut entries = Vec::with_capacity(tag.entries.len());
      for tagged in &tag.entries {
        if tagged.slot >= len {
          return Err(CompileError::MalformedTable {
            detail: format!("tag '{}' points at slot {} of {}", tag.name, tagged.slot, len),
          });
        }
        entries.push((slots[tagged.slot].id.clone(), tagged.attributes.clone()));
      }
      tags.insert(tag.name.clone(), entries);
    }

    Ok(SealedContainer {
      inner: Arc::new(SealedInner {
        slots,
        lookup,
        tags,
        proxies: ProxyFactory::new(options.proxy_failure_policy),
      }),
    })
  }

  /// Whether `id` can be fetched from outside: a public slot or any
  /// alias. Private slots are invisible here.
  pub fn has(&self, id: &str) -> bool {
    self
      .inner
      .lookup
      .get(id)
      .map(|target| target.alias || target.public)
      .unwrap_or(false)
  }

  /// Resolves `id` and downcasts the instance to `T`.
  pub fn get<T: Send + Sync + 'static>(&self, id: &str) -> Result<Arc<T>, ResolveError> {
    let instance = self.get_untyped(id)?;
    instance
      .downcast::<T>()
      .map_err(|_| ResolveError::TypeMismatch {
        id: ServiceId::new(id),
        expected: type_name::<T>(),
      })
  }

  /// Resolves `id` without committing to a type.
  pub fn get_untyped(&self, id: &str) -> Result<ServiceInstance, ResolveError> {
    let slot = self.inner.public_entry(id)?;
    self.inner.resolve_slot(slot)
  }

  /// Resolves a value slot and returns its payload.
  pub fn get_value(&self, id: &str) -> Result<Value, ResolveError> {
    let instance = self.get_untyped(id)?;
    match instance.downcast::<Value>() {
      Ok(value) => Ok((*value).clone()),
      Err(_) => Err(ResolveError::TypeMismatch {
        id: ServiceId::new(id),
        expected: type_name::<Value>(),
      }),
    }
  }

  /// Returns a typed lazy proxy for `id` without building anything.
  pub fn get_lazy<T: Send + Sync + 'static>(&self, id: &str) -> Result<Lazy<T>, ResolveError> {
    let slot = self.inner.public_entry(id)?;
    Ok(Lazy::from_handle(self.inner.proxy_for(slot)))
  }

  /// The services carrying `tag`, in declaration order.
  pub fn tagged(&self, tag: &str) -> &[(ServiceId, TagAttributes)] {
    self
      .inner
      .tags
      .get(tag)
      .map(Vec::as_slice)
      .unwrap_or(&[])
  }

  /// Number of slots in the table, public and private.
  pub fn len(&self) -> usize {
    self.inner.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.slots.is_empty()
  }
}

impl std::fmt::Debug for SealedContainer {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SealedContainer")
      .field("services", &self.inner.slots.len())
      .field("proxy_policy", &self.inner.proxies.policy())
      .finish()
  }
}

fn binding(id: &ServiceId, source: BoxError) -> ResolveError {
  ResolveError::Binding {
    id: id.clone(),
    source: Arc::from(source),
  }
}

fn check_arg(arg: &CompiledArg, len: usize) -> Result<(), CompileError> {
  match arg {
    CompiledArg::Slot(i) | CompiledArg::LazySlot(i) | CompiledArg::Peek(i) if *i >= len => {
      Err(CompileError::MalformedTable {
        detail: format!("argument points at slot {} of {}", i, len),
      })
    }
    CompiledArg::Seq(items) => {
      for item in items {
        check_arg(item, len)?;
      }
      Ok(())
    }
    _ => Ok(()),
  }
}

impl SealedInner {
  /// Maps a public-facing name to its slot. Aliases are entry points
  /// even when the slot itself is private; direct ids must be public.
  fn public_entry(&self, id: &str) -> Result<usize, ResolveError> {
    match self.lookup.get(id) {
      Some(target) if target.alias || target.public => Ok(target.slot),
      Some(_) => Err(ResolveError::NotPublic {
        id: ServiceId::new(id),
      }),
      None => Err(ResolveError::NotFound {
        id: ServiceId::new(id),
      }),
    }
  }

  fn resolve_slot(self: &Arc<Self>, index: usize) -> Result<ServiceInstance, ResolveError> {
    let slot = &self.slots[index];
    if !slot.singleton {
      let _guard = ResolutionGuard::enter(&slot.id)?;
      return self.build_slot(slot);
    }
    if let Some(existing) = slot.cell.get() {
      return Ok(existing.clone());
    }
    // Entered before the cell, so a same-thread re-entry surfaces as a
    // cycle error instead of deadlocking the initializer.
    let _guard = ResolutionGuard::enter(&slot.id)?;
    let built = slot.cell.get_or_try_init(|| self.build_slot(slot))?;
    Ok(built.clone())
  }

  /// Runs the factory and method calls. Callers hold the resolution
  /// guard for the slot's id.
  fn build_slot(self: &Arc<Self>, slot: &SealedSlot) -> Result<ServiceInstance, ResolveError> {
    let factory = match &slot.factory {
      Some(factory) => Arc::clone(factory),
      None => {
        // Value slots resolve to their payload.
        let payload = slot.value.clone().unwrap_or(Value::Null);
        return Ok(Arc::new(payload));
      }
    };

    let args = self.materialize(&slot.args)?;
    let mut boxed = factory(&args).map_err(|e| binding(&slot.id, e))?;
    for call in &slot.calls {
      let call_args = self.materialize(&call.args)?;
      (call.applier)(&mut *boxed, &call_args).map_err(|e| binding(&slot.id, e))?;
    }
    trace!(service = %slot.id, "built sealed instance");
    Ok(Arc::from(boxed))
  }

  fn materialize(self: &Arc<Self>, args: &[CompiledArg]) -> Result<ResolvedArgs, ResolveError> {
    let mut out = Vec::with_capacity(args.len());
    for arg in args {
      out.push(self.materialize_one(arg)?);
    }
    Ok(ResolvedArgs::new(out))
  }

  fn materialize_one(self: &Arc<Self>, arg: &CompiledArg) -> Result<ResolvedArg, ResolveError> {
    match arg {
      CompiledArg::Value(v) => Ok(ResolvedArg::Value(v.clone())),
      CompiledArg::Slot(index) => self.resolve_slot(*index).map(ResolvedArg::Service),
      CompiledArg::LazySlot(index) => Ok(ResolvedArg::Lazy(self.proxy_for(*index))),
      CompiledArg::Peek(index) => Ok(match self.slots[*index].cell.get() {
        Some(instance) => ResolvedArg::Service(instance.clone()),
        None => ResolvedArg::Absent,
      }),
      CompiledArg::Absent => Ok(ResolvedArg::Absent),
      CompiledArg::Seq(items) => {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
          out.push(self.materialize_one(item)?);
        }
        Ok(ResolvedArg::Seq(out))
      }
    }
  }

  fn proxy_for(self: &Arc<Self>, index: usize) -> ProxyHandle {
    let inner = Arc::clone(self);
    let id = self.slots[index].id.clone();
    self
      .proxies
      .create_proxy(id, move || inner.resolve_slot(index))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use weave::{Argument, Definition, Pipeline};

  use crate::table::lower;

  struct Widget;

  fn lowered(graph: DefinitionGraph) -> CompiledTable {
    lower(&Pipeline::standard().run(graph).unwrap()).unwrap()
  }

  #[test]
  fn a_missing_factory_is_reported_by_id() {
    let mut graph = DefinitionGraph::new();
    graph.singleton("widget", |_| Ok(Widget));
    let table = lowered(graph);

    let err = SealedContainer::hydrate(&table, FactorySet::new(), ContainerOptions::default())
      .unwrap_err();
    match err {
      CompileError::MissingFactory { id } => assert_eq!(id, "widget"),
      other => panic!("expected MissingFactory, got {:?}", other),
    }
  }

  #[test]
  fn a_missing_applier_names_the_call() {
    let mut graph = DefinitionGraph::new();
    graph.define(
      Definition::service("widget", |_| Ok(Widget))
        .method_call("configure", [Argument::value(1i64)], |_: &mut Widget, _| Ok(()))
        .public(),
    );
    let table = lowered(graph);

    let mut set = FactorySet::new();
    set.register("widget", |_| Ok(Widget));
    let err = SealedContainer::hydrate(&table, set, ContainerOptions::default()).unwrap_err();
    match err {
      CompileError::MissingApplier { id, call } => {
        assert_eq!(id, "widget");
        assert_eq!(call, "configure");
      }
      other => panic!("expected MissingApplier, got {:?}", other),
    }
  }

  #[test]
  fn a_foreign_schema_is_rejected() {
    let mut graph = DefinitionGraph::new();
    graph.singleton("widget", |_| Ok(Widget));
    let mut table = lowered(graph.clone());
    table.schema_version = 99;

    let err = SealedContainer::hydrate(
      &table,
      FactorySet::from_graph(&graph),
      ContainerOptions::default(),
    )
    .unwrap_err();
    match err {
      CompileError::SchemaMismatch { found, expected } => {
        assert_eq!(found, 99);
        assert_eq!(expected, SCHEMA_VERSION);
      }
      other => panic!("expected SchemaMismatch, got {:?}", other),
    }
  }

  #[test]
  fn out_of_range_slots_are_rejected() {
    let mut graph = DefinitionGraph::new();
    graph.singleton("widget", |_| Ok(Widget));
    let mut table = lowered(graph.clone());
    table.slots[0].args.push(CompiledArg::Slot(42));

    let err = SealedContainer::hydrate(
      &table,
      FactorySet::from_graph(&graph),
      ContainerOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::MalformedTable { .. }));
  }
}
