//! The runtime container: executes a resolved graph on demand.
//!
//! [`Container`] resolves services directly from a
//! [`ResolvedGraph`](crate::resolver::ResolvedGraph), building each
//! singleton once and caching it. There is no code generation here;
//! this is the interpretation path used in development and in tests,
//! and the reference behavior the compiled path must match.
//!
//! # Concurrency
//!
//! The singleton cache is a sharded map of once-cells. A resolution
//! claims the cell for its id, releases the map shard, and then runs
//! the factory inside the cell's initializer, so concurrent resolutions
//! of different services proceed in parallel while racing resolutions
//! of the same singleton collapse into one construction.

mod guard;

pub use guard::ResolutionGuard;

use std::any::type_name;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::trace;

use crate::args::{ResolvedArg, ResolvedArgs};
use crate::definition::{Lifetime, ServiceInstance, TagAttributes};
use crate::error::ResolveError;
use crate::id::ServiceId;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::proxy::{FailurePolicy, Lazy, ProxyFactory, ProxyHandle};
use crate::resolver::{ArgPlan, ResolvedDefinition, ResolvedGraph};
use crate::value::Value;

/// Tunables for a runtime container.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerOptions {
  /// Failure policy applied to every lazy proxy the container creates.
  pub proxy_failure_policy: FailurePolicy,
}

struct ContainerInner {
  graph: Arc<ResolvedGraph>,
  singletons: DashMap<ServiceId, Arc<OnceCell<ServiceInstance>>>,
  proxies: ProxyFactory,
  metrics: Arc<Metrics>,
}

/// A thread-safe service container over a resolved graph.
///
/// Cloning a container is cheap and every clone shares the same
/// singleton cache and counters.
#[derive(Clone)]
pub struct Container {
  inner: Arc<ContainerInner>,
}

impl Container {
  pub fn new(graph: impl Into<Arc<ResolvedGraph>>) -> Self {
    Container::with_options(graph, ContainerOptions::default())
  }

  pub fn with_options(graph: impl Into<Arc<ResolvedGraph>>, options: ContainerOptions) -> Self {
    Container {
      inner: Arc::new(ContainerInner {
        graph: graph.into(),
        singletons: DashMap::new(),
        proxies: ProxyFactory::new(options.proxy_failure_policy),
        metrics: Arc::new(Metrics::new()),
      }),
    }
  }

  /// The graph this container executes.
  pub fn graph(&self) -> &ResolvedGraph {
    &self.inner.graph
  }

  /// Whether `id` can be fetched from outside: a public definition or
  /// any alias. Private services are invisible here.
  pub fn has(&self, id: &str) -> bool {
    let graph = &self.inner.graph;
    if graph.is_alias(id) {
      return true;
    }
    graph
      .get(id)
      .map(|resolved| resolved.definition().is_public())
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
    let canonical = self.inner.public_entry(id)?;
    self.inner.resolve_canonical(&canonical)
  }

  /// Resolves a value definition and returns its payload.
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
  ///
  /// The target is built on the first [`Lazy::get`], subject to the
  /// container's failure policy.
  pub fn get_lazy<T: Send + Sync + 'static>(&self, id: &str) -> Result<Lazy<T>, ResolveError> {
    let canonical = self.inner.public_entry(id)?;
    Ok(Lazy::from_handle(self.inner.proxy_for(&canonical)))
  }

  /// The definitions carrying `tag`, in declaration order.
  pub fn tagged(&self, tag: &str) -> &[(ServiceId, TagAttributes)] {
    self.inner.graph.tagged(tag)
  }

  /// A snapshot of the resolution counters.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.inner.metrics.snapshot()
  }
}

impl std::fmt::Debug for Container {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Container")
      .field("services", &self.inner.graph.len())
      .field("cached_singletons", &self.inner.singletons.len())
      .field("proxy_policy", &self.inner.proxies.policy())
      .finish()
  }
}

impl ContainerInner {
  /// Maps a public-facing id to the canonical definition id.
  ///
  /// Aliases are public entry points even when their target definition
  /// is private; direct ids must be public.
  fn public_entry(&self, id: &str) -> Result<ServiceId, ResolveError> {
    if let Some(target) = self.graph.alias_target(id) {
      return Ok(target.clone());
    }
    match self.graph.get(id) {
      Some(resolved) if resolved.definition().is_public() => {
        Ok(resolved.definition().id().clone())
      }
      Some(_) => Err(ResolveError::NotPublic {
        id: ServiceId::new(id),
      }),
      None => Err(ResolveError::NotFound {
        id: ServiceId::new(id),
      }),
    }
  }

  fn resolve_canonical(
    self: &Arc<Self>,
    id: &ServiceId,
  ) -> Result<ServiceInstance, ResolveError> {
    self.metrics.record_resolution();
    let resolved = self
      .graph
      .get(id.as_str())
      .ok_or_else(|| ResolveError::NotFound { id: id.clone() })?;

    match resolved.definition().lifetime() {
      Lifetime::Transient => {
        let _guard = ResolutionGuard::enter(id)?;
        self.build_instance(id, resolved)
      }
      Lifetime::Singleton => {
        let cell = self
          .singletons
          .entry(id.clone())
          .or_default()
          .clone();
        if let Some(existing) = cell.get() {
          self.metrics.record_singleton_hit();
          return Ok(existing.clone());
        }
        // Entered before the cell, so a same-thread re-entry surfaces
        // as a cycle error instead of deadlocking the initializer.
        let _guard = ResolutionGuard::enter(id)?;
        let built = cell.get_or_try_init(|| self.build_instance(id, resolved))?;
        Ok(built.clone())
      }
    }
  }

  /// Whether a singleton is already built, without building it.
  fn peek(&self, id: &ServiceId) -> Option<ServiceInstance> {
    self
      .singletons
      .get(id)
      .and_then(|cell| cell.get().cloned())
  }

  /// Runs the factory and method calls. Callers hold the resolution
  /// guard for `id`.
  fn build_instance(
    self: &Arc<Self>,
    id: &ServiceId,
    resolved: &ResolvedDefinition,
  ) -> Result<ServiceInstance, ResolveError> {
    let factory = match resolved.definition().factory() {
      Some(factory) => factory,
      None => {
        // Value definitions resolve to their payload.
        let payload = resolved
          .definition()
          .value_payload()
          .cloned()
          .unwrap_or(Value::Null);
        self.metrics.record_instance_built();
        return Ok(Arc::new(payload));
      }
    };

    let args = self.materialize(resolved.arg_plans())?;
    let mut boxed = factory(&args).map_err(|e| ResolveError::binding(id.clone(), e))?;
    for call in resolved.call_plans() {
      let call_args = self.materialize(call.args())?;
      let applier = call.applier();
      applier(&mut *boxed, &call_args).map_err(|e| ResolveError::binding(id.clone(), e))?;
    }
    self.metrics.record_instance_built();
    trace!(service = %id, "built service instance");
    Ok(Arc::from(boxed))
  }

  fn materialize(self: &Arc<Self>, plans: &[ArgPlan]) -> Result<ResolvedArgs, ResolveError> {
    let mut out = Vec::with_capacity(plans.len());
    for plan in plans {
      out.push(self.materialize_one(plan)?);
    }
    Ok(ResolvedArgs::new(out))
  }

  fn materialize_one(self: &Arc<Self>, plan: &ArgPlan) -> Result<ResolvedArg, ResolveError> {
    match plan {
      ArgPlan::Value(v) => Ok(ResolvedArg::Value(v.clone())),
      ArgPlan::Eager(target) => self.resolve_canonical(target).map(ResolvedArg::Service),
      ArgPlan::Lazy(target) => Ok(ResolvedArg::Lazy(self.proxy_for(target))),
      ArgPlan::Peek(target) => Ok(match self.peek(target) {
        Some(instance) => ResolvedArg::Service(instance),
        None => ResolvedArg::Absent,
      }),
      ArgPlan::Absent => Ok(ResolvedArg::Absent),
      ArgPlan::Seq(items) => {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
          out.push(self.materialize_one(item)?);
        }
        Ok(ResolvedArg::Seq(out))
      }
    }
  }

  fn proxy_for(self: &Arc<Self>, target: &ServiceId) -> ProxyHandle {
    self.metrics.record_proxy_created();
    let inner = Arc::clone(self);
    let target_id = target.clone();
    self.proxies.create_proxy(target.clone(), move || {
      let instance = inner.resolve_canonical(&target_id)?;
      inner.metrics.record_proxy_initialized();
      Ok(instance)
    })
  }
}
