//! Lazy proxies: placeholders that build their target on first use.
//!
//! A [`ProxyHandle`] stands in for a service that has not been built
//! yet. Touching it runs the initializer exactly once, no matter how
//! many clones of the handle exist or how many threads race on the
//! first touch. What happens when that single initialization fails is
//! the [`FailurePolicy`]:
//!
//! - [`Poison`](FailurePolicy::Poison) (the default): the first error
//!   is kept and returned verbatim on every later touch. The outcome
//!   of a proxy is decided once, success or failure.
//! - [`Retry`](FailurePolicy::Retry): the proxy stays uninitialized
//!   after a failure and the next touch runs the initializer again.
//!   Useful when construction depends on something transiently absent.

use std::marker::PhantomData;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::trace;

use crate::definition::ServiceInstance;
use crate::error::ResolveError;
use crate::id::ServiceId;

/// How a proxy treats a failed first initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
  /// Keep the first error and return it on every later touch.
  #[default]
  Poison,
  /// Leave the proxy uninitialized; later touches try again.
  Retry,
}

type Initializer = Box<dyn Fn() -> Result<ServiceInstance, ResolveError> + Send + Sync>;

struct ProxyShared {
  id: ServiceId,
  policy: FailurePolicy,
  cell: OnceCell<ServiceInstance>,
  initializer: Initializer,
  last_error: Mutex<Option<ResolveError>>,
}

/// An untyped lazy stand-in for one service.
///
/// Handles are cheap to clone; all clones share the same underlying
/// cell, so initialization happens at most once across all of them.
#[derive(Clone)]
pub struct ProxyHandle {
  shared: Arc<ProxyShared>,
}

impl ProxyHandle {
  /// The id of the service this proxy stands in for.
  pub fn id(&self) -> &ServiceId {
    &self.shared.id
  }

  /// Whether the target has been built.
  pub fn is_initialized(&self) -> bool {
    self.shared.cell.get().is_some()
  }

  /// The error kept from a failed initialization, if any.
  pub fn last_error(&self) -> Option<ResolveError> {
    self.shared.last_error.lock().clone()
  }

  /// Returns the target instance, building it on the first call.
  ///
  /// Concurrent first touches are serialized; exactly one runs the
  /// initializer and the rest observe its outcome per the policy.
  pub fn touch(&self) -> Result<ServiceInstance, ResolveError> {
    if let Some(instance) = self.shared.cell.get() {
      return Ok(instance.clone());
    }
    self
      .shared
      .cell
      .get_or_try_init(|| {
        if self.shared.policy == FailurePolicy::Poison {
          // Serialized by the cell, so this check cannot race the store.
          if let Some(err) = self.shared.last_error.lock().clone() {
            return Err(err);
          }
        }
        trace!(service = %self.shared.id, "initializing lazy proxy");
        match (self.shared.initializer)() {
          Ok(instance) => Ok(instance),
          Err(err) => {
            *self.shared.last_error.lock() = Some(err.clone());
            Err(err)
          }
        }
      })
      .map(|instance| instance.clone())
  }
}

impl std::fmt::Debug for ProxyHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProxyHandle")
      .field("id", &self.shared.id)
      .field("policy", &self.shared.policy)
      .field("initialized", &self.is_initialized())
      .finish()
  }
}

/// A typed wrapper over a [`ProxyHandle`].
pub struct Lazy<T> {
  handle: ProxyHandle,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Lazy<T> {
  fn clone(&self) -> Self {
    Lazy {
      handle: self.handle.clone(),
      _marker: PhantomData,
    }
  }
}

impl<T: Send + Sync + 'static> Lazy<T> {
  /// Types an untyped handle. The type is only asserted on first
  /// [`get`](Self::get), not here.
  pub fn from_handle(handle: ProxyHandle) -> Self {
    Lazy {
      handle,
      _marker: PhantomData,
    }
  }

  /// Builds the target if needed and returns it typed.
  pub fn get(&self) -> Result<Arc<T>, ResolveError> {
    let instance = self.handle.touch()?;
    instance
      .downcast::<T>()
      .map_err(|_| ResolveError::TypeMismatch {
        id: self.handle.id().clone(),
        expected: std::any::type_name::<T>(),
      })
  }

  pub fn id(&self) -> &ServiceId {
    self.handle.id()
  }

  pub fn is_initialized(&self) -> bool {
    self.handle.is_initialized()
  }

  /// The untyped handle, for callers that do not need the type.
  pub fn handle(&self) -> &ProxyHandle {
    &self.handle
  }
}

impl<T> std::fmt::Debug for Lazy<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Lazy")
      .field("id", self.handle.id())
      .field("initialized", &self.handle.is_initialized())
      .finish()
  }
}

/// Creates proxies bound to one failure policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyFactory {
  policy: FailurePolicy,
}

impl ProxyFactory {
  pub fn new(policy: FailurePolicy) -> Self {
    ProxyFactory { policy }
  }

  pub fn policy(&self) -> FailurePolicy {
    self.policy
  }

  /// Wraps `initializer` in a fresh, uninitialized proxy for `id`.
  pub fn create_proxy(
    &self,
    id: ServiceId,
    initializer: impl Fn() -> Result<ServiceInstance, ResolveError> + Send + Sync + 'static,
  ) -> ProxyHandle {
    ProxyHandle {
      shared: Arc::new(ProxyShared {
        id,
        policy: self.policy,
        cell: OnceCell::new(),
        initializer: Box::new(initializer),
        last_error: Mutex::new(None),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct Expensive {
    n: usize,
  }

  fn instance(n: usize) -> ServiceInstance {
    Arc::new(Expensive { n })
  }

  #[test]
  fn touch_initializes_exactly_once() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let proxy = ProxyFactory::new(FailurePolicy::Poison).create_proxy(
      ServiceId::new("exp"),
      move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(instance(7))
      },
    );
    assert!(!proxy.is_initialized());

    let first = proxy.touch().unwrap();
    let second = proxy.clone().touch().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(proxy.is_initialized());
  }

  #[test]
  fn poison_keeps_the_first_error() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let proxy = ProxyFactory::new(FailurePolicy::Poison).create_proxy(
      ServiceId::new("bad"),
      move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ResolveError::NotFound {
          id: ServiceId::new("bad"),
        })
      },
    );
    assert!(proxy.touch().is_err());
    assert!(proxy.touch().is_err());
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(matches!(
      proxy.last_error(),
      Some(ResolveError::NotFound { .. })
    ));
  }

  #[test]
  fn retry_runs_the_initializer_again() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let proxy = ProxyFactory::new(FailurePolicy::Retry).create_proxy(
      ServiceId::new("flaky"),
      move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        if attempt == 0 {
          Err(ResolveError::NotFound {
            id: ServiceId::new("flaky"),
          })
        } else {
          Ok(instance(attempt))
        }
      },
    );
    assert!(proxy.touch().is_err());
    let recovered = proxy.touch().unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    let typed = recovered.downcast::<Expensive>().unwrap();
    assert_eq!(typed.n, 1);
  }

  #[test]
  fn concurrent_first_touches_share_one_instance() {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let proxy = ProxyFactory::default().create_proxy(ServiceId::new("shared"), move || {
      counter.fetch_add(1, Ordering::SeqCst);
      std::thread::sleep(std::time::Duration::from_millis(10));
      Ok(instance(1))
    });

    std::thread::scope(|scope| {
      let mut handles = Vec::new();
      for _ in 0..8 {
        let proxy = proxy.clone();
        handles.push(scope.spawn(move || proxy.touch().unwrap()));
      }
      let instances: Vec<ServiceInstance> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();
      for pair in instances.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
      }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn typed_lazy_downcasts_or_reports_the_type() {
    let proxy = ProxyFactory::default()
      .create_proxy(ServiceId::new("exp"), move || Ok(instance(3)));
    let lazy: Lazy<Expensive> = Lazy::from_handle(proxy.clone());
    assert_eq!(lazy.get().unwrap().n, 3);

    let wrong: Lazy<String> = Lazy::from_handle(proxy);
    assert!(matches!(
      wrong.get(),
      Err(ResolveError::TypeMismatch { .. })
    ));
  }
}
