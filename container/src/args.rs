//! The resolved argument list handed to factories and method appliers.
//!
//! By the time a factory runs, every declared argument has been lowered
//! to one of a small set of shapes: a plain value, an eagerly built
//! service, a lazy proxy, an absent optional, or a collection of these.
//! [`ResolvedArgs`] gives factories typed, index-based access with
//! errors that convert straight into the factory's error channel.

use std::any::type_name;

use crate::definition::ServiceInstance;
use crate::error::ArgAccessError;
use crate::proxy::{Lazy, ProxyHandle};
use crate::value::Value;

/// One lowered argument.
#[derive(Clone)]
pub enum ResolvedArg {
  /// A plain value.
  Value(Value),
  /// An eagerly constructed service instance.
  Service(ServiceInstance),
  /// A proxy that builds its target on first touch.
  Lazy(ProxyHandle),
  /// An optional reference whose target did not exist or was not built.
  Absent,
  /// An ordered collection of lowered arguments.
  Seq(Vec<ResolvedArg>),
}

impl ResolvedArg {
  fn label(&self) -> &'static str {
    match self {
      ResolvedArg::Value(Value::Str(_)) => "str value",
      ResolvedArg::Value(Value::Int(_)) => "int value",
      ResolvedArg::Value(Value::Float(_)) => "float value",
      ResolvedArg::Value(Value::Bool(_)) => "bool value",
      ResolvedArg::Value(Value::Seq(_)) => "seq value",
      ResolvedArg::Value(Value::Null) => "null value",
      ResolvedArg::Service(_) => "service",
      ResolvedArg::Lazy(_) => "lazy proxy",
      ResolvedArg::Absent => "absent",
      ResolvedArg::Seq(_) => "collection",
    }
  }

  /// The value payload, if this argument is a plain value.
  pub fn as_value(&self) -> Option<&Value> {
    match self {
      ResolvedArg::Value(v) => Some(v),
      _ => None,
    }
  }

  /// The instance downcast to `T`, if this argument is an eager service
  /// of that type.
  pub fn as_service<T: Send + Sync + 'static>(&self) -> Option<std::sync::Arc<T>> {
    match self {
      ResolvedArg::Service(instance) => instance.clone().downcast::<T>().ok(),
      _ => None,
    }
  }

  /// A typed lazy handle, if this argument is a lazy proxy.
  pub fn as_lazy<T: Send + Sync + 'static>(&self) -> Option<Lazy<T>> {
    match self {
      ResolvedArg::Lazy(handle) => Some(Lazy::from_handle(handle.clone())),
      _ => None,
    }
  }
}

/// The full argument list for one factory or method call.
#[derive(Clone)]
pub struct ResolvedArgs {
  args: Vec<ResolvedArg>,
}

impl ResolvedArgs {
  /// Assembles an argument list from already lowered arguments.
  ///
  /// Runtimes that execute a lowered plan themselves build their
  /// argument lists through this.
  pub fn new(args: Vec<ResolvedArg>) -> Self {
    ResolvedArgs { args }
  }

  /// An empty argument list.
  pub fn empty() -> Self {
    ResolvedArgs { args: Vec::new() }
  }

  pub fn len(&self) -> usize {
    self.args.len()
  }

  pub fn is_empty(&self) -> bool {
    self.args.is_empty()
  }

  /// Raw access to one argument.
  pub fn get(&self, index: usize) -> Option<&ResolvedArg> {
    self.args.get(index)
  }

  fn arg(&self, index: usize) -> Result<&ResolvedArg, ArgAccessError> {
    self.args.get(index).ok_or(ArgAccessError::OutOfRange {
      index,
      len: self.args.len(),
    })
  }

  /// The eagerly built service at `index`, downcast to `T`.
  pub fn service<T: Send + Sync + 'static>(
    &self,
    index: usize,
  ) -> Result<std::sync::Arc<T>, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Service(instance) => {
        instance
          .clone()
          .downcast::<T>()
          .map_err(|_| ArgAccessError::Downcast {
            index,
            expected: type_name::<T>(),
          })
      }
      ResolvedArg::Absent => Err(ArgAccessError::Absent { index }),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "service",
        found: other.label(),
      }),
    }
  }

  /// Like [`service`](Self::service), but an absent optional reference
  /// yields `None` instead of an error.
  pub fn optional_service<T: Send + Sync + 'static>(
    &self,
    index: usize,
  ) -> Result<Option<std::sync::Arc<T>>, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Absent => Ok(None),
      _ => self.service(index).map(Some),
    }
  }

  /// The untyped instance at `index`.
  pub fn service_untyped(&self, index: usize) -> Result<ServiceInstance, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Service(instance) => Ok(instance.clone()),
      ResolvedArg::Absent => Err(ArgAccessError::Absent { index }),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "service",
        found: other.label(),
      }),
    }
  }

  /// The lazy proxy at `index`, typed as `T`.
  pub fn lazy<T: Send + Sync + 'static>(&self, index: usize) -> Result<Lazy<T>, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Lazy(handle) => Ok(Lazy::from_handle(handle.clone())),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "lazy proxy",
        found: other.label(),
      }),
    }
  }

  /// The plain value at `index`.
  pub fn value(&self, index: usize) -> Result<&Value, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Value(v) => Ok(v),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "value",
        found: other.label(),
      }),
    }
  }

  /// The string value at `index`.
  pub fn str(&self, index: usize) -> Result<&str, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Value(Value::Str(s)) => Ok(s),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "str value",
        found: other.label(),
      }),
    }
  }

  /// The integer value at `index`.
  pub fn int(&self, index: usize) -> Result<i64, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Value(Value::Int(i)) => Ok(*i),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "int value",
        found: other.label(),
      }),
    }
  }

  /// The boolean value at `index`.
  pub fn bool(&self, index: usize) -> Result<bool, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Value(Value::Bool(b)) => Ok(*b),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "bool value",
        found: other.label(),
      }),
    }
  }

  /// The float value at `index`.
  pub fn float(&self, index: usize) -> Result<f64, ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Value(Value::Float(f)) => Ok(*f),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "float value",
        found: other.label(),
      }),
    }
  }

  /// The collection at `index`, as a slice of lowered arguments.
  pub fn seq(&self, index: usize) -> Result<&[ResolvedArg], ArgAccessError> {
    match self.arg(index)? {
      ResolvedArg::Seq(items) => Ok(items),
      other => Err(ArgAccessError::Kind {
        index,
        expected: "collection",
        found: other.label(),
      }),
    }
  }
}
