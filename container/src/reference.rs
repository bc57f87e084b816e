//! References between services and the argument model built on them.

use crate::id::ServiceId;
use crate::value::Value;

/// What happens when a referenced service does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceMode {
  /// A missing target is a graph error.
  Strict,
  /// A missing target injects nothing instead of failing.
  IgnoreOnMissing,
}

/// A pointer from one definition to another service.
///
/// References are declarative: they name a target and describe how the
/// dependency should be delivered (eagerly, lazily, or only if present).
/// Resolution happens later, in the pipeline and at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  target: ServiceId,
  mode: ReferenceMode,
  lazy: bool,
}

impl Reference {
  /// Creates a strict, eager reference to `target`.
  pub fn to(target: impl Into<ServiceId>) -> Self {
    Reference {
      target: target.into(),
      mode: ReferenceMode::Strict,
      lazy: false,
    }
  }

  /// Marks the reference as optional: a missing target injects nothing.
  pub fn ignore_on_missing(mut self) -> Self {
    self.mode = ReferenceMode::IgnoreOnMissing;
    self
  }

  /// Requests delivery through a lazy proxy instead of an eager instance.
  ///
  /// Lazy edges do not participate in construction-order cycle checks,
  /// which is how intentional loops between services are broken.
  pub fn lazy(mut self) -> Self {
    self.lazy = true;
    self
  }

  pub fn target(&self) -> &ServiceId {
    &self.target
  }

  pub fn mode(&self) -> ReferenceMode {
    self.mode
  }

  pub fn is_lazy(&self) -> bool {
    self.lazy
  }

  pub(crate) fn retarget(&mut self, target: ServiceId) {
    self.target = target;
  }
}

/// One argument to a factory or method call.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
  /// A plain value, delivered as-is (after parameter interpolation).
  Value(Value),
  /// A dependency on another service.
  Reference(Reference),
  /// An ordered collection whose items are themselves arguments.
  Collection(Vec<Argument>),
}

impl Argument {
  /// A plain value argument.
  pub fn value(v: impl Into<Value>) -> Self {
    Argument::Value(v.into())
  }

  /// A strict, eager reference argument.
  pub fn reference(target: impl Into<ServiceId>) -> Self {
    Argument::Reference(Reference::to(target))
  }

  /// A reference delivered through a lazy proxy.
  pub fn lazy_reference(target: impl Into<ServiceId>) -> Self {
    Argument::Reference(Reference::to(target).lazy())
  }

  /// A reference that injects nothing when the target is missing.
  pub fn optional_reference(target: impl Into<ServiceId>) -> Self {
    Argument::Reference(Reference::to(target).ignore_on_missing())
  }

  /// A collection argument built from any iterable of arguments.
  pub fn collection(items: impl IntoIterator<Item = Argument>) -> Self {
    Argument::Collection(items.into_iter().collect())
  }
}

impl From<Value> for Argument {
  fn from(v: Value) -> Self {
    Argument::Value(v)
  }
}

impl From<Reference> for Argument {
  fn from(r: Reference) -> Self {
    Argument::Reference(r)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reference_builders_set_the_flags() {
    let r = Reference::to("db").ignore_on_missing().lazy();
    assert_eq!(*r.target(), "db");
    assert_eq!(r.mode(), ReferenceMode::IgnoreOnMissing);
    assert!(r.is_lazy());

    let plain = Reference::to("db");
    assert_eq!(plain.mode(), ReferenceMode::Strict);
    assert!(!plain.is_lazy());
  }

  #[test]
  fn argument_helpers_wrap_their_payloads() {
    match Argument::value(3i64) {
      Argument::Value(Value::Int(3)) => {}
      other => panic!("unexpected argument: {:?}", other),
    }
    match Argument::collection([Argument::reference("a"), Argument::value("b")]) {
      Argument::Collection(items) => assert_eq!(items.len(), 2),
      other => panic!("unexpected argument: {:?}", other),
    }
  }
}
