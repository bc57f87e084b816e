//! Service identifiers.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// The identity of one definition, alias, or resolved service.
///
/// Ids are cheap to clone (shared string storage) and ordered, so they can
/// be used freely as map keys and in diagnostic paths.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(Arc<str>);

impl ServiceId {
  /// Creates a new id from any string-like value.
  pub fn new(id: impl AsRef<str>) -> Self {
    ServiceId(Arc::from(id.as_ref()))
  }

  /// Returns the id as a string slice.
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ServiceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl fmt::Debug for ServiceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:?}", &*self.0)
  }
}

impl From<&str> for ServiceId {
  fn from(id: &str) -> Self {
    ServiceId::new(id)
  }
}

impl From<String> for ServiceId {
  fn from(id: String) -> Self {
    ServiceId(Arc::from(id.as_str()))
  }
}

impl From<&ServiceId> for ServiceId {
  fn from(id: &ServiceId) -> Self {
    id.clone()
  }
}

impl Borrow<str> for ServiceId {
  fn borrow(&self) -> &str {
    &self.0
  }
}

impl AsRef<str> for ServiceId {
  fn as_ref(&self) -> &str {
    &self.0
  }
}

impl PartialEq<str> for ServiceId {
  fn eq(&self, other: &str) -> bool {
    self.as_str() == other
  }
}

impl PartialEq<&str> for ServiceId {
  fn eq(&self, other: &&str) -> bool {
    self.as_str() == *other
  }
}
