//! Per-thread re-entrancy tracking for service construction.

use std::cell::RefCell;

use crate::error::ResolveError;
use crate::id::ServiceId;

thread_local! {
  static RESOLVING: RefCell<Vec<ServiceId>> = RefCell::new(Vec::new());
}

/// An RAII marker for one service under construction on this thread.
///
/// Entering an id that is already on the thread's stack means a factory
/// re-entered the container for something currently being built, which
/// the static cycle check cannot see (it only covers declared edges).
/// The guard reports it as a [`ResolveError::CircularReference`] with
/// the in-progress path.
#[derive(Debug)]
pub struct ResolutionGuard {
  id: ServiceId,
}

impl ResolutionGuard {
  /// Pushes `id` onto the thread's in-progress stack.
  pub fn enter(id: &ServiceId) -> Result<ResolutionGuard, ResolveError> {
    RESOLVING.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(pos) = stack.iter().position(|entry| entry == id) {
        let mut path: Vec<ServiceId> = stack[pos..].to_vec();
        path.push(id.clone());
        return Err(ResolveError::CircularReference { path });
      }
      stack.push(id.clone());
      Ok(ResolutionGuard { id: id.clone() })
    })
  }

  /// Depth of the in-progress stack on this thread.
  pub fn depth() -> usize {
    RESOLVING.with(|stack| stack.borrow().len())
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING.with(|stack| {
      let mut stack = stack.borrow_mut();
      if let Some(pos) = stack.iter().rposition(|entry| entry == &self.id) {
        stack.remove(pos);
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn nested_guards_track_distinct_ids() {
    let a = ServiceId::new("a");
    let b = ServiceId::new("b");
    let _ga = ResolutionGuard::enter(&a).unwrap();
    let _gb = ResolutionGuard::enter(&b).unwrap();
    assert_eq!(ResolutionGuard::depth(), 2);
  }

  #[test]
  fn re_entering_an_id_reports_the_path() {
    let a = ServiceId::new("a");
    let b = ServiceId::new("b");
    let _ga = ResolutionGuard::enter(&a).unwrap();
    let _gb = ResolutionGuard::enter(&b).unwrap();
    let err = ResolutionGuard::enter(&a).unwrap_err();
    match err {
      ResolveError::CircularReference { path } => {
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], "a");
        assert_eq!(path[1], "b");
        assert_eq!(path[2], "a");
      }
      other => panic!("expected a cycle, got {:?}", other),
    }
  }

  #[test]
  fn dropping_a_guard_releases_its_id() {
    let a = ServiceId::new("a");
    {
      let _g = ResolutionGuard::enter(&a).unwrap();
      assert_eq!(ResolutionGuard::depth(), 1);
    }
    assert_eq!(ResolutionGuard::depth(), 0);
    assert!(ResolutionGuard::enter(&a).is_ok());
  }
}
