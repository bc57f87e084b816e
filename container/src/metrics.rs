//! Lightweight resolution counters.
//!
//! Counters are padded to their own cache lines so concurrent
//! resolutions on different cores do not contend on the same line.
//! Reads are relaxed; a snapshot is a statistical view, not a fence.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Internal counter block shared by a container and its proxies.
pub struct Metrics {
  resolutions: CachePadded<AtomicU64>,
  singleton_hits: CachePadded<AtomicU64>,
  instances_built: CachePadded<AtomicU64>,
  proxies_created: CachePadded<AtomicU64>,
  proxies_initialized: CachePadded<AtomicU64>,
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Metrics {
      resolutions: CachePadded::new(AtomicU64::new(0)),
      singleton_hits: CachePadded::new(AtomicU64::new(0)),
      instances_built: CachePadded::new(AtomicU64::new(0)),
      proxies_created: CachePadded::new(AtomicU64::new(0)),
      proxies_initialized: CachePadded::new(AtomicU64::new(0)),
    }
  }

  pub(crate) fn record_resolution(&self) {
    self.resolutions.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_singleton_hit(&self) {
    self.singleton_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_instance_built(&self) {
    self.instances_built.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_proxy_created(&self) {
    self.proxies_created.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_proxy_initialized(&self) {
    self.proxies_initialized.fetch_add(1, Ordering::Relaxed);
  }

  /// A consistent-enough copy of all counters.
  pub fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      resolutions: self.resolutions.load(Ordering::Relaxed),
      singleton_hits: self.singleton_hits.load(Ordering::Relaxed),
      instances_built: self.instances_built.load(Ordering::Relaxed),
      proxies_created: self.proxies_created.load(Ordering::Relaxed),
      proxies_initialized: self.proxies_initialized.load(Ordering::Relaxed),
    }
  }
}

impl std::fmt::Debug for Metrics {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let snapshot = self.snapshot();
    f.debug_struct("Metrics")
      .field("resolutions", &snapshot.resolutions)
      .field("singleton_hits", &snapshot.singleton_hits)
      .field("instances_built", &snapshot.instances_built)
      .field("proxies_created", &snapshot.proxies_created)
      .field("proxies_initialized", &snapshot.proxies_initialized)
      .finish()
  }
}

/// A point-in-time copy of a container's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
  /// Service resolutions, dependency edges included.
  pub resolutions: u64,
  /// Singleton resolutions served from the instance cache.
  pub singleton_hits: u64,
  /// Instances actually constructed, transient ones included.
  pub instances_built: u64,
  /// Lazy proxies handed out.
  pub proxies_created: u64,
  /// Lazy proxies whose target was built on first touch.
  pub proxies_initialized: u64,
}

impl MetricsSnapshot {
  /// Fraction of resolutions served without building anything.
  pub fn hit_ratio(&self) -> f64 {
    if self.resolutions == 0 {
      0.0
    } else {
      self.singleton_hits as f64 / self.resolutions as f64
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn counters_accumulate_into_snapshots() {
    let metrics = Metrics::new();
    metrics.record_resolution();
    metrics.record_resolution();
    metrics.record_singleton_hit();
    metrics.record_instance_built();
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.resolutions, 2);
    assert_eq!(snapshot.singleton_hits, 1);
    assert_eq!(snapshot.instances_built, 1);
    assert_eq!(snapshot.hit_ratio(), 0.5);
  }
}
