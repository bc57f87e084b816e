//! Deterministic identity for graphs and their resolved form.
//!
//! A [`Fingerprint`] is a blake3 hash over a canonical, length-prefixed
//! encoding of everything that shapes runtime behavior: ids, argument
//! structure, lifetimes, visibility, tags, and aliases, all in
//! declaration order. Factory and applier closures cannot be hashed,
//! so identity is structural; the crate version and schema version are
//! folded into the hash domain so artifacts never survive a tooling
//! upgrade they were not built for.
//!
//! Two fingerprints exist per build. The graph fingerprint is taken
//! before the pipeline runs and keys the artifact store, which is what
//! lets a cache lookup happen without running the pipeline at all. The
//! resolved fingerprint is taken after the pipeline and identifies the
//! exact plan a table was lowered from.

use serde::{Deserialize, Serialize};
use weave::{
  ArgPlan, Argument, DefinitionGraph, Lifetime, ReferenceMode, ResolvedGraph, Value,
};

use crate::SCHEMA_VERSION;

/// A hex-encoded blake3 hash of a graph's observable structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The first 16 hex characters, used for artifact directory names
  /// and log lines.
  pub fn short(&self) -> &str {
    &self.0[..16]
  }
}

impl std::fmt::Display for Fingerprint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

// --- Canonical encoding ---

/// Writes the canonical encoding into a blake3 hasher.
///
/// Every string is length-prefixed so that adjacent fields can never
/// alias each other, and every variant gets a leading tag for the same
/// reason.
struct Canon {
  hasher: blake3::Hasher,
}

impl Canon {
  fn new(label: &str) -> Self {
    let mut canon = Canon {
      hasher: blake3::Hasher::new(),
    };
    canon.str("weave-codegen");
    canon.str(label);
    canon.u64(u64::from(SCHEMA_VERSION));
    canon.str(env!("CARGO_PKG_VERSION"));
    canon
  }

  fn str(&mut self, s: &str) {
    self.hasher.update(&(s.len() as u64).to_le_bytes());
    self.hasher.update(s.as_bytes());
  }

  fn u64(&mut self, n: u64) {
    self.hasher.update(&n.to_le_bytes());
  }

  fn i64(&mut self, n: i64) {
    self.hasher.update(&n.to_le_bytes());
  }

  fn bool(&mut self, b: bool) {
    self.u64(u64::from(b));
  }

  fn value(&mut self, v: &Value) {
    match v {
      Value::Str(s) => {
        self.str("str");
        self.str(s);
      }
      Value::Int(n) => {
        self.str("int");
        self.i64(*n);
      }
      Value::Float(n) => {
        self.str("float");
        self.u64(n.to_bits());
      }
      Value::Bool(b) => {
        self.str("bool");
        self.bool(*b);
      }
      Value::Seq(items) => {
        self.str("seq");
        self.u64(items.len() as u64);
        for item in items {
          self.value(item);
        }
      }
      Value::Null => self.str("null"),
    }
  }

  fn argument(&mut self, arg: &Argument) {
    match arg {
      Argument::Value(v) => {
        self.str("value");
        self.value(v);
      }
      Argument::Reference(reference) => {
        self.str("ref");
        self.str(reference.target().as_str());
        self.bool(matches!(reference.mode(), ReferenceMode::IgnoreOnMissing));
        self.bool(reference.is_lazy());
      }
      Argument::Collection(items) => {
        self.str("coll");
        self.u64(items.len() as u64);
        for item in items {
          self.argument(item);
        }
      }
    }
  }

  fn plan(&mut self, plan: &ArgPlan) {
    match plan {
      ArgPlan::Value(v) => {
        self.str("value");
        self.value(v);
      }
      ArgPlan::Eager(id) => {
        self.str("eager");
        self.str(id.as_str());
      }
      ArgPlan::Lazy(id) => {
        self.str("lazy");
        self.str(id.as_str());
      }
      ArgPlan::Peek(id) => {
        self.str("peek");
        self.str(id.as_str());
      }
      ArgPlan::Absent => self.str("absent"),
      ArgPlan::Seq(items) => {
        self.str("seq");
        self.u64(items.len() as u64);
        for item in items {
          self.plan(item);
        }
      }
    }
  }

  fn finish(self) -> Fingerprint {
    Fingerprint(self.hasher.finalize().to_hex().to_string())
  }
}

/// Fingerprints a definition graph before any pipeline runs over it.
///
/// This is the cache key of the artifact store: two graphs with the
/// same fingerprint lower to the same table, so a stored artifact can
/// be reused without resolving anything.
pub fn graph_fingerprint(graph: &DefinitionGraph) -> Fingerprint {
  let mut canon = Canon::new("definition-graph");
  canon.u64(graph.len() as u64);
  for (id, def) in graph.definitions() {
    canon.str(id.as_str());
    canon.str(def.type_name());
    match def.value_payload() {
      Some(v) => {
        canon.str("value-def");
        canon.value(v);
      }
      None => canon.str("service-def"),
    }
    canon.bool(matches!(def.lifetime(), Lifetime::Singleton));
    canon.bool(def.is_public());
    canon.bool(def.is_lazy());
    canon.u64(def.declared_parameter_names().len() as u64);
    for name in def.declared_parameter_names() {
      canon.str(name);
    }
    canon.u64(def.arguments().len() as u64);
    for arg in def.arguments() {
      canon.argument(arg);
    }
    canon.u64(def.named_arguments().len() as u64);
    for (name, arg) in def.named_arguments() {
      canon.str(name);
      canon.argument(arg);
    }
    canon.u64(def.method_calls().len() as u64);
    for call in def.method_calls() {
      canon.str(call.name());
      canon.u64(call.arguments().len() as u64);
      for arg in call.arguments() {
        canon.argument(arg);
      }
    }
    canon.u64(def.tags().len() as u64);
    for tag in def.tags() {
      canon.str(tag.name());
      canon.u64(tag.attributes().len() as u64);
      for (key, value) in tag.attributes() {
        canon.str(key);
        canon.value(value);
      }
    }
  }
  canon.u64(graph.alias_count() as u64);
  for (alias, target) in graph.aliases() {
    canon.str(alias.as_str());
    canon.str(target.as_str());
  }
  canon.finish()
}

/// Fingerprints a resolved graph, identifying the exact lowered plan.
pub fn resolved_fingerprint(graph: &ResolvedGraph) -> Fingerprint {
  let mut canon = Canon::new("resolved-graph");
  canon.u64(graph.len() as u64);
  for (id, resolved) in graph.definitions() {
    let def = resolved.definition();
    canon.str(id.as_str());
    canon.str(def.type_name());
    match def.value_payload() {
      Some(v) => {
        canon.str("value-def");
        canon.value(v);
      }
      None => canon.str("service-def"),
    }
    canon.bool(matches!(def.lifetime(), Lifetime::Singleton));
    canon.bool(def.is_public());
    canon.bool(def.is_lazy());
    canon.u64(resolved.arg_plans().len() as u64);
    for plan in resolved.arg_plans() {
      canon.plan(plan);
    }
    canon.u64(resolved.call_plans().len() as u64);
    for call in resolved.call_plans() {
      canon.str(call.name());
      canon.u64(call.args().len() as u64);
      for plan in call.args() {
        canon.plan(plan);
      }
    }
    canon.u64(def.tags().len() as u64);
    for tag in def.tags() {
      canon.str(tag.name());
      canon.u64(tag.attributes().len() as u64);
      for (key, value) in tag.attributes() {
        canon.str(key);
        canon.value(value);
      }
    }
  }
  canon.u64(graph.aliases().count() as u64);
  for (alias, target) in graph.aliases() {
    canon.str(alias.as_str());
    canon.str(target.as_str());
  }
  canon.finish()
}
