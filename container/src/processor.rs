//! Parameter processors: pluggable sources for `%scheme:key%` placeholders.
//!
//! The interpolation pass scans string values for placeholders and asks
//! the registry for the processor claiming each scheme. Substitution
//! happens once, at pipeline time, so containers never re-read the
//! underlying sources at resolution time.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::ProcessorError;
use crate::value::Value;

/// A source of values for one or more placeholder schemes.
pub trait ParameterProcessor: Send + Sync {
  /// The schemes this processor claims, e.g. `["env"]`.
  fn schemes(&self) -> &[&str];

  /// Produces the value for `key`. The scheme is passed back so one
  /// processor can serve several schemes.
  fn process(&self, scheme: &str, key: &str) -> Result<Value, ProcessorError>;
}

/// Maps placeholder schemes to their processors.
///
/// Registration order decides nothing except conflicts: a processor
/// registered later takes over any scheme an earlier one claimed.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
  by_scheme: IndexMap<String, Arc<dyn ParameterProcessor>>,
}

impl ProcessorRegistry {
  /// An empty registry. Placeholders of any scheme will be rejected.
  pub fn empty() -> Self {
    ProcessorRegistry::default()
  }

  /// A registry with the `env` processor preinstalled.
  pub fn with_defaults() -> Self {
    let mut registry = ProcessorRegistry::default();
    registry.register(EnvProcessor);
    registry
  }

  /// Adds a processor, claiming all of its schemes.
  pub fn register(&mut self, processor: impl ParameterProcessor + 'static) {
    self.register_arc(Arc::new(processor));
  }

  pub fn register_arc(&mut self, processor: Arc<dyn ParameterProcessor>) {
    for scheme in processor.schemes() {
      self.by_scheme.insert((*scheme).to_owned(), Arc::clone(&processor));
    }
  }

  pub fn lookup(&self, scheme: &str) -> Option<&Arc<dyn ParameterProcessor>> {
    self.by_scheme.get(scheme)
  }

  pub fn schemes(&self) -> impl Iterator<Item = &str> {
    self.by_scheme.keys().map(String::as_str)
  }
}

impl std::fmt::Debug for ProcessorRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProcessorRegistry")
      .field("schemes", &self.by_scheme.keys().collect::<Vec<_>>())
      .finish()
  }
}

/// Resolves `%env:NAME%` placeholders from process environment variables.
///
/// Values always come back as strings. A missing or non-UTF-8 variable
/// is a processing error.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvProcessor;

impl ParameterProcessor for EnvProcessor {
  fn schemes(&self) -> &[&str] {
    &["env"]
  }

  fn process(&self, _scheme: &str, key: &str) -> Result<Value, ProcessorError> {
    match std::env::var(key) {
      Ok(v) => Ok(Value::Str(v)),
      Err(e) => Err(ProcessorError::new(format!(
        "environment variable '{}' unavailable: {}",
        key, e
      ))),
    }
  }
}

/// Resolves `%const:name%` placeholders from a fixed table handed in at
/// construction time.
#[derive(Debug, Clone, Default)]
pub struct ConstProcessor {
  values: BTreeMap<String, Value>,
}

impl ConstProcessor {
  pub fn new(values: impl IntoIterator<Item = (String, Value)>) -> Self {
    ConstProcessor {
      values: values.into_iter().collect(),
    }
  }

  /// Adds or replaces one constant.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.values.insert(key.into(), value.into());
  }
}

impl ParameterProcessor for ConstProcessor {
  fn schemes(&self) -> &[&str] {
    &["const"]
  }

  fn process(&self, _scheme: &str, key: &str) -> Result<Value, ProcessorError> {
    self
      .values
      .get(key)
      .cloned()
      .ok_or_else(|| ProcessorError::new(format!("no constant named '{}'", key)))
  }
}
