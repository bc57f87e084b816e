//! Error types for graph construction, pipeline transforms, and resolution.
//!
//! Build-time failures (`DefinitionError`, `GraphError`, `PipelineError`)
//! surface while a graph is being validated and transformed. Runtime
//! failures (`ResolveError`) surface when a container resolves services.
//! `ResolveError` is cloneable so lazy proxies can preserve a first
//! failure and hand it back on later touches.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error as ThisError;

use crate::id::ServiceId;

/// A boxed error produced by user code (factories, method appliers,
/// parameter processors).
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

pub(crate) fn fmt_cycle(path: &[ServiceId]) -> String {
  let mut out = String::new();
  for (i, id) in path.iter().enumerate() {
    if i > 0 {
      out.push_str(" -> ");
    }
    out.push_str(id.as_str());
  }
  out
}

// --- Definition-level validation ---

/// A structural problem inside a single definition.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum DefinitionError {
  /// A named argument was supplied but the definition declares no
  /// parameter names to match it against.
  #[error("definition '{id}' declares no parameter names but was given named argument '{name}'")]
  UndeclaredNamedArgument { id: ServiceId, name: String },

  /// A named argument does not match any declared parameter name.
  #[error("definition '{id}' has no parameter named '{name}'")]
  UnknownNamedArgument { id: ServiceId, name: String },

  /// The same parameter received a named argument more than once.
  #[error("definition '{id}' was given named argument '{name}' more than once")]
  DuplicateNamedArgument { id: ServiceId, name: String },

  /// More arguments than declared parameters.
  #[error("definition '{id}' declares {declared} parameters but was given {given} arguments")]
  TooManyArguments {
    id: ServiceId,
    declared: usize,
    given: usize,
  },

  /// A parameter in the middle of the list was left without an argument.
  #[error("definition '{id}' has no argument for parameter '{name}'")]
  MissingArgument { id: ServiceId, name: String },

  /// A value definition carried construction machinery it cannot use.
  #[error("value definition '{id}' cannot have arguments, method calls, or the lazy flag")]
  InvalidValueDefinition { id: ServiceId },
}

// --- Graph-level analysis ---

/// A failure found while validating or transforming a definition graph.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum GraphError {
  #[error(transparent)]
  InvalidDefinition(#[from] DefinitionError),

  /// A strict reference points at an id that is neither a definition
  /// nor an alias.
  #[error("unresolvable reference to '{target}' from '{referenced_from}'")]
  UnresolvableReference {
    target: ServiceId,
    referenced_from: ServiceId,
  },

  /// The eager dependency edges form a loop.
  #[error("circular reference detected: {}", fmt_cycle(.path))]
  CircularReference { path: Vec<ServiceId> },

  /// An alias chain did not reach a definition within the depth cap.
  #[error("alias chain starting at '{alias}' exceeds {limit} links")]
  AliasChainTooDeep { alias: ServiceId, limit: usize },

  /// A placeholder names a scheme no registered processor provides.
  #[error("no parameter processor claims scheme '{scheme}' (placeholder '%{scheme}:{key}%' in '{id}')")]
  UnknownParameterProcessor {
    id: ServiceId,
    scheme: String,
    key: String,
  },

  /// A processor claimed the scheme but failed to produce a value.
  #[error("parameter processor for scheme '{scheme}' failed on key '{key}' in '{id}': {source}")]
  ParameterProcessing {
    id: ServiceId,
    scheme: String,
    key: String,
    #[source]
    source: ProcessorError,
  },

  /// A placeholder substitution produced a value that cannot be embedded
  /// in the middle of a string.
  #[error("placeholder '%{scheme}:{key}%' in '{id}' produced a {kind} value, which cannot be embedded in a string")]
  NonScalarInterpolation {
    id: ServiceId,
    scheme: String,
    key: String,
    kind: &'static str,
  },
}

/// A pipeline failure, tagged with the pass that raised it.
#[derive(Debug, Clone, PartialEq, ThisError)]
#[error("pipeline pass '{pass}' failed: {source}")]
pub struct PipelineError {
  pub pass: &'static str,
  #[source]
  pub source: GraphError,
}

/// An error reported by a [`ParameterProcessor`](crate::processor::ParameterProcessor).
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct ProcessorError {
  message: String,
}

impl ProcessorError {
  pub fn new(message: impl Into<String>) -> Self {
    ProcessorError {
      message: message.into(),
    }
  }
}

// --- Runtime resolution ---

/// A failure while resolving a service from a container.
///
/// Cloneable by design: a poisoned lazy proxy stores the first failure
/// and returns it verbatim on every later touch.
#[derive(Debug, Clone)]
pub enum ResolveError {
  /// No public definition or alias with this id.
  NotFound { id: ServiceId },
  /// The id exists but is private and was requested from outside.
  NotPublic { id: ServiceId },
  /// Resolution re-entered a service that is still being built.
  CircularReference { path: Vec<ServiceId> },
  /// A factory or method applier returned an error.
  Binding {
    id: ServiceId,
    source: Arc<dyn Error + Send + Sync + 'static>,
  },
  /// The instance exists but is not of the requested type.
  TypeMismatch {
    id: ServiceId,
    expected: &'static str,
  },
}

impl ResolveError {
  pub(crate) fn binding(id: ServiceId, source: BoxError) -> Self {
    ResolveError::Binding {
      id,
      source: Arc::from(source),
    }
  }

  /// The id the failure is attached to, when there is one.
  pub fn service_id(&self) -> Option<&ServiceId> {
    match self {
      ResolveError::NotFound { id }
      | ResolveError::NotPublic { id }
      | ResolveError::Binding { id, .. }
      | ResolveError::TypeMismatch { id, .. } => Some(id),
      ResolveError::CircularReference { .. } => None,
    }
  }
}

impl fmt::Display for ResolveError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ResolveError::NotFound { id } => {
        write!(f, "service '{}' not found", id)
      }
      ResolveError::NotPublic { id } => {
        write!(f, "service '{}' is private and cannot be fetched directly", id)
      }
      ResolveError::CircularReference { path } => {
        write!(f, "circular reference during resolution: {}", fmt_cycle(path))
      }
      ResolveError::Binding { id, source } => {
        write!(f, "service '{}' failed to build: {}", id, source)
      }
      ResolveError::TypeMismatch { id, expected } => {
        write!(f, "service '{}' is not of the requested type {}", id, expected)
      }
    }
  }
}

impl Error for ResolveError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      ResolveError::Binding { source, .. } => Some(source.as_ref() as &(dyn Error + 'static)),
      _ => None,
    }
  }
}

// --- Argument access ---

/// A failure while a factory reads its resolved arguments.
///
/// Converts into [`BoxError`] through the blanket `From` impl, so `?`
/// works directly inside factory closures.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ArgAccessError {
  #[error("argument index {index} is out of range ({len} arguments)")]
  OutOfRange { index: usize, len: usize },

  #[error("argument {index} is a {found} argument, expected {expected}")]
  Kind {
    index: usize,
    expected: &'static str,
    found: &'static str,
  },

  #[error("argument {index} could not be downcast to {expected}")]
  Downcast {
    index: usize,
    expected: &'static str,
  },

  #[error("argument {index} is absent (its optional reference had no target)")]
  Absent { index: usize },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn cycle_paths_render_with_arrows() {
    let path = vec![
      ServiceId::new("a"),
      ServiceId::new("b"),
      ServiceId::new("a"),
    ];
    let err = GraphError::CircularReference { path };
    assert_eq!(
      err.to_string(),
      "circular reference detected: a -> b -> a"
    );
  }

  #[test]
  fn pipeline_errors_name_the_pass() {
    let err = PipelineError {
      pass: "resolve-aliases",
      source: GraphError::AliasChainTooDeep {
        alias: ServiceId::new("log"),
        limit: 32,
      },
    };
    let text = err.to_string();
    assert!(text.contains("resolve-aliases"));
    assert!(text.contains("'log'"));
  }

  #[test]
  fn binding_errors_expose_their_source() {
    let inner: BoxError = "backend offline".into();
    let err = ResolveError::binding(ServiceId::new("db"), inner);
    assert!(err.to_string().contains("backend offline"));
    assert!(Error::source(&err).is_some());
  }
}
