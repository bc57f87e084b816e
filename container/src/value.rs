//! Plain configuration values carried by definitions.
//!
//! A [`Value`] is the leaf payload of an argument: the data a factory
//! receives when it does not depend on another service. Values survive
//! pipeline transforms untouched except for parameter interpolation, which
//! may rewrite or replace string variants.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A self-contained scalar or sequence value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
  /// A UTF-8 string.
  Str(String),
  /// A signed integer.
  Int(i64),
  /// A double-precision float.
  Float(f64),
  /// A boolean.
  Bool(bool),
  /// An ordered sequence of values.
  Seq(Vec<Value>),
  /// The absence of a value.
  Null,
}

impl Value {
  /// A short label for the variant, used in diagnostics.
  pub fn kind(&self) -> &'static str {
    match self {
      Value::Str(_) => "str",
      Value::Int(_) => "int",
      Value::Float(_) => "float",
      Value::Bool(_) => "bool",
      Value::Seq(_) => "seq",
      Value::Null => "null",
    }
  }

  /// Returns the string content if this is a `Str`.
  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Returns the integer content if this is an `Int`.
  pub fn as_int(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      _ => None,
    }
  }

  /// Returns the float content if this is a `Float`.
  pub fn as_float(&self) -> Option<f64> {
    match self {
      Value::Float(f) => Some(*f),
      _ => None,
    }
  }

  /// Returns the boolean content if this is a `Bool`.
  pub fn as_bool(&self) -> Option<bool> {
    match self {
      Value::Bool(b) => Some(*b),
      _ => None,
    }
  }

  /// Returns the element slice if this is a `Seq`.
  pub fn as_seq(&self) -> Option<&[Value]> {
    match self {
      Value::Seq(items) => Some(items),
      _ => None,
    }
  }

  /// Whether this is the `Null` variant.
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  /// Renders a scalar variant into `out` for string interpolation.
  ///
  /// Sequences and `Null` have no stable textual form and return `None`,
  /// leaving the caller to reject the substitution.
  pub(crate) fn render_scalar(&self, out: &mut String) -> Option<()> {
    use std::fmt::Write as _;
    match self {
      Value::Str(s) => out.push_str(s),
      Value::Int(i) => {
        let _ = write!(out, "{}", i);
      }
      Value::Float(f) => {
        let _ = write!(out, "{}", f);
      }
      Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
      Value::Seq(_) | Value::Null => return None,
    }
    Some(())
  }
}

impl From<&str> for Value {
  fn from(v: &str) -> Self {
    Value::Str(v.to_owned())
  }
}

impl From<String> for Value {
  fn from(v: String) -> Self {
    Value::Str(v)
  }
}

impl From<i64> for Value {
  fn from(v: i64) -> Self {
    Value::Int(v)
  }
}

impl From<i32> for Value {
  fn from(v: i32) -> Self {
    Value::Int(v as i64)
  }
}

impl From<u32> for Value {
  fn from(v: u32) -> Self {
    Value::Int(v as i64)
  }
}

impl From<f64> for Value {
  fn from(v: f64) -> Self {
    Value::Float(v)
  }
}

impl From<bool> for Value {
  fn from(v: bool) -> Self {
    Value::Bool(v)
  }
}

impl<V: Into<Value>> From<Vec<V>> for Value {
  fn from(v: Vec<V>) -> Self {
    Value::Seq(v.into_iter().map(Into::into).collect())
  }
}
