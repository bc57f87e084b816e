//! Placeholder interpolation over string values.

use tracing::trace;

use crate::error::GraphError;
use crate::id::ServiceId;
use crate::pipeline::{Pass, PassContext};
use crate::processor::ProcessorRegistry;
use crate::value::Value;

/// Substitutes `%scheme:key%` placeholders in every string value.
///
/// Substitution happens once, here, so runtime resolution never touches
/// the underlying sources again. The rules:
///
/// - A string that is exactly one placeholder is replaced by the
///   processed value wholesale, keeping its type. `%const:retries%`
///   can inject an integer.
/// - A placeholder embedded in a longer string is rendered into the
///   text; the processed value must be scalar for that.
/// - `%%` is the escape for a literal percent sign.
/// - Percent signs that do not form a `%scheme:key%` shape are left
///   alone, so `"50% full"` needs no escaping.
///
/// Scanning is left to right; the first well-formed placeholder wins.
/// Processed values are not rescanned.
pub struct InterpolateParameters;

impl Pass for InterpolateParameters {
  fn name(&self) -> &'static str {
    "interpolate-parameters"
  }

  fn run(&self, ctx: &mut PassContext<'_>) -> Result<(), GraphError> {
    let processors = ctx.processors;
    for (id, def) in ctx.graph.definitions_mut() {
      def.try_visit_values_mut(&mut |value: &mut Value| {
        interpolate_value(value, id, processors)
      })?;
    }
    Ok(())
  }
}

fn interpolate_value(
  value: &mut Value,
  owner: &ServiceId,
  processors: &ProcessorRegistry,
) -> Result<(), GraphError> {
  match value {
    Value::Str(s) => {
      if let Some(replacement) = interpolate_str(s, owner, processors)? {
        trace!(service = %owner, "interpolated placeholder value");
        *value = replacement;
      }
      Ok(())
    }
    Value::Seq(items) => {
      for item in items {
        interpolate_value(item, owner, processors)?;
      }
      Ok(())
    }
    _ => Ok(()),
  }
}

/// Splits a placeholder body into `(scheme, key)` if it is well formed.
fn split_placeholder(body: &str) -> Option<(&str, &str)> {
  let (scheme, key) = body.split_once(':')?;
  if scheme.is_empty() || key.is_empty() {
    return None;
  }
  let valid_scheme = scheme
    .chars()
    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
  if valid_scheme {
    Some((scheme, key))
  } else {
    None
  }
}

/// Matches a string that is exactly one placeholder, nothing around it.
fn parse_exact_placeholder(input: &str) -> Option<(&str, &str)> {
  let body = input.strip_prefix('%')?.strip_suffix('%')?;
  if body.contains('%') {
    return None;
  }
  split_placeholder(body)
}

fn run_processor(
  owner: &ServiceId,
  processors: &ProcessorRegistry,
  scheme: &str,
  key: &str,
) -> Result<Value, GraphError> {
  let processor =
    processors
      .lookup(scheme)
      .ok_or_else(|| GraphError::UnknownParameterProcessor {
        id: owner.clone(),
        scheme: scheme.to_owned(),
        key: key.to_owned(),
      })?;
  processor
    .process(scheme, key)
    .map_err(|source| GraphError::ParameterProcessing {
      id: owner.clone(),
      scheme: scheme.to_owned(),
      key: key.to_owned(),
      source,
    })
}

/// Interpolates one string. Returns `None` when nothing changed.
fn interpolate_str(
  input: &str,
  owner: &ServiceId,
  processors: &ProcessorRegistry,
) -> Result<Option<Value>, GraphError> {
  if !input.contains('%') {
    return Ok(None);
  }
  if let Some((scheme, key)) = parse_exact_placeholder(input) {
    return run_processor(owner, processors, scheme, key).map(Some);
  }

  let mut out = String::with_capacity(input.len());
  let mut rest = input;
  let mut changed = false;
  while let Some(start) = rest.find('%') {
    out.push_str(&rest[..start]);
    let after = &rest[start + 1..];
    if let Some(tail) = after.strip_prefix('%') {
      out.push('%');
      changed = true;
      rest = tail;
      continue;
    }
    match after.find('%') {
      None => {
        out.push('%');
        rest = after;
      }
      Some(end) => match split_placeholder(&after[..end]) {
        Some((scheme, key)) => {
          let value = run_processor(owner, processors, scheme, key)?;
          if value.render_scalar(&mut out).is_none() {
            return Err(GraphError::NonScalarInterpolation {
              id: owner.clone(),
              scheme: scheme.to_owned(),
              key: key.to_owned(),
              kind: value.kind(),
            });
          }
          changed = true;
          rest = &after[end + 1..];
        }
        None => {
          out.push('%');
          rest = after;
        }
      },
    }
  }
  out.push_str(rest);
  if changed {
    Ok(Some(Value::Str(out)))
  } else {
    Ok(None)
  }
}
