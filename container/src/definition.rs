//! Service definitions: the declarative recipe for one service.
//!
//! A [`Definition`] names a service, binds a factory closure for it, and
//! records everything the pipeline needs to wire it: arguments, method
//! calls, tags, lifetime, visibility, and the lazy flag. Definitions are
//! inert data until a pipeline turns a graph of them into a resolved
//! graph a container can execute.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::args::ResolvedArgs;
use crate::error::{BoxError, DefinitionError};
use crate::id::ServiceId;
use crate::reference::{Argument, Reference};
use crate::value::Value;

/// A freshly constructed service, before it is shared.
pub type BoxedService = Box<dyn Any + Send + Sync>;

/// A built service as the container stores and hands it out.
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// The closure that constructs a service from its resolved arguments.
pub type ServiceFactory =
  Arc<dyn Fn(&ResolvedArgs) -> Result<BoxedService, BoxError> + Send + Sync>;

/// The closure that applies one configured method call to a freshly
/// built service, before the instance is shared.
pub type MethodApplier =
  Arc<dyn Fn(&mut dyn Any, &ResolvedArgs) -> Result<(), BoxError> + Send + Sync>;

/// How instances of a service are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifetime {
  /// One shared instance per container, built on first request.
  #[default]
  Singleton,
  /// A fresh instance on every resolution.
  Transient,
}

/// Whether a service may be fetched directly from the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
  /// Only reachable as a dependency of other services.
  #[default]
  Private,
  /// Fetchable by id from outside.
  Public,
}

/// Attributes attached to a tag, keyed by name.
///
/// A `BTreeMap` keeps attribute order stable for compilation.
pub type TagAttributes = BTreeMap<String, Value>;

/// A label attached to a definition, with optional attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
  name: String,
  attributes: TagAttributes,
}

impl Tag {
  pub fn new(name: impl Into<String>) -> Self {
    Tag {
      name: name.into(),
      attributes: TagAttributes::new(),
    }
  }

  pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.attributes.insert(key.into(), value.into());
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn attributes(&self) -> &TagAttributes {
    &self.attributes
  }
}

/// A configured post-construction method call.
#[derive(Clone)]
pub struct MethodCall {
  name: String,
  arguments: Vec<Argument>,
  applier: MethodApplier,
}

impl MethodCall {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn arguments(&self) -> &[Argument] {
    &self.arguments
  }

  pub(crate) fn arguments_mut(&mut self) -> &mut Vec<Argument> {
    &mut self.arguments
  }

  pub fn applier(&self) -> MethodApplier {
    Arc::clone(&self.applier)
  }
}

impl fmt::Debug for MethodCall {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MethodCall")
      .field("name", &self.name)
      .field("arguments", &self.arguments)
      .finish_non_exhaustive()
  }
}

#[derive(Clone)]
pub(crate) enum DefinitionKind {
  Service { factory: ServiceFactory },
  Value(Value),
}

/// The declarative recipe for one service.
#[derive(Clone)]
pub struct Definition {
  id: ServiceId,
  kind: DefinitionKind,
  type_name: &'static str,
  arguments: Vec<Argument>,
  named_arguments: Vec<(String, Argument)>,
  parameter_names: Vec<&'static str>,
  method_calls: Vec<MethodCall>,
  tags: Vec<Tag>,
  lifetime: Lifetime,
  visibility: Visibility,
  lazy: bool,
}

impl Definition {
  /// A service definition backed by a factory closure.
  ///
  /// The factory receives the resolved arguments in declaration order
  /// and returns the constructed service. Defaults: singleton lifetime,
  /// private visibility, eager construction.
  pub fn service<T, F>(id: impl Into<ServiceId>, factory: F) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn(&ResolvedArgs) -> Result<T, BoxError> + Send + Sync + 'static,
  {
    let factory: ServiceFactory =
      Arc::new(move |args| factory(args).map(|service| Box::new(service) as BoxedService));
    Definition {
      id: id.into(),
      kind: DefinitionKind::Service { factory },
      type_name: type_name::<T>(),
      arguments: Vec::new(),
      named_arguments: Vec::new(),
      parameter_names: Vec::new(),
      method_calls: Vec::new(),
      tags: Vec::new(),
      lifetime: Lifetime::Singleton,
      visibility: Visibility::Private,
      lazy: false,
    }
  }

  /// A value definition: resolving it yields the value itself.
  ///
  /// Value definitions take part in interpolation and tagging but carry
  /// no construction machinery.
  pub fn value(id: impl Into<ServiceId>, value: impl Into<Value>) -> Self {
    Definition {
      id: id.into(),
      kind: DefinitionKind::Value(value.into()),
      type_name: type_name::<Value>(),
      arguments: Vec::new(),
      named_arguments: Vec::new(),
      parameter_names: Vec::new(),
      method_calls: Vec::new(),
      tags: Vec::new(),
      lifetime: Lifetime::Singleton,
      visibility: Visibility::Private,
      lazy: false,
    }
  }

  // --- Builder methods ---

  /// Appends one positional constructor argument.
  pub fn argument(mut self, argument: impl Into<Argument>) -> Self {
    self.arguments.push(argument.into());
    self
  }

  /// Declares the factory's parameter names, enabling named arguments.
  pub fn parameter_names(mut self, names: impl IntoIterator<Item = &'static str>) -> Self {
    self.parameter_names = names.into_iter().collect();
    self
  }

  /// Binds an argument to a declared parameter name. Named arguments
  /// override positional ones at the same slot.
  pub fn named_argument(mut self, name: impl Into<String>, argument: impl Into<Argument>) -> Self {
    self.named_arguments.push((name.into(), argument.into()));
    self
  }

  /// Registers a method call applied right after construction.
  ///
  /// The applier receives the concrete service and the call's own
  /// resolved arguments. Calls run in registration order.
  pub fn method_call<T, F>(
    mut self,
    name: impl Into<String>,
    arguments: impl IntoIterator<Item = Argument>,
    applier: F,
  ) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn(&mut T, &ResolvedArgs) -> Result<(), BoxError> + Send + Sync + 'static,
  {
    let name = name.into();
    let wrapped: MethodApplier = Arc::new(move |target, args| {
      let target = target
        .downcast_mut::<T>()
        .ok_or_else(|| -> BoxError { format!("receiver is not a {}", type_name::<T>()).into() })?;
      applier(target, args)
    });
    self.method_calls.push(MethodCall {
      name,
      arguments: arguments.into_iter().collect(),
      applier: wrapped,
    });
    self
  }

  /// Attaches a bare tag.
  pub fn tag(mut self, name: impl Into<String>) -> Self {
    self.tags.push(Tag::new(name));
    self
  }

  /// Attaches a tag with attributes.
  pub fn tag_with(mut self, tag: Tag) -> Self {
    self.tags.push(tag);
    self
  }

  /// Attaches a tag to an already registered definition.
  pub fn add_tag(&mut self, tag: Tag) {
    self.tags.push(tag);
  }

  /// Overrides the lifetime.
  pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
    self.lifetime = lifetime;
    self
  }

  /// Shorthand for a transient lifetime.
  pub fn transient(mut self) -> Self {
    self.lifetime = Lifetime::Transient;
    self
  }

  /// Makes the service fetchable by id from outside the container.
  pub fn public(mut self) -> Self {
    self.visibility = Visibility::Public;
    self
  }

  /// Defers construction behind a proxy until first use.
  pub fn lazy(mut self) -> Self {
    self.lazy = true;
    self
  }

  // --- Accessors ---

  pub fn id(&self) -> &ServiceId {
    &self.id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn lifetime(&self) -> Lifetime {
    self.lifetime
  }

  pub fn visibility(&self) -> Visibility {
    self.visibility
  }

  pub fn is_public(&self) -> bool {
    self.visibility == Visibility::Public
  }

  pub fn is_lazy(&self) -> bool {
    self.lazy
  }

  /// Whether this is a value definition.
  pub fn is_value(&self) -> bool {
    matches!(self.kind, DefinitionKind::Value(_))
  }

  /// The payload of a value definition.
  pub fn value_payload(&self) -> Option<&Value> {
    match &self.kind {
      DefinitionKind::Value(v) => Some(v),
      DefinitionKind::Service { .. } => None,
    }
  }

  /// The factory of a service definition.
  pub fn factory(&self) -> Option<ServiceFactory> {
    match &self.kind {
      DefinitionKind::Service { factory } => Some(Arc::clone(factory)),
      DefinitionKind::Value(_) => None,
    }
  }

  pub fn arguments(&self) -> &[Argument] {
    &self.arguments
  }

  pub fn named_arguments(&self) -> &[(String, Argument)] {
    &self.named_arguments
  }

  pub fn declared_parameter_names(&self) -> &[&'static str] {
    &self.parameter_names
  }

  pub fn method_calls(&self) -> &[MethodCall] {
    &self.method_calls
  }

  pub fn tags(&self) -> &[Tag] {
    &self.tags
  }

  pub fn has_tag(&self, name: &str) -> bool {
    self.tags.iter().any(|t| t.name() == name)
  }

  // --- Validation and normalization ---

  /// Checks structural consistency without mutating the definition.
  pub fn validate(&self) -> Result<(), DefinitionError> {
    self.merged_arguments().map(|_| ())
  }

  /// Computes the positional argument list with named arguments folded
  /// in at their declared slots.
  pub(crate) fn merged_arguments(&self) -> Result<Vec<Argument>, DefinitionError> {
    if self.is_value() {
      let inert = self.arguments.is_empty()
        && self.named_arguments.is_empty()
        && self.method_calls.is_empty()
        && !self.lazy;
      if !inert {
        return Err(DefinitionError::InvalidValueDefinition {
          id: self.id.clone(),
        });
      }
      return Ok(Vec::new());
    }

    if self.named_arguments.is_empty() {
      if !self.parameter_names.is_empty() && self.arguments.len() > self.parameter_names.len() {
        return Err(DefinitionError::TooManyArguments {
          id: self.id.clone(),
          declared: self.parameter_names.len(),
          given: self.arguments.len(),
        });
      }
      return Ok(self.arguments.clone());
    }

    if self.parameter_names.is_empty() {
      let (name, _) = &self.named_arguments[0];
      return Err(DefinitionError::UndeclaredNamedArgument {
        id: self.id.clone(),
        name: name.clone(),
      });
    }
    if self.arguments.len() > self.parameter_names.len() {
      return Err(DefinitionError::TooManyArguments {
        id: self.id.clone(),
        declared: self.parameter_names.len(),
        given: self.arguments.len(),
      });
    }

    let mut slots: Vec<Option<Argument>> = vec![None; self.parameter_names.len()];
    for (i, arg) in self.arguments.iter().enumerate() {
      slots[i] = Some(arg.clone());
    }
    let mut seen: Vec<&str> = Vec::with_capacity(self.named_arguments.len());
    for (name, arg) in &self.named_arguments {
      let index = self
        .parameter_names
        .iter()
        .position(|p| p == name)
        .ok_or_else(|| DefinitionError::UnknownNamedArgument {
          id: self.id.clone(),
          name: name.clone(),
        })?;
      if seen.contains(&name.as_str()) {
        return Err(DefinitionError::DuplicateNamedArgument {
          id: self.id.clone(),
          name: name.clone(),
        });
      }
      seen.push(name);
      slots[index] = Some(arg.clone());
    }

    let width = slots
      .iter()
      .rposition(|s| s.is_some())
      .map_or(0, |last| last + 1);
    let mut merged = Vec::with_capacity(width);
    for (index, slot) in slots.into_iter().take(width).enumerate() {
      match slot {
        Some(arg) => merged.push(arg),
        None => {
          return Err(DefinitionError::MissingArgument {
            id: self.id.clone(),
            name: self.parameter_names[index].to_owned(),
          });
        }
      }
    }
    Ok(merged)
  }

  /// Replaces the positional arguments with the merged list and clears
  /// the named overrides. Run by the validation pass.
  pub(crate) fn normalize_arguments(&mut self) -> Result<(), DefinitionError> {
    let merged = self.merged_arguments()?;
    self.arguments = merged;
    self.named_arguments.clear();
    Ok(())
  }

  /// Applies `f` to every reference in arguments and method calls.
  pub(crate) fn visit_references(&self, f: &mut impl FnMut(&Reference)) {
    fn walk(arg: &Argument, f: &mut impl FnMut(&Reference)) {
      match arg {
        Argument::Reference(r) => f(r),
        Argument::Collection(items) => {
          for item in items {
            walk(item, f);
          }
        }
        Argument::Value(_) => {}
      }
    }
    for arg in &self.arguments {
      walk(arg, f);
    }
    for (_, arg) in &self.named_arguments {
      walk(arg, f);
    }
    for call in &self.method_calls {
      for arg in call.arguments() {
        walk(arg, f);
      }
    }
  }

  /// Mutable counterpart of [`visit_references`](Self::visit_references).
  pub(crate) fn visit_references_mut(&mut self, f: &mut impl FnMut(&mut Reference)) {
    fn walk(arg: &mut Argument, f: &mut impl FnMut(&mut Reference)) {
      match arg {
        Argument::Reference(r) => f(r),
        Argument::Collection(items) => {
          for item in items {
            walk(item, f);
          }
        }
        Argument::Value(_) => {}
      }
    }
    for arg in &mut self.arguments {
      walk(arg, f);
    }
    for (_, arg) in &mut self.named_arguments {
      walk(arg, f);
    }
    for call in &mut self.method_calls {
      for arg in call.arguments_mut() {
        walk(arg, f);
      }
    }
  }

  /// Applies `f` to every plain value in arguments, method calls, and
  /// the payload of a value definition. Stops at the first error.
  pub(crate) fn try_visit_values_mut<E>(
    &mut self,
    f: &mut impl FnMut(&mut Value) -> Result<(), E>,
  ) -> Result<(), E> {
    fn walk<E>(arg: &mut Argument, f: &mut impl FnMut(&mut Value) -> Result<(), E>) -> Result<(), E> {
      match arg {
        Argument::Value(v) => f(v),
        Argument::Collection(items) => {
          for item in items {
            walk(item, f)?;
          }
          Ok(())
        }
        Argument::Reference(_) => Ok(()),
      }
    }
    if let DefinitionKind::Value(v) = &mut self.kind {
      f(v)?;
    }
    for arg in &mut self.arguments {
      walk(arg, f)?;
    }
    for (_, arg) in &mut self.named_arguments {
      walk(arg, f)?;
    }
    for call in &mut self.method_calls {
      for arg in call.arguments_mut() {
        walk(arg, f)?;
      }
    }
    Ok(())
  }
}

impl fmt::Debug for Definition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Definition")
      .field("id", &self.id)
      .field("type_name", &self.type_name)
      .field("lifetime", &self.lifetime)
      .field("visibility", &self.visibility)
      .field("lazy", &self.lazy)
      .field("arguments", &self.arguments.len())
      .field("method_calls", &self.method_calls.len())
      .field("tags", &self.tags.len())
      .finish_non_exhaustive()
  }
}
