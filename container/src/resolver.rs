//! Reference resolution: from a definition graph to an executable plan.
//!
//! The resolver walks every reference in the graph and produces a
//! [`ResolvedGraph`]: the same definitions, but with every argument
//! lowered to an [`ArgPlan`] a runtime can execute without further
//! lookups. Along the way it flattens alias chains, rejects references
//! to ids that do not exist, and proves the eager dependency edges form
//! no cycle.
//!
//! Eagerness is decided per edge. An edge is lazy when the reference
//! asks for a proxy or the target definition is itself marked lazy, and
//! it is a peek when the reference tolerates a missing target. Only the
//! remaining eager edges participate in cycle detection, because only
//! they force construction before the dependent service can exist.

use indexmap::IndexMap;
use tracing::debug;

use crate::definition::{Definition, MethodApplier, TagAttributes};
use crate::error::GraphError;
use crate::graph::{collect_tags, DefinitionGraph};
use crate::id::ServiceId;
use crate::reference::{Argument, Reference, ReferenceMode};
use crate::value::Value;

/// Longest alias chain the resolver will follow before giving up.
pub const MAX_ALIAS_DEPTH: usize = 32;

/// Tag name to tagged definitions, both in declaration order.
pub type TagIndex = IndexMap<String, Vec<(ServiceId, TagAttributes)>>;

/// One argument, lowered to its runtime delivery plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgPlan {
  /// Deliver this value as-is.
  Value(Value),
  /// Build (or fetch) the target before the dependent service.
  Eager(ServiceId),
  /// Deliver a proxy that builds the target on first touch.
  Lazy(ServiceId),
  /// Deliver the target only if it is already built, nothing otherwise.
  Peek(ServiceId),
  /// The optional target does not exist; deliver nothing.
  Absent,
  /// An ordered collection of plans.
  Seq(Vec<ArgPlan>),
}

/// A method call with its arguments lowered.
#[derive(Clone)]
pub struct CallPlan {
  name: String,
  applier: MethodApplier,
  args: Vec<ArgPlan>,
}

impl CallPlan {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn applier(&self) -> MethodApplier {
    self.applier.clone()
  }

  pub fn args(&self) -> &[ArgPlan] {
    &self.args
  }
}

impl std::fmt::Debug for CallPlan {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CallPlan")
      .field("name", &self.name)
      .field("args", &self.args)
      .finish_non_exhaustive()
  }
}

/// A definition plus the lowered plans for its construction.
#[derive(Debug, Clone)]
pub struct ResolvedDefinition {
  definition: Definition,
  arg_plans: Vec<ArgPlan>,
  call_plans: Vec<CallPlan>,
}

impl ResolvedDefinition {
  pub fn definition(&self) -> &Definition {
    &self.definition
  }

  pub fn arg_plans(&self) -> &[ArgPlan] {
    &self.arg_plans
  }

  pub fn call_plans(&self) -> &[CallPlan] {
    &self.call_plans
  }
}

/// The validated, lowered form of a definition graph.
///
/// Everything a runtime or compiler needs, in deterministic order:
/// definitions with plans, the flattened alias table, and the tag index.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
  definitions: IndexMap<ServiceId, ResolvedDefinition>,
  aliases: IndexMap<ServiceId, ServiceId>,
  tags: TagIndex,
}

impl ResolvedGraph {
  /// Follows one alias hop (chains are already flattened) and returns
  /// the id of the backing definition, if any.
  pub fn canonical_id(&self, id: &str) -> Option<&ServiceId> {
    match self.definitions.get_key_value(id) {
      Some((key, _)) => Some(key),
      None => self.aliases.get(id),
    }
  }

  pub fn get(&self, id: &str) -> Option<&ResolvedDefinition> {
    match self.definitions.get(id) {
      Some(def) => Some(def),
      None => self
        .aliases
        .get(id)
        .and_then(|target| self.definitions.get(target)),
    }
  }

  pub fn contains(&self, id: &str) -> bool {
    self.definitions.contains_key(id) || self.aliases.contains_key(id)
  }

  pub fn is_alias(&self, id: &str) -> bool {
    self.aliases.contains_key(id)
  }

  pub fn alias_target(&self, id: &str) -> Option<&ServiceId> {
    self.aliases.get(id)
  }

  pub fn definitions(&self) -> impl Iterator<Item = (&ServiceId, &ResolvedDefinition)> {
    self.definitions.iter()
  }

  pub fn aliases(&self) -> impl Iterator<Item = (&ServiceId, &ServiceId)> {
    self.aliases.iter()
  }

  pub fn tags(&self) -> &TagIndex {
    &self.tags
  }

  /// The definitions carrying `tag`, in declaration order.
  pub fn tagged(&self, tag: &str) -> &[(ServiceId, TagAttributes)] {
    self.tags.get(tag).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.definitions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.definitions.is_empty()
  }
}

/// Flattens every alias chain to its terminal id.
///
/// The terminal may or may not be a definition; callers decide whether
/// a dangling terminal is an error.
pub(crate) fn flatten_aliases(
  graph: &DefinitionGraph,
) -> Result<IndexMap<ServiceId, ServiceId>, GraphError> {
  let mut flat = IndexMap::with_capacity(graph.alias_count());
  for (alias, first_target) in graph.aliases() {
    let mut current = first_target.clone();
    let mut hops = 1usize;
    while let Some(next) = graph.alias_target(current.as_str()) {
      hops += 1;
      if hops > MAX_ALIAS_DEPTH {
        return Err(GraphError::AliasChainTooDeep {
          alias: alias.clone(),
          limit: MAX_ALIAS_DEPTH,
        });
      }
      current = next.clone();
    }
    flat.insert(alias.clone(), current);
  }
  Ok(flat)
}

/// Collects every reference target of a definition, regardless of mode
/// or laziness. Used for reachability.
pub(crate) fn reference_targets(def: &Definition) -> Vec<ServiceId> {
  let mut targets = Vec::new();
  def.visit_references(&mut |r: &Reference| targets.push(r.target().clone()));
  targets
}

/// Validates references and lowers a graph into a [`ResolvedGraph`].
#[derive(Debug, Default)]
pub struct ReferenceResolver {
  _private: (),
}

impl ReferenceResolver {
  pub fn new() -> Self {
    ReferenceResolver::default()
  }

  /// Resolves a graph in isolation, without running a pipeline.
  ///
  /// Alias chains are flattened and the tag index is collected here.
  /// Graphs run through [`Pipeline::run`](crate::pipeline::Pipeline::run)
  /// get the same treatment from the dedicated passes.
  pub fn resolve(&self, graph: &DefinitionGraph) -> Result<ResolvedGraph, GraphError> {
    let tags = collect_tags(graph);
    self.resolve_prepared(graph.clone(), tags)
  }

  /// Resolves a graph whose tag index was already collected.
  pub(crate) fn resolve_prepared(
    &self,
    mut graph: DefinitionGraph,
    tags: TagIndex,
  ) -> Result<ResolvedGraph, GraphError> {
    let aliases = flatten_aliases(&graph)?;
    for (alias, terminal) in &aliases {
      if !graph.contains_definition(terminal.as_str()) {
        return Err(GraphError::UnresolvableReference {
          target: terminal.clone(),
          referenced_from: alias.clone(),
        });
      }
    }
    for (_, def) in graph.definitions_mut() {
      def.visit_references_mut(&mut |r: &mut Reference| {
        if let Some(terminal) = aliases.get(r.target()) {
          r.retarget(terminal.clone());
        }
      });
    }

    // Lower every argument, validating existence as we go.
    let mut lowered: IndexMap<ServiceId, ResolvedDefinition> =
      IndexMap::with_capacity(graph.len());
    for (id, def) in graph.definitions() {
      let mut arg_plans = Vec::with_capacity(def.arguments().len());
      for arg in def.arguments() {
        arg_plans.push(lower_argument(&graph, id, arg)?);
      }
      let mut call_plans = Vec::with_capacity(def.method_calls().len());
      for call in def.method_calls() {
        let mut args = Vec::with_capacity(call.arguments().len());
        for arg in call.arguments() {
          args.push(lower_argument(&graph, id, arg)?);
        }
        call_plans.push(CallPlan {
          name: call.name().to_owned(),
          applier: call.applier(),
          args,
        });
      }
      lowered.insert(
        id.clone(),
        ResolvedDefinition {
          definition: def.clone(),
          arg_plans,
          call_plans,
        },
      );
    }

    check_eager_cycles(&lowered)?;

    debug!(
      services = lowered.len(),
      aliases = aliases.len(),
      "reference resolution complete"
    );
    Ok(ResolvedGraph {
      definitions: lowered,
      aliases,
      tags,
    })
  }
}

fn lower_argument(
  graph: &DefinitionGraph,
  owner: &ServiceId,
  arg: &Argument,
) -> Result<ArgPlan, GraphError> {
  match arg {
    Argument::Value(v) => Ok(ArgPlan::Value(v.clone())),
    Argument::Collection(items) => {
      let mut plans = Vec::with_capacity(items.len());
      for item in items {
        plans.push(lower_argument(graph, owner, item)?);
      }
      Ok(ArgPlan::Seq(plans))
    }
    Argument::Reference(r) => {
      let target = r.target();
      match graph.get(target.as_str()) {
        None => match r.mode() {
          ReferenceMode::IgnoreOnMissing => Ok(ArgPlan::Absent),
          ReferenceMode::Strict => Err(GraphError::UnresolvableReference {
            target: target.clone(),
            referenced_from: owner.clone(),
          }),
        },
        Some(target_def) => {
          if r.is_lazy() || target_def.is_lazy() {
            Ok(ArgPlan::Lazy(target.clone()))
          } else if r.mode() == ReferenceMode::IgnoreOnMissing {
            Ok(ArgPlan::Peek(target.clone()))
          } else {
            Ok(ArgPlan::Eager(target.clone()))
          }
        }
      }
    }
  }
}

fn push_eager_targets(plan: &ArgPlan, out: &mut Vec<ServiceId>) {
  match plan {
    ArgPlan::Eager(id) => out.push(id.clone()),
    ArgPlan::Seq(items) => {
      for item in items {
        push_eager_targets(item, out);
      }
    }
    _ => {}
  }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
  White,
  Grey,
  Black,
}

/// Depth-first search over eager edges. Method call arguments count as
/// construction edges because calls run before the instance is shared.
fn check_eager_cycles(
  definitions: &IndexMap<ServiceId, ResolvedDefinition>,
) -> Result<(), GraphError> {
  let mut edges: IndexMap<&ServiceId, Vec<ServiceId>> =
    IndexMap::with_capacity(definitions.len());
  for (id, resolved) in definitions {
    let mut targets = Vec::new();
    for plan in resolved.arg_plans() {
      push_eager_targets(plan, &mut targets);
    }
    for call in resolved.call_plans() {
      for plan in call.args() {
        push_eager_targets(plan, &mut targets);
      }
    }
    edges.insert(id, targets);
  }

  let mut marks: IndexMap<&ServiceId, Mark> = definitions
    .keys()
    .map(|id| (id, Mark::White))
    .collect();

  enum Frame<'a> {
    Enter(&'a ServiceId),
    Exit(&'a ServiceId),
  }

  let mut path: Vec<ServiceId> = Vec::new();
  let mut stack: Vec<Frame<'_>> = Vec::new();

  for root in definitions.keys() {
    if marks[root] != Mark::White {
      continue;
    }
    stack.push(Frame::Enter(root));
    while let Some(frame) = stack.pop() {
      match frame {
        Frame::Enter(id) => match marks[id] {
          Mark::Black => {}
          Mark::Grey => {
            let start = path
              .iter()
              .position(|p| p == id)
              .unwrap_or(0);
            let mut cycle: Vec<ServiceId> = path[start..].to_vec();
            cycle.push(id.clone());
            return Err(GraphError::CircularReference { path: cycle });
          }
          Mark::White => {
            marks[id] = Mark::Grey;
            path.push(id.clone());
            stack.push(Frame::Exit(id));
            if let Some(targets) = edges.get(id) {
              for target in targets.iter().rev() {
                // Targets always exist here; lowering validated them.
                if let Some((key, _)) = definitions.get_key_value(target) {
                  stack.push(Frame::Enter(key));
                }
              }
            }
          }
        },
        Frame::Exit(id) => {
          marks[id] = Mark::Black;
          path.pop();
        }
      }
    }
  }
  Ok(())
}
