//! The immutable, validated machine definition.

use super::action::Action;
use super::context::Context;
use super::event::Event;
use super::state::{StateId, StateNode, Transition, TransitionId, ValueFn};
use crate::actor::ActorLogic;
use crate::error::ActionError;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type ContextFn = Arc<dyn Fn(&Value) -> Result<Context, ActionError> + Send + Sync>;

/// How a fresh instance gets its context.
#[derive(Clone)]
pub enum ContextInit {
    Static(Context),
    /// Computed from the input the actor is created with.
    FromInput(ContextFn),
}

/// A validated statechart.
///
/// Machines are built with [`MachineBuilder`](crate::builder::MachineBuilder)
/// and never change afterwards. Any number of actors can run the same
/// machine; wrap it in an `Arc` to share it.
///
/// # Example
///
/// ```rust
/// use machina::builder::{MachineBuilder, StateBuilder};
///
/// let machine = MachineBuilder::new("toggle")
///     .initial("Off")
///     .state(StateBuilder::new("Off").on("toggle", "On"))
///     .state(StateBuilder::new("On").on("toggle", "Off"))
///     .build()
///     .unwrap();
///
/// let on = machine.find("On").unwrap();
/// assert_eq!(machine.node(on).id(), "toggle.On");
/// ```
#[derive(Clone)]
pub struct Machine {
    pub(crate) id: String,
    pub(crate) nodes: Vec<StateNode>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) context: ContextInit,
    pub(crate) actions: HashMap<String, Action>,
    pub(crate) actors: HashMap<String, ActorLogic>,
    pub(crate) output: Option<ValueFn>,
    pub(crate) by_id: HashMap<String, StateId>,
    pub(crate) by_path: HashMap<String, StateId>,
}

impl Machine {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root(&self) -> &StateNode {
        self.node(StateId::ROOT)
    }

    /// Look up a node by id. Ids come from this machine, so the lookup
    /// cannot miss.
    pub fn node(&self, id: StateId) -> &StateNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[StateNode] {
        &self.nodes
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id.0]
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Find a state by path (`Active.Idle`) or by `#id`.
    pub fn find(&self, reference: &str) -> Option<StateId> {
        match reference.strip_prefix('#') {
            Some(id) => self.by_id.get(id).copied(),
            None => self.by_path.get(reference).copied(),
        }
    }

    pub fn actor_logic(&self, src: &str) -> Option<&ActorLogic> {
        self.actors.get(src)
    }

    pub(crate) fn initial_context(&self, input: &Value) -> Result<Context, ActionError> {
        match &self.context {
            ContextInit::Static(context) => Ok(context.clone()),
            ContextInit::FromInput(compute) => {
                compute(input).map_err(|err| err.in_action("context"))
            }
        }
    }

    pub(crate) fn output(&self, context: &Context, event: &Event) -> Result<Value, ActionError> {
        match &self.output {
            Some(output) => output(context, event).map_err(|err| err.in_action("output")),
            None => Ok(Value::Null),
        }
    }

    /// Proper ancestors of `id`, nearest first.
    pub(crate) fn ancestors(&self, id: StateId) -> Ancestors<'_> {
        Ancestors {
            machine: self,
            next: self.node(id).parent,
        }
    }

    /// Whether `state` is a proper descendant of `ancestor`.
    pub(crate) fn is_descendant(&self, state: StateId, ancestor: StateId) -> bool {
        self.ancestors(state).any(|id| id == ancestor)
    }
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("id", &self.id)
            .field("states", &self.nodes.len())
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

pub(crate) struct Ancestors<'m> {
    machine: &'m Machine,
    next: Option<StateId>,
}

impl Iterator for Ancestors<'_> {
    type Item = StateId;

    fn next(&mut self) -> Option<StateId> {
        let current = self.next?;
        self.next = self.machine.node(current).parent;
        Some(current)
    }
}
