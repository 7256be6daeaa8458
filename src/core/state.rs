//! Resolved state nodes and transitions.
//!
//! A built [`Machine`](super::Machine) stores its states as a flat arena of
//! [`StateNode`]s numbered in document order (parents before children,
//! siblings in declaration order). Every reference between nodes is a
//! [`StateId`] index into that arena, so the interpreter never resolves a
//! name while stepping.

use super::action::Action;
use super::context::Context;
use super::event::{Event, EventPattern};
use super::guard::Guard;
use super::history::HistoryKind;
use crate::error::ActionError;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type ValueFn = Arc<dyn Fn(&Context, &Event) -> Result<Value, ActionError> + Send + Sync>;
pub type DelayFn = Arc<dyn Fn(&Context, &Event) -> Result<Duration, ActionError> + Send + Sync>;

/// Index of a state node in its machine.
///
/// Ids are assigned in document order, so comparing two ids compares their
/// position in the definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// The machine's root node.
    pub const ROOT: StateId = StateId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a transition in its machine, also its document order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransitionId(pub(crate) usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StateKind {
    Atomic,
    Compound,
    Parallel,
    Final,
    History(HistoryKind),
}

impl StateKind {
    pub fn is_atomic(self) -> bool {
        matches!(self, Self::Atomic | Self::Final)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Compound => "compound",
            Self::Parallel => "parallel",
            Self::Final => "final",
            Self::History(HistoryKind::Shallow) => "history (shallow)",
            Self::History(HistoryKind::Deep) => "history (deep)",
        }
    }
}

/// How long an `after` transition waits.
#[derive(Clone)]
pub enum Delay {
    Fixed(Duration),
    /// Registered delay function, evaluated when the state is entered.
    Computed { name: String, compute: DelayFn },
}

impl Delay {
    pub fn resolve(&self, context: &Context, event: &Event) -> Result<Duration, ActionError> {
        match self {
            Self::Fixed(duration) => Ok(*duration),
            Self::Computed { name, compute } => {
                compute(context, event).map_err(|err| err.in_action(&format!("delay {name}")))
            }
        }
    }
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(duration) => write!(f, "{}ms", duration.as_millis()),
            Self::Computed { name, .. } => write!(f, "delay '{name}'"),
        }
    }
}

/// Timer armed while the owning state is active. When it fires, the
/// owning state receives an event of type `event`.
#[derive(Clone, Debug)]
pub struct DelayedTransition {
    pub(crate) delay: Delay,
    pub(crate) event: String,
}

impl DelayedTransition {
    pub fn delay(&self) -> &Delay {
        &self.delay
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Actor started when the owning state is entered and stopped when it
/// is exited.
#[derive(Clone)]
pub struct Invocation {
    pub(crate) id: String,
    pub(crate) src: String,
    pub(crate) input: Option<ValueFn>,
}

impl Invocation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub(crate) fn input(&self, context: &Context, event: &Event) -> Result<Value, ActionError> {
        match &self.input {
            Some(input) => input(context, event).map_err(|err| err.in_action(&self.src)),
            None => Ok(Value::Null),
        }
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("id", &self.id)
            .field("src", &self.src)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Event(EventPattern),
    /// Eventless transition, checked after every microstep.
    Always,
}

#[derive(Clone, Debug)]
pub struct Transition {
    pub(crate) id: TransitionId,
    pub(crate) source: StateId,
    pub(crate) trigger: Trigger,
    pub(crate) guard: Option<Guard>,
    pub(crate) targets: Vec<StateId>,
    pub(crate) actions: Vec<Action>,
    pub(crate) reenter: bool,
    pub(crate) description: Option<String>,
}

impl Transition {
    pub fn id(&self) -> TransitionId {
        self.id
    }

    pub fn source(&self) -> StateId {
        self.source
    }

    pub fn trigger(&self) -> &Trigger {
        &self.trigger
    }

    pub fn targets(&self) -> &[StateId] {
        &self.targets
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn reenter(&self) -> bool {
        self.reenter
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Targetless and not reentering: only actions run.
    pub fn is_internal_only(&self) -> bool {
        self.targets.is_empty() && !self.reenter
    }

    pub(crate) fn matches(&self, kind: &str) -> bool {
        match &self.trigger {
            Trigger::Event(pattern) => pattern.matches(kind),
            Trigger::Always => false,
        }
    }

    pub(crate) fn enabled(&self, context: &Context, event: &Event) -> Result<bool, ActionError> {
        match &self.guard {
            Some(guard) => guard.check(context, event),
            None => Ok(true),
        }
    }
}

/// A resolved state.
#[derive(Clone)]
pub struct StateNode {
    pub(crate) index: StateId,
    pub(crate) key: String,
    pub(crate) id: String,
    pub(crate) path: String,
    pub(crate) kind: StateKind,
    pub(crate) parent: Option<StateId>,
    pub(crate) children: Vec<StateId>,
    pub(crate) initial: Option<StateId>,
    pub(crate) entry: Vec<Action>,
    pub(crate) exit: Vec<Action>,
    /// Event transitions, already ordered for matching.
    pub(crate) on: Vec<TransitionId>,
    pub(crate) always: Vec<TransitionId>,
    pub(crate) delayed: Vec<DelayedTransition>,
    pub(crate) invocations: Vec<Invocation>,
    pub(crate) tags: Vec<String>,
    /// Default targets of a history state.
    pub(crate) history_default: Vec<StateId>,
    pub(crate) output: Option<ValueFn>,
    pub(crate) description: Option<String>,
    pub(crate) depth: usize,
}

impl StateNode {
    pub fn index(&self) -> StateId {
        self.index
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Globally unique id, `#`-addressable in targets.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Dot-separated path from the root, empty for the root itself.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> StateKind {
        self.kind
    }

    pub fn parent(&self) -> Option<StateId> {
        self.parent
    }

    pub fn children(&self) -> &[StateId] {
        &self.children
    }

    pub fn initial(&self) -> Option<StateId> {
        self.initial
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn delayed(&self) -> &[DelayedTransition] {
        &self.delayed
    }

    pub fn invocations(&self) -> &[Invocation] {
        &self.invocations
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }

    pub fn is_history(&self) -> bool {
        matches!(self.kind, StateKind::History(_))
    }

    pub(crate) fn history_kind(&self) -> Option<HistoryKind> {
        match self.kind {
            StateKind::History(kind) => Some(kind),
            _ => None,
        }
    }

    pub(crate) fn output(&self, context: &Context, event: &Event) -> Result<Value, ActionError> {
        match &self.output {
            Some(output) => output(context, event).map_err(|err| err.in_action("output")),
            None => Ok(Value::Null),
        }
    }
}

impl fmt::Debug for StateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateNode")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_ids_compare_in_document_order() {
        assert!(StateId::ROOT < StateId(1));
        assert_eq!(StateId(4).index(), 4);
    }

    #[test]
    fn final_states_count_as_atomic() {
        assert!(StateKind::Final.is_atomic());
        assert!(StateKind::Atomic.is_atomic());
        assert!(!StateKind::Parallel.is_atomic());
        assert!(!StateKind::History(HistoryKind::Deep).is_atomic());
    }

    #[test]
    fn computed_delay_failures_name_the_delay() {
        let delay = Delay::Computed {
            name: "Inactivity timeout".into(),
            compute: Arc::new(|_, _| Err(ActionError::new("no timeout configured"))),
        };
        let err = delay.resolve(&Context::new(), &Event::new("activity")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "action 'delay Inactivity timeout' failed: no timeout configured"
        );

        let fixed = Delay::Fixed(Duration::from_millis(1000));
        assert_eq!(
            fixed.resolve(&Context::new(), &Event::new("click")),
            Ok(Duration::from_millis(1000))
        );
    }

    #[test]
    fn targetless_transitions_are_internal_unless_reentering() {
        let mut transition = Transition {
            id: TransitionId(0),
            source: StateId(1),
            trigger: Trigger::Event(EventPattern::Exact("volume.set".into())),
            guard: None,
            targets: Vec::new(),
            actions: Vec::new(),
            reenter: false,
            description: None,
        };
        assert!(transition.is_internal_only());
        assert!(transition.matches("volume.set"));

        transition.reenter = true;
        assert!(!transition.is_internal_only());
    }
}
