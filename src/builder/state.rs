//! Builders for state nodes and invocations.

use crate::builder::spec::{ActionSpec, DelaySpec};
use crate::builder::transition::TransitionBuilder;
use crate::core::{Context, Event, HistoryKind, ValueFn};
use crate::error::ActionError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// Atomic or compound, decided by whether children were added.
    Auto,
    Parallel,
    Final,
    History(HistoryKind),
}

/// Builder for one state and its subtree.
///
/// # Example
///
/// ```rust
/// use machina::builder::{StateBuilder, TransitionBuilder};
///
/// let debouncing = StateBuilder::new("Debouncing")
///     .on("click", TransitionBuilder::to("Debouncing").reenter(true))
///     .after(1000, TransitionBuilder::to("Idle").action("Increment counter"));
/// # let _ = debouncing;
/// ```
#[derive(Clone)]
pub struct StateBuilder {
    pub(crate) key: String,
    pub(crate) kind: NodeKind,
    pub(crate) id: Option<String>,
    pub(crate) initial: Option<String>,
    pub(crate) children: Vec<StateBuilder>,
    pub(crate) on: Vec<(String, TransitionBuilder)>,
    pub(crate) always: Vec<TransitionBuilder>,
    pub(crate) after: Vec<(DelaySpec, TransitionBuilder)>,
    pub(crate) entry: Vec<ActionSpec>,
    pub(crate) exit: Vec<ActionSpec>,
    pub(crate) invoke: Vec<InvokeBuilder>,
    pub(crate) on_done: Vec<TransitionBuilder>,
    pub(crate) tags: Vec<String>,
    pub(crate) output: Option<ValueFn>,
    pub(crate) history_default: Option<String>,
    pub(crate) description: Option<String>,
}

impl StateBuilder {
    /// Atomic state, or compound once children are added.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: NodeKind::Auto,
            id: None,
            initial: None,
            children: Vec::new(),
            on: Vec::new(),
            always: Vec::new(),
            after: Vec::new(),
            entry: Vec::new(),
            exit: Vec::new(),
            invoke: Vec::new(),
            on_done: Vec::new(),
            tags: Vec::new(),
            output: None,
            history_default: None,
            description: None,
        }
    }

    /// State whose children are all active together.
    pub fn parallel(key: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Parallel,
            ..Self::new(key)
        }
    }

    pub fn final_state(key: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Final,
            ..Self::new(key)
        }
    }

    /// History pseudo-state of the enclosing compound state.
    pub fn history(key: impl Into<String>, kind: HistoryKind) -> Self {
        Self {
            kind: NodeKind::History(kind),
            ..Self::new(key)
        }
    }

    /// Override the state id, addressable as `#id`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.initial = Some(key.into());
        self
    }

    pub fn state(mut self, child: StateBuilder) -> Self {
        self.children.push(child);
        self
    }

    /// Add a candidate transition for `event`. Candidates for the same
    /// event are tried in the order they were added.
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionBuilder>) -> Self {
        self.on.push((event.into(), transition.into()));
        self
    }

    /// Add an eventless transition.
    pub fn always(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.always.push(transition.into());
        self
    }

    /// Add a delayed transition. Candidates with the same delay share one
    /// timer.
    pub fn after(
        mut self,
        delay: impl Into<DelaySpec>,
        transition: impl Into<TransitionBuilder>,
    ) -> Self {
        self.after.push((delay.into(), transition.into()));
        self
    }

    pub fn entry(mut self, action: impl Into<ActionSpec>) -> Self {
        self.entry.push(action.into());
        self
    }

    pub fn exit(mut self, action: impl Into<ActionSpec>) -> Self {
        self.exit.push(action.into());
        self
    }

    pub fn invoke(mut self, invoke: InvokeBuilder) -> Self {
        self.invoke.push(invoke);
        self
    }

    /// Transition taken when a final child is reached (compound) or every
    /// region is final (parallel).
    pub fn on_done(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.on_done.push(transition.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Output of a final state, carried by the parent's `done.state` event.
    pub fn output<F>(mut self, output: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(output));
        self
    }

    /// Target entered when a history state has nothing recorded yet.
    pub fn default_target(mut self, target: impl Into<String>) -> Self {
        self.history_default = Some(target.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for StateBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateBuilder")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .finish()
    }
}

/// Builder for an actor invoked while a state is active.
///
/// # Example
///
/// ```rust
/// use machina::builder::{InvokeBuilder, TransitionBuilder};
/// use machina::core::Action;
/// use serde_json::json;
///
/// let search = InvokeBuilder::new("Search")
///     .id("search")
///     .input(|context, _| Ok(json!({ "query": context.get("searchInput") })))
///     .on_done(TransitionBuilder::to("Idle").action(Action::assign_field(
///         "results",
///         |_, event| event.output().cloned().unwrap_or_default(),
///     )))
///     .on_error("Failed");
/// # let _ = search;
/// ```
#[derive(Clone)]
pub struct InvokeBuilder {
    pub(crate) src: String,
    pub(crate) id: Option<String>,
    pub(crate) input: Option<ValueFn>,
    pub(crate) on_done: Vec<TransitionBuilder>,
    pub(crate) on_error: Vec<TransitionBuilder>,
}

impl InvokeBuilder {
    /// Invoke the actor logic registered under `src`.
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            id: None,
            input: None,
            on_done: Vec::new(),
            on_error: Vec::new(),
        }
    }

    /// Id of the child actor. Defaults to `<state id>:<index>`.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn input<F>(mut self, input: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(input));
        self
    }

    pub fn on_done(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.on_done.push(transition.into());
        self
    }

    pub fn on_error(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.on_error.push(transition.into());
        self
    }
}

impl fmt::Debug for InvokeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvokeBuilder")
            .field("src", &self.src)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_kind() {
        assert_eq!(StateBuilder::new("Idle").kind, NodeKind::Auto);
        assert_eq!(StateBuilder::parallel("Active").kind, NodeKind::Parallel);
        assert_eq!(StateBuilder::final_state("Done").kind, NodeKind::Final);
        assert_eq!(
            StateBuilder::history("Hist", HistoryKind::Deep).kind,
            NodeKind::History(HistoryKind::Deep)
        );
    }

    #[test]
    fn candidates_keep_declaration_order() {
        let state = StateBuilder::new("Checking")
            .on("submit", TransitionBuilder::to("A").guard("first"))
            .on("submit", TransitionBuilder::to("B"))
            .after(500, "C")
            .after(500, "D");

        let targets: Vec<_> = state.on.iter().map(|(_, t)| t.targets[0].as_str()).collect();
        assert_eq!(targets, vec!["A", "B"]);
        assert_eq!(state.after.len(), 2);
    }
}
