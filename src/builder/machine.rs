//! Builder for whole machines.

use crate::actor::ActorLogic;
use crate::builder::compile;
use crate::builder::error::BuildError;
use crate::builder::spec::{ActionSpec, DelaySpec};
use crate::builder::state::{InvokeBuilder, NodeKind, StateBuilder};
use crate::builder::transition::TransitionBuilder;
use crate::core::{Action, Context, ContextFn, DelayFn, Event, Guard, Machine, ValueFn};
use crate::error::ActionError;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub(crate) enum ContextSource {
    Value(Value),
    FromInput(ContextFn),
}

/// Builder for constructing machines with a fluent API.
///
/// The builder doubles as the machine's root state: `initial`, `state`,
/// `on` and friends configure the root. Named actions, guards, delays and
/// actor logic are registered here and may be referenced from any state.
/// Nothing is checked until [`build`](Self::build), which reports every
/// problem at once.
///
/// # Example
///
/// ```rust
/// use machina::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
/// use machina::core::Action;
/// use serde_json::json;
///
/// let machine = MachineBuilder::new("debouncing")
///     .context(json!({ "counter": 0 }))
///     .action("Increment counter", Action::assign_field("counter", |context, _| {
///         json!(context.get_i64("counter").unwrap_or(0) + 1)
///     }))
///     .initial("Idle")
///     .state(StateBuilder::new("Idle").on("click", "Debouncing"))
///     .state(
///         StateBuilder::new("Debouncing")
///             .on("click", TransitionBuilder::to("Debouncing").reenter(true))
///             .after(1000, TransitionBuilder::to("Idle").action("Increment counter")),
///     )
///     .build()
///     .unwrap();
///
/// assert_eq!(machine.id(), "debouncing");
/// ```
pub struct MachineBuilder {
    pub(crate) root: StateBuilder,
    pub(crate) context: ContextSource,
    pub(crate) actions: HashMap<String, Action>,
    pub(crate) guards: HashMap<String, Guard>,
    pub(crate) delays: HashMap<String, DelayFn>,
    pub(crate) actors: HashMap<String, ActorLogic>,
    pub(crate) output: Option<ValueFn>,
}

impl MachineBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            root: StateBuilder::new(id),
            context: ContextSource::Value(Value::Object(Default::default())),
            actions: HashMap::new(),
            guards: HashMap::new(),
            delays: HashMap::new(),
            actors: HashMap::new(),
            output: None,
        }
    }

    /// Static initial context. Must be a JSON object.
    pub fn context(mut self, context: Value) -> Self {
        self.context = ContextSource::Value(context);
        self
    }

    /// Initial context computed from the input the actor is created with.
    pub fn context_from_input<F>(mut self, compute: F) -> Self
    where
        F: Fn(&Value) -> Result<Context, ActionError> + Send + Sync + 'static,
    {
        self.context = ContextSource::FromInput(Arc::new(compute));
        self
    }

    /// Register a named action.
    pub fn action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.actions.insert(name.into(), action);
        self
    }

    /// Register a named guard.
    pub fn guard(mut self, name: impl Into<String>, guard: Guard) -> Self {
        self.guards.insert(name.into(), guard);
        self
    }

    /// Register a named delay computed from context and event.
    pub fn delay<F>(mut self, name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Duration, ActionError> + Send + Sync + 'static,
    {
        self.delays.insert(name.into(), Arc::new(compute));
        self
    }

    /// Register actor logic that states can invoke and assigns can spawn.
    pub fn actor(mut self, name: impl Into<String>, logic: ActorLogic) -> Self {
        self.actors.insert(name.into(), logic);
        self
    }

    /// Output reported when the machine reaches a top-level final state.
    pub fn output<F>(mut self, output: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Value, ActionError> + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(output));
        self
    }

    /// Make the root a parallel state.
    pub fn parallel(mut self) -> Self {
        self.root.kind = NodeKind::Parallel;
        self
    }

    pub fn initial(mut self, key: impl Into<String>) -> Self {
        self.root = self.root.initial(key);
        self
    }

    pub fn state(mut self, state: StateBuilder) -> Self {
        self.root = self.root.state(state);
        self
    }

    /// Root-level transition, taken when no active descendant handles the
    /// event.
    pub fn on(mut self, event: impl Into<String>, transition: impl Into<TransitionBuilder>) -> Self {
        self.root = self.root.on(event, transition);
        self
    }

    pub fn always(mut self, transition: impl Into<TransitionBuilder>) -> Self {
        self.root = self.root.always(transition);
        self
    }

    pub fn after(
        mut self,
        delay: impl Into<DelaySpec>,
        transition: impl Into<TransitionBuilder>,
    ) -> Self {
        self.root = self.root.after(delay, transition);
        self
    }

    pub fn entry(mut self, action: impl Into<ActionSpec>) -> Self {
        self.root = self.root.entry(action);
        self
    }

    pub fn exit(mut self, action: impl Into<ActionSpec>) -> Self {
        self.root = self.root.exit(action);
        self
    }

    pub fn invoke(mut self, invoke: InvokeBuilder) -> Self {
        self.root = self.root.invoke(invoke);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.root = self.root.tag(tag);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.root = self.root.description(description);
        self
    }

    /// Validate the definition and resolve every reference.
    pub fn build(self) -> Result<Machine, BuildError> {
        compile::compile(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::error::DefinitionError;
    use serde_json::json;

    #[test]
    fn builder_validates_initial_state() {
        let result = MachineBuilder::new("m")
            .state(StateBuilder::new("Idle"))
            .build();

        let err = result.unwrap_err();
        assert_eq!(
            err.errors(),
            &[DefinitionError::MissingInitialState { state: "m".into() }]
        );
    }

    #[test]
    fn machine_without_states_is_a_single_atomic_root() {
        let machine = MachineBuilder::new("empty").build().unwrap();
        assert_eq!(machine.nodes().len(), 1);
        assert!(machine.root().kind().is_atomic());
    }

    #[test]
    fn registrations_can_follow_their_use() {
        let machine = MachineBuilder::new("m")
            .initial("Idle")
            .state(StateBuilder::new("Idle").entry("Reset"))
            .action("Reset", Action::set("counter", 0))
            .context(json!({ "counter": 3 }))
            .build();
        assert!(machine.is_ok());
    }

    #[test]
    fn parallel_root_needs_no_initial() {
        let machine = MachineBuilder::new("player")
            .parallel()
            .state(StateBuilder::new("Video").initial("Paused").state(StateBuilder::new("Paused")))
            .state(StateBuilder::new("Volume").initial("On").state(StateBuilder::new("On")))
            .build()
            .unwrap();
        assert_eq!(machine.root().children().len(), 2);
    }
}
