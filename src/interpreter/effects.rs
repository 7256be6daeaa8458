//! Effects a step asks the actor system to carry out.
//!
//! The interpreter never touches timers, mailboxes or other actors
//! directly. It describes what should happen as [`Effect`]s, returned with
//! the step and applied by the system once the step has committed. The
//! only synchronous channel to the outside is [`ActorScope`], used to
//! allocate and look up child actors while actions run.

use crate::actor::{ActorLogic, ActorRef};
use crate::core::{Event, Machine};
use crate::error::ActionError;
use serde_json::Value;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Effect {
    /// Arm a timer. Arming an id that is already armed replaces it.
    Schedule {
        id: String,
        delay: Duration,
        /// `None` delivers to the actor itself.
        to: Option<ActorRef>,
        event: Event,
        token: Option<u64>,
    },
    Cancel {
        id: String,
    },
    Send {
        to: ActorRef,
        event: Event,
    },
    SendParent {
        event: Event,
    },
    Start(ActorRef),
    Stop(ActorRef),
}

/// Options for spawning a child actor.
#[derive(Clone, Debug, Default)]
pub struct SpawnOptions {
    /// Child id, unique among the parent's live children. Defaults to
    /// `<parent id>:<n>`.
    pub id: Option<String>,
    pub input: Value,
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }
}

/// Child bookkeeping available to a running step.
pub(crate) trait ActorScope {
    /// The actor running the step, if it belongs to a system.
    fn self_ref(&self) -> Option<&ActorRef>;

    /// Register a child. It starts when the step's effects are applied.
    fn spawn(
        &mut self,
        logic: &ActorLogic,
        options: SpawnOptions,
    ) -> Result<ActorRef, ActionError>;

    /// Release a child's id. The child is torn down when the step's
    /// effects are applied.
    fn release(&mut self, actor: &ActorRef);

    /// Whether `actor` is a registered, unreleased child of this actor.
    fn owns(&self, actor: &ActorRef) -> bool;

    fn child(&self, id: &str) -> Option<ActorRef>;

    fn children(&self) -> Vec<String>;
}

/// Scope for an interpreter that runs outside any actor system. Spawning
/// fails; everything else is empty.
#[cfg(test)]
pub(crate) struct Detached;

#[cfg(test)]
impl ActorScope for Detached {
    fn self_ref(&self) -> Option<&ActorRef> {
        None
    }

    fn spawn(&mut self, _: &ActorLogic, _: SpawnOptions) -> Result<ActorRef, ActionError> {
        Err(ActionError::new("cannot spawn actors outside an actor system"))
    }

    fn release(&mut self, _: &ActorRef) {}

    fn owns(&self, _: &ActorRef) -> bool {
        false
    }

    fn child(&self, _: &str) -> Option<ActorRef> {
        None
    }

    fn children(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Lets an assign action spawn children whose references it stores in
/// the new context.
///
/// # Example
///
/// ```rust
/// use machina::core::Action;
/// use machina::interpreter::SpawnOptions;
/// use serde_json::json;
///
/// let spawn = Action::assign_with_spawn(|context, event, spawner| {
///     let id = event.get("id").and_then(|id| id.as_str()).unwrap_or("toast");
///     let actor = spawner.spawn_with(
///         "Notification",
///         SpawnOptions::new().id(id).input(event.data().clone()),
///     )?;
///     let mut notifications = context.get("notifications").cloned().unwrap_or(json!([]));
///     if let Some(items) = notifications.as_array_mut() {
///         items.push(actor.to_value());
///     }
///     Ok(context.clone().with("notifications", notifications))
/// });
/// # let _ = spawn;
/// ```
pub struct Spawner<'a> {
    pub(crate) machine: &'a Machine,
    pub(crate) scope: &'a mut dyn ActorScope,
    pub(crate) effects: &'a mut Vec<Effect>,
}

impl Spawner<'_> {
    /// Spawn actor logic registered on the machine under `src`.
    pub fn spawn(&mut self, src: &str) -> Result<ActorRef, ActionError> {
        self.spawn_with(src, SpawnOptions::default())
    }

    pub fn spawn_with(&mut self, src: &str, options: SpawnOptions) -> Result<ActorRef, ActionError> {
        let logic = self
            .machine
            .actor_logic(src)
            .ok_or_else(|| ActionError::UnknownActor(src.to_string()))?;
        let actor = self.scope.spawn(logic, options)?;
        self.effects.push(Effect::Start(actor.clone()));
        Ok(actor)
    }

    /// Live child with the given id.
    pub fn child(&self, id: &str) -> Option<ActorRef> {
        self.scope.child(id)
    }

    /// The actor running this action.
    pub fn self_ref(&self) -> Option<ActorRef> {
        self.scope.self_ref().cloned()
    }
}
