//! Resolved actions.
//!
//! Every action a machine can run is a variant of [`Action`]. Named actions
//! referenced from a definition are resolved into these variants when the
//! machine is built, so the interpreter never looks anything up by name
//! while stepping.

use super::context::Context;
use super::event::Event;
use super::state::ValueFn;
use crate::actor::ActorRef;
use crate::error::ActionError;
use crate::interpreter::Spawner;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub type AssignFn =
    Arc<dyn Fn(&Context, &Event, &mut Spawner<'_>) -> Result<Context, ActionError> + Send + Sync>;
pub type EventFn = Arc<dyn Fn(&Context, &Event) -> Result<Event, ActionError> + Send + Sync>;
pub type CustomFn = Arc<dyn Fn(&Context, &Event, &Value) -> Result<(), ActionError> + Send + Sync>;
pub type TargetFn =
    Arc<dyn Fn(&Context, &Event) -> Result<Option<ActorRef>, ActionError> + Send + Sync>;
pub type EnqueueFn =
    Arc<dyn Fn(&Context, &Event, &mut ActionQueue<'_>) -> Result<(), ActionError> + Send + Sync>;
pub type LogFn = Arc<dyn Fn(&Context, &Event) -> String + Send + Sync>;

/// Addressee of a `send_to` or `stop` action.
#[derive(Clone)]
pub enum Recipient {
    /// Child of the running actor, looked up by id.
    Child(String),
    /// A fixed reference.
    Ref(ActorRef),
    /// Reference computed from context and event; `None` makes the action
    /// a no-op.
    Dynamic(TargetFn),
}

impl fmt::Debug for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Child(id) => f.debug_tuple("Child").field(id).finish(),
            Self::Ref(actor) => f.debug_tuple("Ref").field(actor).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

/// An executable action.
#[derive(Clone)]
pub enum Action {
    /// Replace the context with the result of a pure function.
    Assign { label: String, assign: AssignFn },
    /// Put an event on the running actor's internal queue, or schedule it
    /// for later when a delay is set.
    Raise {
        event: EventFn,
        delay: Option<Duration>,
        id: Option<String>,
    },
    /// Send an event to another actor.
    SendTo {
        to: Recipient,
        event: EventFn,
        delay: Option<Duration>,
        id: Option<String>,
    },
    /// Send an event to the actor that spawned this one.
    SendParent { event: EventFn },
    /// Stop a child actor.
    Stop { target: Recipient },
    /// Cancel a delayed raise or send by id.
    Cancel { id: String },
    /// Emit a log line.
    Log { message: LogFn },
    /// Opaque user callback.
    Custom {
        name: String,
        run: CustomFn,
        params: Option<ValueFn>,
    },
    /// Decide at run time which actions to run.
    Enqueue(EnqueueFn),
}

impl Action {
    /// Replace the context.
    ///
    /// ```rust
    /// use machina::core::Action;
    ///
    /// let reset = Action::assign(|context, _event| Ok(context.clone().with("counter", 0)));
    /// assert_eq!(reset.label(), "assign");
    /// ```
    pub fn assign<F>(assign: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Context, ActionError> + Send + Sync + 'static,
    {
        Self::Assign {
            label: "assign".to_string(),
            assign: Arc::new(move |context, event, _| assign(context, event)),
        }
    }

    /// Replace the context with access to a [`Spawner`] for starting child
    /// actors whose references end up in the new context.
    pub fn assign_with_spawn<F>(assign: F) -> Self
    where
        F: Fn(&Context, &Event, &mut Spawner<'_>) -> Result<Context, ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self::Assign {
            label: "assign".to_string(),
            assign: Arc::new(assign),
        }
    }

    /// Compute one field from context and event.
    pub fn assign_field<F>(field: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&Context, &Event) -> Value + Send + Sync + 'static,
    {
        let field = field.into();
        Self::Assign {
            label: format!("assign({field})"),
            assign: Arc::new(move |context, event, _| {
                Ok(context.clone().with(field.clone(), compute(context, event)))
            }),
        }
    }

    /// Set one field to a constant.
    pub fn set(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::assign_field(field, move |_, _| value.clone())
    }

    pub fn raise(event: impl Into<Event>) -> Self {
        let event = event.into();
        Self::Raise {
            event: Arc::new(move |_, _| Ok(event.clone())),
            delay: None,
            id: None,
        }
    }

    pub fn raise_with<F>(event: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Event, ActionError> + Send + Sync + 'static,
    {
        Self::Raise {
            event: Arc::new(event),
            delay: None,
            id: None,
        }
    }

    pub fn send_to_child(id: impl Into<String>, event: impl Into<Event>) -> Self {
        let event = event.into();
        Self::SendTo {
            to: Recipient::Child(id.into()),
            event: Arc::new(move |_, _| Ok(event.clone())),
            delay: None,
            id: None,
        }
    }

    /// Send to an actor computed from context and event, typically a
    /// reference stored in context by a spawning assign.
    pub fn send_to<T, E>(target: T, event: E) -> Self
    where
        T: Fn(&Context, &Event) -> Option<ActorRef> + Send + Sync + 'static,
        E: Fn(&Context, &Event) -> Result<Event, ActionError> + Send + Sync + 'static,
    {
        Self::SendTo {
            to: Recipient::Dynamic(Arc::new(move |context, event| Ok(target(context, event)))),
            event: Arc::new(event),
            delay: None,
            id: None,
        }
    }

    pub fn send_parent(event: impl Into<Event>) -> Self {
        let event = event.into();
        Self::SendParent {
            event: Arc::new(move |_, _| Ok(event.clone())),
        }
    }

    pub fn send_parent_with<F>(event: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<Event, ActionError> + Send + Sync + 'static,
    {
        Self::SendParent {
            event: Arc::new(event),
        }
    }

    /// Stop the child registered under `id`. Fails the step when there is
    /// no such child, e.g. because it was already stopped.
    pub fn stop_child(id: impl Into<String>) -> Self {
        Self::Stop {
            target: Recipient::Child(id.into()),
        }
    }

    /// Stop an actor computed from context and event. `None` is a no-op; an
    /// actor that is not a live child of this one fails the step.
    pub fn stop<T>(target: T) -> Self
    where
        T: Fn(&Context, &Event) -> Option<ActorRef> + Send + Sync + 'static,
    {
        Self::Stop {
            target: Recipient::Dynamic(Arc::new(move |context, event| Ok(target(context, event)))),
        }
    }

    pub fn cancel(id: impl Into<String>) -> Self {
        Self::Cancel { id: id.into() }
    }

    pub fn log<F>(message: F) -> Self
    where
        F: Fn(&Context, &Event) -> String + Send + Sync + 'static,
    {
        Self::Log {
            message: Arc::new(message),
        }
    }

    /// Opaque side effect. `params` is `Value::Null` unless parameters were
    /// attached where the action is referenced.
    pub fn custom<F>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(&Context, &Event, &Value) -> Result<(), ActionError> + Send + Sync + 'static,
    {
        Self::Custom {
            name: name.into(),
            run: Arc::new(run),
            params: None,
        }
    }

    pub fn enqueue<F>(enqueue: F) -> Self
    where
        F: Fn(&Context, &Event, &mut ActionQueue<'_>) -> Result<(), ActionError>
            + Send
            + Sync
            + 'static,
    {
        Self::Enqueue(Arc::new(enqueue))
    }

    /// Delay a raise or send. Other actions are returned unchanged.
    pub fn delayed(self, delay: Duration) -> Self {
        match self {
            Self::Raise { event, id, .. } => Self::Raise {
                event,
                delay: Some(delay),
                id,
            },
            Self::SendTo { to, event, id, .. } => Self::SendTo {
                to,
                event,
                delay: Some(delay),
                id,
            },
            other => other,
        }
    }

    /// Give a raise or send an id that [`Action::cancel`] can refer to.
    pub fn with_id(self, id: impl Into<String>) -> Self {
        match self {
            Self::Raise { event, delay, .. } => Self::Raise {
                event,
                delay,
                id: Some(id.into()),
            },
            Self::SendTo { to, event, delay, .. } => Self::SendTo {
                to,
                event,
                delay,
                id: Some(id.into()),
            },
            other => other,
        }
    }

    /// Short description used in logs and inspection records.
    pub fn label(&self) -> &str {
        match self {
            Self::Assign { label, .. } => label,
            Self::Raise { .. } => "raise",
            Self::SendTo { .. } => "sendTo",
            Self::SendParent { .. } => "sendParent",
            Self::Stop { .. } => "stop",
            Self::Cancel { .. } => "cancel",
            Self::Log { .. } => "log",
            Self::Custom { name, .. } => name,
            Self::Enqueue(_) => "enqueue",
        }
    }

    pub(crate) fn relabel(self, name: &str) -> Self {
        match self {
            Self::Assign { assign, .. } => Self::Assign {
                label: name.to_string(),
                assign,
            },
            Self::Custom { run, params, .. } => Self::Custom {
                name: name.to_string(),
                run,
                params,
            },
            other => other,
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.label()).finish()
    }
}

/// Collects the actions an [`Action::enqueue`] callback decides to run.
///
/// Queued actions run right after the callback returns, in the order they
/// were queued, as if they had been listed in the definition.
pub struct ActionQueue<'m> {
    registry: &'m HashMap<String, Action>,
    actions: Vec<Action>,
}

impl<'m> ActionQueue<'m> {
    pub(crate) fn new(registry: &'m HashMap<String, Action>) -> Self {
        Self {
            registry,
            actions: Vec::new(),
        }
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Queue an action registered on the machine by name.
    pub fn named(&mut self, name: &str) -> Result<(), ActionError> {
        let action = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;
        self.actions.push(action);
        Ok(())
    }

    /// Queue a registered custom action with fixed parameters.
    pub fn named_with_params(&mut self, name: &str, params: Value) -> Result<(), ActionError> {
        let action = match self.registry.get(name) {
            Some(Action::Custom { name, run, .. }) => Action::Custom {
                name: name.clone(),
                run: run.clone(),
                params: Some(Arc::new(move |_, _| Ok(params.clone()))),
            },
            Some(other) => other.clone(),
            None => return Err(ActionError::UnknownAction(name.to_string())),
        };
        self.actions.push(action);
        Ok(())
    }

    pub fn assign<F>(&mut self, assign: F)
    where
        F: Fn(&Context, &Event) -> Result<Context, ActionError> + Send + Sync + 'static,
    {
        self.actions.push(Action::assign(assign));
    }

    pub fn raise(&mut self, event: impl Into<Event>) {
        self.actions.push(Action::raise(event));
    }

    pub fn send_to(&mut self, actor: ActorRef, event: impl Into<Event>) {
        let event = event.into();
        self.actions.push(Action::SendTo {
            to: Recipient::Ref(actor),
            event: Arc::new(move |_, _| Ok(event.clone())),
            delay: None,
            id: None,
        });
    }

    pub fn send_parent(&mut self, event: impl Into<Event>) {
        self.actions.push(Action::send_parent(event));
    }

    pub fn stop(&mut self, actor: ActorRef) {
        self.actions.push(Action::Stop {
            target: Recipient::Ref(actor),
        });
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub(crate) fn into_actions(self) -> Vec<Action> {
        self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_describe_actions() {
        assert_eq!(Action::set("counter", 0).label(), "assign(counter)");
        assert_eq!(Action::raise("animate").label(), "raise");
        assert_eq!(
            Action::custom("Play the video", |_, _, _| Ok(())).label(),
            "Play the video"
        );
        assert_eq!(
            Action::set("counter", 0).relabel("Reset counter").label(),
            "Reset counter"
        );
    }

    #[test]
    fn delayed_applies_to_raise_and_send_only() {
        let raise = Action::raise("tick")
            .delayed(Duration::from_millis(50))
            .with_id("ticker");
        match raise {
            Action::Raise { delay, id, .. } => {
                assert_eq!(delay, Some(Duration::from_millis(50)));
                assert_eq!(id.as_deref(), Some("ticker"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let cancel = Action::cancel("ticker").delayed(Duration::from_millis(50));
        assert!(matches!(cancel, Action::Cancel { .. }));
    }

    #[test]
    fn queue_resolves_registered_actions() {
        let mut registry = HashMap::new();
        registry.insert(
            "Set video volume".to_string(),
            Action::custom("Set video volume", |_, _, _| Ok(())),
        );

        let mut queue = ActionQueue::new(&registry);
        queue.named_with_params("Set video volume", json!({ "volume": 0.3 })).unwrap();
        queue.raise("animate");
        assert_eq!(queue.len(), 2);

        let err = queue.named("Unknown").unwrap_err();
        assert_eq!(err, ActionError::UnknownAction("Unknown".into()));

        let actions = queue.into_actions();
        match &actions[0] {
            Action::Custom { params: Some(params), .. } => {
                let value = params(&Context::new(), &Event::new("volume.set")).unwrap();
                assert_eq!(value, json!({ "volume": 0.3 }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
