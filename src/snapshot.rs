//! Immutable views of an actor, published after every macrostep.

use crate::core::{Context, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of an actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    NotStarted,
    Active,
    /// Reached a top-level final state.
    Done,
    /// A guard or action failed; no further events are processed.
    Error,
    Stopped,
}

impl Status {
    /// Whether the actor will never process another event.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Stopped)
    }
}

/// The state of one machine actor at a settled point in time.
///
/// # Example
///
/// ```rust
/// use machina::actor::{ActorOptions, ActorSystem};
/// use machina::builder::{MachineBuilder, StateBuilder};
/// use machina::snapshot::Status;
///
/// let machine = MachineBuilder::new("toggle")
///     .initial("Off")
///     .state(StateBuilder::new("Off").on("toggle", "On"))
///     .state(StateBuilder::new("On").tag("lit").on("toggle", "Off"))
///     .build()
///     .unwrap();
///
/// let system = ActorSystem::new();
/// let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
/// actor.start().unwrap();
/// actor.send("toggle").unwrap();
///
/// let snapshot = actor.snapshot().unwrap();
/// assert_eq!(snapshot.status(), Status::Active);
/// assert!(snapshot.matches("On"));
/// assert!(snapshot.has_tag("lit"));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub(crate) status: Status,
    pub(crate) value: Value,
    pub(crate) configuration: Vec<String>,
    #[serde(skip)]
    pub(crate) paths: Vec<String>,
    pub(crate) context: Context,
    pub(crate) tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) event: Option<Event>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
    pub(crate) children: Vec<String>,
}

impl Snapshot {
    pub fn status(&self) -> Status {
        self.status
    }

    /// Nested state value, e.g. `{"Active": "Idle"}`.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Ids of the active states in document order.
    pub fn configuration(&self) -> &[String] {
        &self.configuration
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Whether the state at `path` (`Active.Idle`) is active.
    pub fn matches(&self, path: &str) -> bool {
        self.paths.iter().any(|active| active == path)
    }

    /// Last event processed.
    pub fn event(&self) -> Option<&Event> {
        self.event.as_ref()
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Ids of the actor's registered children, in spawn order.
    pub fn children(&self) -> &[String] {
        &self.children
    }
}
