//! What a child actor runs: a nested machine, a callback process or a
//! promise.

use super::handle::Sender;
use crate::core::{Event, Machine};
use crate::error::ActionError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use stillwater::effect::BoxedEffect;

/// Starts a callback actor from its input. The [`Sender`] delivers events
/// to the actor's parent.
pub type CallbackFn = Arc<dyn Fn(&Value, Sender) -> Result<Process, ActionError> + Send + Sync>;

/// Creates a fresh effect for each promise actor started. The effect runs
/// when the system is settled with [`ActorSystem::settle`](super::ActorSystem::settle).
pub type PromiseFn = Arc<dyn Fn(&Value) -> BoxedEffect<Value, ActionError, ()> + Send + Sync>;

/// Logic an actor runs, registered on a machine under a source name.
#[derive(Clone)]
pub enum ActorLogic {
    Machine(Arc<Machine>),
    Callback(CallbackFn),
    Promise(PromiseFn),
}

impl ActorLogic {
    pub fn machine(machine: impl Into<Arc<Machine>>) -> Self {
        Self::Machine(machine.into())
    }

    /// A process started with the actor's input.
    ///
    /// ```rust
    /// use machina::actor::{ActorLogic, Process};
    ///
    /// let focus = ActorLogic::callback(|_input, sender| {
    ///     sender.send("window.focus");
    ///     Ok(Process::new().with_cleanup(|| println!("listener removed")))
    /// });
    /// assert_eq!(focus.kind(), "callback");
    /// ```
    pub fn callback<F>(start: F) -> Self
    where
        F: Fn(&Value, Sender) -> Result<Process, ActionError> + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(start))
    }

    /// An effect whose success is reported to the parent as
    /// `done.actor.<id>` and whose failure as `error.actor.<id>`.
    pub fn promise<F>(run: F) -> Self
    where
        F: Fn(&Value) -> BoxedEffect<Value, ActionError, ()> + Send + Sync + 'static,
    {
        Self::Promise(Arc::new(run))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Machine(_) => "machine",
            Self::Callback(_) => "callback",
            Self::Promise(_) => "promise",
        }
    }
}

impl fmt::Debug for ActorLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine(machine) => f.debug_tuple("Machine").field(&machine.id()).finish(),
            Self::Callback(_) => f.write_str("Callback"),
            Self::Promise(_) => f.write_str("Promise"),
        }
    }
}

/// A running callback actor: what it does with events sent to it and how
/// it is torn down.
#[derive(Default)]
pub struct Process {
    receive: Option<Box<dyn FnMut(&Event)>>,
    cleanup: Option<Box<dyn FnOnce()>>,
}

impl Process {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle events sent to the actor with `send_to`.
    pub fn on_event<F>(mut self, receive: F) -> Self
    where
        F: FnMut(&Event) + 'static,
    {
        self.receive = Some(Box::new(receive));
        self
    }

    /// Run when the actor stops. Runs at most once.
    pub fn with_cleanup<F>(mut self, cleanup: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        self.cleanup = Some(Box::new(cleanup));
        self
    }

    pub(crate) fn deliver(&mut self, event: &Event) -> bool {
        match self.receive.as_mut() {
            Some(receive) => {
                receive(event);
                true
            }
            None => false,
        }
    }

    pub(crate) fn cleanup(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process")
            .field("receives", &self.receive.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .finish()
    }
}
