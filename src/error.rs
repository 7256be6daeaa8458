//! Error types for the interpreter and actor system.
//!
//! Each layer owns its error enum; [`Error`] joins them for callers that
//! only want a single type at the boundary.

use thiserror::Error;

pub use crate::builder::error::{BuildError, DefinitionError};

/// Failure raised by user code running inside a step: guards, actions,
/// delay and input functions, or a promise actor's effect.
///
/// These are never caught and retried. A machine whose guard or action
/// fails moves to the error status and stops processing events.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("guard '{guard}' failed: {message}")]
    Guard { guard: String, message: String },

    #[error("action '{action}' failed: {message}")]
    Action { action: String, message: String },

    #[error("context must be a JSON object, got {found}")]
    ContextNotObject { found: String },

    #[error("no actor logic registered under '{0}'")]
    UnknownActor(String),

    #[error("no action registered under '{0}'")]
    UnknownAction(String),

    #[error("an actor with id '{0}' is already a child of this actor")]
    DuplicateChild(String),

    #[error("actor '{0}' is not running")]
    NotRunning(String),
}

impl ActionError {
    /// Plain failure with a message, the usual way for user code to fail.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub(crate) fn in_guard(self, guard: &str) -> Self {
        match self {
            Self::Failed(message) => Self::Guard {
                guard: guard.to_string(),
                message,
            },
            other => other,
        }
    }

    pub(crate) fn in_action(self, action: &str) -> Self {
        match self {
            Self::Failed(message) => Self::Action {
                action: action.to_string(),
                message,
            },
            other => other,
        }
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}

impl From<serde_json::Error> for ActionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Errors detected by the interpreter core while computing a step.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InterpreterError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("illegal configuration after microstep: {0}")]
    IllegalConfiguration(String),

    #[error("macrostep exceeded {limit} microsteps; eventless transitions never settle")]
    MicrostepLimit { limit: usize },
}

/// Usage errors from the actor system and its handles.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActorError {
    #[error("actor '{0}' is already stopped")]
    AlreadyStopped(String),

    #[error("actor '{0}' has already been started")]
    AlreadyStarted(String),

    #[error("actor '{0}' does not exist in this system")]
    UnknownActor(String),

    #[error("an actor with id '{0}' already exists")]
    DuplicateId(String),

    #[error("the actor system is busy processing a step; retry after it settles")]
    Busy,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Crate-level error joining every layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("definition error: {0}")]
    Build(#[from] BuildError),

    #[error("interpreter error: {0}")]
    Interpreter(#[from] InterpreterError),

    #[error("actor error: {0}")]
    Actor(#[from] ActorError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
