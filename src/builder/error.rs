//! Build errors for machine definitions.

use thiserror::Error;

/// One problem found while validating a definition.
///
/// `state` fields hold the state's id (`machine.Path.To.State`).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DefinitionError {
    #[error("compound state '{state}' has no initial state. Call .initial(key)")]
    MissingInitialState { state: String },

    #[error("initial state '{initial}' of '{state}' is not one of its children")]
    UnknownInitialState { state: String, initial: String },

    #[error("transition in '{state}' targets '{target}', which does not exist")]
    DanglingTarget { state: String, target: String },

    #[error("guard '{guard}' used in '{state}' is not registered")]
    UnknownGuard { state: String, guard: String },

    #[error("action '{action}' used in '{state}' is not registered")]
    UnknownAction { state: String, action: String },

    #[error("actor logic '{src}' invoked in '{state}' is not registered")]
    UnknownActor { state: String, src: String },

    #[error("delay '{delay}' used in '{state}' is not registered")]
    UnknownDelay { state: String, delay: String },

    #[error("state id '{id}' is used more than once")]
    DuplicateStateId { id: String },

    #[error("'{state}' has more than one child with key '{key}'")]
    DuplicateStateKey { state: String, key: String },

    #[error("invalid state key '{key}': {reason}")]
    InvalidStateKey { key: String, reason: String },

    #[error("invalid event descriptor in '{state}': {reason}")]
    InvalidEventPattern { state: String, reason: String },

    #[error("final state '{state}' cannot have child states")]
    FinalStateWithChildren { state: String },

    #[error("final state '{state}' cannot have transitions or invocations")]
    FinalStateWithTransitions { state: String },

    #[error("invalid history state '{state}': {reason}")]
    InvalidHistory { state: String, reason: String },

    #[error("built-in action '{action}' used in '{state}' does not take parameters")]
    ParamsOnBuiltinAction { state: String, action: String },

    #[error("context must be a JSON object, got {found}")]
    ContextNotObject { found: String },

    #[error("parallel state '{state}' has no regions")]
    EmptyParallel { state: String },
}

/// Errors returned by [`MachineBuilder::build`](super::MachineBuilder::build).
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BuildError {
    /// Every problem found in the definition, in document order.
    #[error("machine '{machine}' is invalid: {}", describe(.errors))]
    Invalid {
        machine: String,
        errors: Vec<DefinitionError>,
    },
}

impl BuildError {
    pub fn errors(&self) -> &[DefinitionError] {
        match self {
            Self::Invalid { errors, .. } => errors,
        }
    }
}

fn describe(errors: &[DefinitionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
