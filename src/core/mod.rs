//! Core statechart types.
//!
//! This module contains the immutable building blocks a machine is made
//! of:
//! - Events and the patterns transitions match them with
//! - Context, the extended state owned by one instance
//! - Guards and actions, resolved to direct function references
//! - State nodes, transitions and the validated [`Machine`]
//! - History memory
//!
//! Nothing in here performs a side effect on its own. Running a machine is
//! the job of [`crate::interpreter`] and [`crate::actor`].

mod action;
mod context;
mod event;
mod guard;
mod history;
mod machine;
mod state;

pub use action::{
    Action, ActionQueue, AssignFn, CustomFn, EnqueueFn, EventFn, LogFn, Recipient, TargetFn,
};
pub use context::Context;
pub use event::{Event, EventPattern, INIT_EVENT};
pub use guard::Guard;
pub use history::{HistoryKind, HistoryMemory};
pub use machine::{ContextFn, ContextInit, Machine};
pub use state::{
    Delay, DelayFn, DelayedTransition, Invocation, StateId, StateKind, StateNode, Transition,
    TransitionId, Trigger, ValueFn,
};

pub(crate) use event::{after_kind, done_actor_kind, done_state_kind, error_actor_kind};
