//! The statechart interpreter.
//!
//! Given a [`Machine`](crate::core::Machine) and an event, the interpreter
//! selects the enabled transitions, exits and enters states, runs actions
//! and repeats for eventless transitions and raised events until the
//! instance settles. Everything that reaches outside the instance (timers,
//! messages, child actors) is returned as effects for the
//! [actor system](crate::actor) to apply.

mod algorithm;
mod configuration;
mod effects;
mod macrostep;

pub use effects::{SpawnOptions, Spawner};

pub(crate) use effects::{ActorScope, Effect};
pub(crate) use macrostep::{Interpreter, Limits, Step, Trace};
