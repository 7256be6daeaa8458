//! Actors: running machine instances and the children they spawn.
//!
//! An [`ActorSystem`] owns a tree of actors. Root actors are created by
//! the host; children are spawned or invoked by machines and supervised
//! by their parent: when a parent stops, its whole subtree stops first.

mod handle;
pub mod inspect;
mod logic;
mod reference;
mod scheduler;
mod system;

pub use handle::{ActorHandle, Sender, Subscription};
pub use inspect::{Inspection, InspectionEvent, Inspector, TransitionRecord};
pub use logic::{ActorLogic, CallbackFn, Process, PromiseFn};
pub use reference::ActorRef;
pub use system::ActorSystem;

pub use crate::config::ActorOptions;
