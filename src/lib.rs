//! Machina: hierarchical statecharts with run-to-completion actors
//!
//! Machina interprets statechart definitions: nested compound states,
//! parallel regions, final states, history, eventless and delayed
//! transitions, guards and entry/exit actions. Running instances are
//! actors owned by an [`ActorSystem`], which routes events between
//! parents and the children they spawn or invoke, fires timers on a
//! virtual clock and publishes an immutable [`Snapshot`] after every
//! macrostep.
//!
//! # Core Concepts
//!
//! - **Definition**: an immutable [`Machine`] built and validated by
//!   [`MachineBuilder`]
//! - **Interpreter**: a pure step function that processes one event to
//!   completion and describes its side effects instead of performing them
//! - **Actors**: supervised instances; stopping a parent stops its subtree
//! - **Snapshots**: what hosts read and subscribe to
//!
//! # Example
//!
//! ```rust
//! use machina::{Action, ActorOptions, ActorSystem, MachineBuilder, StateBuilder, TransitionBuilder};
//! use serde_json::json;
//!
//! let machine = MachineBuilder::new("counter")
//!     .context(json!({ "count": 0 }))
//!     .initial("Active")
//!     .state(
//!         StateBuilder::new("Active")
//!             .on(
//!                 "increment",
//!                 TransitionBuilder::new().action(Action::assign_field("count", |context, _| {
//!                     json!(context.get_i64("count").unwrap_or(0) + 1)
//!                 })),
//!             )
//!             .on("stop", "Stopped"),
//!     )
//!     .state(StateBuilder::final_state("Stopped"))
//!     .build()
//!     .unwrap();
//!
//! let system = ActorSystem::new();
//! let counter = system.create_actor(machine, ActorOptions::new()).unwrap();
//! counter.start().unwrap();
//! counter.send("increment").unwrap();
//! counter.send("increment").unwrap();
//!
//! let snapshot = counter.snapshot().unwrap();
//! assert!(snapshot.matches("Active"));
//! assert_eq!(snapshot.context().get_i64("count"), Some(2));
//! ```

pub mod actor;
pub mod builder;
pub mod config;
pub mod core;
pub mod error;
pub mod interpreter;
pub mod logging;
pub mod snapshot;

// Re-export commonly used types
pub use actor::{ActorHandle, ActorLogic, ActorRef, ActorSystem, Process, Subscription};
pub use builder::{InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
pub use config::{ActorOptions, SystemConfig};
pub use core::{Action, Context, Event, Guard, HistoryKind, Machine};
pub use error::{ActionError, ActorError, BuildError, Error};
pub use logging::init_tracing;
pub use snapshot::{Snapshot, Status};
