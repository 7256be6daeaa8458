//! Builder API for machine definitions.
//!
//! Machines are described with fluent builders: [`MachineBuilder`] for the
//! machine and its registries, [`StateBuilder`] for each state,
//! [`TransitionBuilder`] for transitions and [`InvokeBuilder`] for invoked
//! actors. `MachineBuilder::build` validates the whole tree and resolves
//! every target and name, so a typo fails at construction rather than
//! silently doing nothing at run time.

mod compile;
pub mod error;
pub mod machine;
pub mod spec;
pub mod state;
pub mod transition;

pub use error::{BuildError, DefinitionError};
pub use machine::MachineBuilder;
pub use spec::{ActionSpec, DelaySpec, GuardSpec};
pub use state::{InvokeBuilder, StateBuilder};
pub use transition::TransitionBuilder;
