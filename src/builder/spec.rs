//! Unresolved references used while a machine is being defined.
//!
//! Definitions may name actions, guards and delays that are registered on
//! the [`MachineBuilder`](super::MachineBuilder) later. These types hold
//! such references until `build()` resolves them.

use crate::core::{Action, Context, Event, Guard};
use serde_json::Value;
use std::time::Duration;

/// An action reference: a registered name, optionally with parameters, or
/// an inline action.
#[derive(Clone, Debug)]
pub enum ActionSpec {
    Named { name: String, params: Option<Value> },
    Inline(Action),
}

impl ActionSpec {
    /// Reference a registered custom action with parameters.
    ///
    /// ```rust
    /// use machina::builder::ActionSpec;
    /// use serde_json::json;
    ///
    /// let spec = ActionSpec::with_params("Set video volume", json!({ "volume": 0.5 }));
    /// assert!(matches!(spec, ActionSpec::Named { params: Some(_), .. }));
    /// ```
    pub fn with_params(name: impl Into<String>, params: Value) -> Self {
        Self::Named {
            name: name.into(),
            params: Some(params),
        }
    }
}

impl From<&str> for ActionSpec {
    fn from(name: &str) -> Self {
        Self::Named {
            name: name.to_string(),
            params: None,
        }
    }
}

impl From<String> for ActionSpec {
    fn from(name: String) -> Self {
        Self::Named { name, params: None }
    }
}

impl From<Action> for ActionSpec {
    fn from(action: Action) -> Self {
        Self::Inline(action)
    }
}

/// A guard reference, possibly composed.
#[derive(Clone, Debug)]
pub enum GuardSpec {
    Named(String),
    Inline(Guard),
    Not(Box<GuardSpec>),
    And(Vec<GuardSpec>),
    Or(Vec<GuardSpec>),
}

impl GuardSpec {
    pub fn inline<F>(predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        Self::Inline(Guard::new(predicate))
    }

    pub fn not(guard: impl Into<GuardSpec>) -> Self {
        Self::Not(Box::new(guard.into()))
    }

    pub fn and<I, G>(guards: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GuardSpec>,
    {
        Self::And(guards.into_iter().map(Into::into).collect())
    }

    pub fn or<I, G>(guards: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GuardSpec>,
    {
        Self::Or(guards.into_iter().map(Into::into).collect())
    }
}

impl From<&str> for GuardSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for GuardSpec {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Guard> for GuardSpec {
    fn from(guard: Guard) -> Self {
        Self::Inline(guard)
    }
}

/// Delay of an `after` transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DelaySpec {
    Fixed(Duration),
    Named(String),
}

impl From<u64> for DelaySpec {
    fn from(millis: u64) -> Self {
        Self::Fixed(Duration::from_millis(millis))
    }
}

impl From<Duration> for DelaySpec {
    fn from(duration: Duration) -> Self {
        Self::Fixed(duration)
    }
}

impl From<&str> for DelaySpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for DelaySpec {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}
