//! Guard predicates for controlling transitions.
//!
//! Guards are pure boolean functions over the current context and the event
//! being processed. They decide whether a candidate transition is taken.

use super::context::Context;
use super::event::Event;
use crate::error::ActionError;
use std::fmt;
use std::sync::Arc;

type Predicate = dyn Fn(&Context, &Event) -> Result<bool, ActionError> + Send + Sync;

/// Pure predicate that determines if a transition can be taken.
///
/// A failing guard (one that returns `Err`) is a programming error. It is
/// not treated as `false`: the step aborts and the machine enters the
/// error status.
///
/// # Example
///
/// ```rust
/// use machina::core::{Context, Event, Guard};
///
/// let has_timeout = Guard::new(|context: &Context, _: &Event| {
///     context.get("timeout").is_some_and(|t| t.is_number())
/// });
///
/// let event = Event::new("machina.init");
/// assert!(has_timeout.check(&Context::new().with("timeout", 5000), &event).unwrap());
/// assert!(!has_timeout.check(&Context::new(), &event).unwrap());
/// ```
#[derive(Clone)]
pub struct Guard {
    label: String,
    predicate: Arc<Predicate>,
}

impl Guard {
    /// Create a guard from an infallible predicate.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        Guard {
            label: "inline".to_string(),
            predicate: Arc::new(move |context, event| Ok(predicate(context, event))),
        }
    }

    /// Create a guard whose evaluation can fail.
    pub fn fallible<F>(predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> Result<bool, ActionError> + Send + Sync + 'static,
    {
        Guard {
            label: "inline".to_string(),
            predicate: Arc::new(predicate),
        }
    }

    /// Guard that passes when `guard` does not.
    pub fn not(guard: Guard) -> Self {
        let label = format!("not({})", guard.label);
        Guard {
            label,
            predicate: Arc::new(move |context, event| Ok(!guard.check(context, event)?)),
        }
    }

    /// Guard that passes when every guard passes. Evaluation stops at the
    /// first one that does not.
    pub fn and(guards: Vec<Guard>) -> Self {
        let label = format!("and({})", join_labels(&guards));
        Guard {
            label,
            predicate: Arc::new(move |context, event| {
                for guard in &guards {
                    if !guard.check(context, event)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }),
        }
    }

    /// Guard that passes when any guard passes. Evaluation stops at the
    /// first one that does.
    pub fn or(guards: Vec<Guard>) -> Self {
        let label = format!("or({})", join_labels(&guards));
        Guard {
            label,
            predicate: Arc::new(move |context, event| {
                for guard in &guards {
                    if guard.check(context, event)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }),
        }
    }

    /// Evaluate the guard.
    pub fn check(&self, context: &Context, event: &Event) -> Result<bool, ActionError> {
        (self.predicate)(context, event).map_err(|err| err.in_guard(&self.label))
    }

    /// Name the guard was registered under, or a description of how it
    /// was composed.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("label", &self.label).finish()
    }
}

fn join_labels(guards: &[Guard]) -> String {
    guards
        .iter()
        .map(Guard::label)
        .collect::<Vec<_>>()
        .join(", ")
}
