//! Builder for transitions.

use crate::builder::spec::{ActionSpec, GuardSpec};
use crate::core::{Context, Event, Guard};

/// Builder for one candidate transition.
///
/// A transition with no targets only runs its actions, unless
/// [`reenter`](Self::reenter) is set, in which case the source state is
/// exited and entered again.
///
/// # Example
///
/// ```rust
/// use machina::builder::TransitionBuilder;
/// use machina::core::Action;
///
/// let restart = TransitionBuilder::to("Debouncing").reenter(true);
/// let bump = TransitionBuilder::new().action(Action::set("counter", 1));
/// # let _ = (restart, bump);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TransitionBuilder {
    pub(crate) targets: Vec<String>,
    pub(crate) guard: Option<GuardSpec>,
    pub(crate) actions: Vec<ActionSpec>,
    pub(crate) reenter: bool,
    pub(crate) description: Option<String>,
}

impl TransitionBuilder {
    /// Targetless transition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to one target: `Sibling`, `Sibling.Child`, `.Child` or
    /// `#id`.
    pub fn to(target: impl Into<String>) -> Self {
        Self::new().target(target)
    }

    /// Transition to several targets at once, one per parallel region.
    pub fn targets<I, T>(targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            targets: targets.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Add a target.
    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Guard the transition with a registered name, an inline guard or a
    /// composition of both.
    pub fn guard(mut self, guard: impl Into<GuardSpec>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Guard the transition with a closure.
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context, &Event) -> bool + Send + Sync + 'static,
    {
        self.guard = Some(GuardSpec::Inline(Guard::new(predicate)));
        self
    }

    pub fn action(mut self, action: impl Into<ActionSpec>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn actions<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionSpec>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn reenter(mut self, reenter: bool) -> Self {
        self.reenter = reenter;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl From<&str> for TransitionBuilder {
    fn from(target: &str) -> Self {
        Self::to(target)
    }
}

impl From<String> for TransitionBuilder {
    fn from(target: String) -> Self {
        Self::to(target)
    }
}
