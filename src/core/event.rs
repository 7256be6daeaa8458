//! Events and the patterns transitions match them with.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Type of the event a machine is started with.
pub const INIT_EVENT: &str = "machina.init";

const AFTER_PREFIX: &str = "after.";
const DONE_STATE_PREFIX: &str = "done.state.";
const DONE_ACTOR_PREFIX: &str = "done.actor.";
const ERROR_ACTOR_PREFIX: &str = "error.actor.";

/// An event delivered to an actor.
///
/// Events carry a type string and an optional JSON payload. Payload fields
/// are read with [`Event::get`].
///
/// # Example
///
/// ```rust
/// use machina::core::Event;
/// use serde_json::json;
///
/// let event = Event::with_data("input.change", json!({ "searchInput": "rus" }));
/// assert_eq!(event.kind(), "input.change");
/// assert_eq!(event.get("searchInput"), Some(&json!("rus")));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
}

impl Event {
    /// Event without payload.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: Value::Null,
        }
    }

    /// Event with a JSON payload.
    pub fn with_data(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Read a field of an object payload.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Output carried by a `done.*` event.
    pub fn output(&self) -> Option<&Value> {
        self.get("output")
    }

    /// Message carried by an `error.actor.*` event.
    pub fn error(&self) -> Option<&str> {
        self.get("error").and_then(Value::as_str)
    }

    pub(crate) fn init(input: Value) -> Self {
        Self::with_data(INIT_EVENT, input)
    }

    pub(crate) fn done_state(state_id: &str, output: Value) -> Self {
        Self::with_data(
            done_state_kind(state_id),
            serde_json::json!({ "output": output }),
        )
    }

    pub(crate) fn done_actor(actor_id: &str, output: Value) -> Self {
        Self::with_data(
            done_actor_kind(actor_id),
            serde_json::json!({ "output": output }),
        )
    }

    pub(crate) fn error_actor(actor_id: &str, message: &str) -> Self {
        Self::with_data(
            error_actor_kind(actor_id),
            serde_json::json!({ "error": message }),
        )
    }

    /// Whether this is a delayed-transition timer event.
    pub(crate) fn is_timer(&self) -> bool {
        is_timer_kind(&self.kind)
    }
}

impl From<&str> for Event {
    fn from(kind: &str) -> Self {
        Self::new(kind)
    }
}

impl From<String> for Event {
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)
    }
}

pub(crate) fn after_kind(state_id: &str, index: usize) -> String {
    format!("{AFTER_PREFIX}{index}.{state_id}")
}

pub(crate) fn done_state_kind(state_id: &str) -> String {
    format!("{DONE_STATE_PREFIX}{state_id}")
}

pub(crate) fn done_actor_kind(actor_id: &str) -> String {
    format!("{DONE_ACTOR_PREFIX}{actor_id}")
}

pub(crate) fn error_actor_kind(actor_id: &str) -> String {
    format!("{ERROR_ACTOR_PREFIX}{actor_id}")
}

pub(crate) fn is_timer_kind(kind: &str) -> bool {
    kind.starts_with(AFTER_PREFIX)
}

/// Pattern a transition uses to select events.
///
/// Matching order within one state is exact patterns first, then partial
/// wildcards from the longest prefix down, then the full wildcard. Timer
/// events only ever match exact patterns, so a wildcard can never steal
/// another state's delayed transition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventPattern {
    /// `click`
    Exact(String),
    /// `toggle.*`, matches `toggle` and `toggle.click`
    Prefix(String),
    /// `*`
    Any,
}

impl EventPattern {
    /// Parse a descriptor. `*` is only allowed as a whole trailing token.
    pub fn parse(descriptor: &str) -> Result<Self, String> {
        if descriptor.is_empty() {
            return Err("event descriptor is empty".to_string());
        }
        if descriptor == "*" {
            return Ok(Self::Any);
        }
        if let Some(prefix) = descriptor.strip_suffix(".*") {
            if prefix.is_empty() || prefix.contains('*') {
                return Err(format!(
                    "'{descriptor}': wildcard must be a single trailing token"
                ));
            }
            return Ok(Self::Prefix(prefix.to_string()));
        }
        if descriptor.contains('*') {
            return Err(format!(
                "'{descriptor}': wildcard must be a single trailing token"
            ));
        }
        Ok(Self::Exact(descriptor.to_string()))
    }

    pub fn matches(&self, kind: &str) -> bool {
        match self {
            Self::Exact(exact) => exact == kind,
            Self::Prefix(_) | Self::Any if is_timer_kind(kind) => false,
            Self::Prefix(prefix) => {
                kind == prefix
                    || (kind.starts_with(prefix.as_str())
                        && kind[prefix.len()..].starts_with('.'))
            }
            Self::Any => true,
        }
    }

    /// Ranking used to order candidate transitions; higher wins.
    pub(crate) fn specificity(&self) -> (u8, usize) {
        match self {
            Self::Exact(exact) => (2, exact.len()),
            Self::Prefix(prefix) => (1, prefix.len()),
            Self::Any => (0, 0),
        }
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(exact) => f.write_str(exact),
            Self::Prefix(prefix) => write!(f, "{prefix}.*"),
            Self::Any => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_descriptors() {
        assert_eq!(
            EventPattern::parse("click"),
            Ok(EventPattern::Exact("click".into()))
        );
        assert_eq!(
            EventPattern::parse("toggle.*"),
            Ok(EventPattern::Prefix("toggle".into()))
        );
        assert_eq!(EventPattern::parse("*"), Ok(EventPattern::Any));
        assert!(EventPattern::parse("").is_err());
        assert!(EventPattern::parse("tog*").is_err());
        assert!(EventPattern::parse("*.click").is_err());
        assert!(EventPattern::parse(".*").is_err());
    }

    #[test]
    fn partial_wildcard_matches_whole_tokens() {
        let pattern = EventPattern::parse("toggle.*").unwrap();
        assert!(pattern.matches("toggle"));
        assert!(pattern.matches("toggle.click"));
        assert!(pattern.matches("toggle.keyboard.space"));
        assert!(!pattern.matches("toggles"));
        assert!(!pattern.matches("play"));
    }

    #[test]
    fn wildcards_never_match_timer_events() {
        let timer = after_kind("Debouncing", 0);
        assert!(!EventPattern::Any.matches(&timer));
        assert!(!EventPattern::Prefix("after".into()).matches(&timer));
        assert!(EventPattern::Exact(timer.clone()).matches(&timer));
    }

    #[test]
    fn specificity_orders_exact_then_longest_prefix() {
        let exact = EventPattern::parse("time.backward.keyboard").unwrap();
        let long = EventPattern::parse("time.backward.*").unwrap();
        let short = EventPattern::parse("time.*").unwrap();
        assert!(exact.specificity() > long.specificity());
        assert!(long.specificity() > short.specificity());
        assert!(short.specificity() > EventPattern::Any.specificity());
    }

    #[test]
    fn done_events_carry_output() {
        let event = Event::done_actor("fetch", json!(["a", "b"]));
        assert_eq!(event.kind(), "done.actor.fetch");
        assert_eq!(event.output(), Some(&json!(["a", "b"])));

        let event = Event::error_actor("fetch", "offline");
        assert_eq!(event.error(), Some("offline"));
    }

    #[test]
    fn event_serializes_with_type_field() {
        let event = Event::with_data("volume.set", json!({ "volume": 0.5 }));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({ "type": "volume.set", "data": { "volume": 0.5 } }));

        let bare = serde_json::to_value(Event::new("play")).unwrap();
        assert_eq!(bare, json!({ "type": "play" }));
    }
}
