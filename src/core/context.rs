//! Extended state owned by a single machine instance.

use crate::actor::ActorRef;
use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field map holding a machine's extended state.
///
/// A context is only ever replaced by assign actions between microsteps;
/// guards and actions see it read-only. Actor references stored in context
/// are plain identifiers, the actor system keeps ownership of the actors.
///
/// # Example
///
/// ```rust
/// use machina::core::Context;
/// use serde_json::json;
///
/// let context = Context::new().with("counter", 1);
/// assert_eq!(context.get_i64("counter"), Some(1));
///
/// let next = context.clone().with("counter", 2);
/// assert_eq!(context.get_i64("counter"), Some(1));
/// assert_eq!(next.get("counter"), Some(&json!(2)));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context(Map<String, Value>);

impl Context {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Build a context from a JSON object.
    pub fn from_value(value: Value) -> Result<Self, ActionError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(ActionError::ContextNotObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// Return a copy with `field` set.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Store an actor reference under `field`.
    pub fn with_actor(self, field: impl Into<String>, actor: &ActorRef) -> Self {
        self.with(field, actor.to_value())
    }

    /// Read an actor reference stored with [`Context::with_actor`].
    pub fn actor_ref(&self, field: &str) -> Option<ActorRef> {
        self.get(field).and_then(ActorRef::from_value)
    }

    /// Read every actor reference stored in an array field, skipping
    /// entries that are not references.
    pub fn actor_refs(&self, field: &str) -> Vec<ActorRef> {
        self.get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(ActorRef::from_value).collect())
            .unwrap_or_default()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
