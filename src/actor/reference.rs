//! Opaque, comparison-only references to actors.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use uuid::Uuid;

const REF_FIELD: &str = "$actor";

/// Slot in the system's actor arena. The generation changes every time a
/// slot is reused, so a reference to a stopped actor never resolves to
/// its successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct ActorKey {
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

/// Non-owning handle to an actor.
///
/// References can be stored in context (see
/// [`Context::with_actor`](crate::core::Context::with_actor)) and used as
/// the recipient of `send_to` and `stop` actions. The system that created
/// the actor keeps ownership; a reference to a stopped actor simply stops
/// resolving.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    key: ActorKey,
    id: String,
    system: Uuid,
}

impl ActorRef {
    pub(crate) fn new(key: ActorKey, id: impl Into<String>, system: Uuid) -> Self {
        Self {
            key,
            id: id.into(),
            system,
        }
    }

    /// Id of the actor, unique among its siblings.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn key(&self) -> ActorKey {
        self.key
    }

    pub(crate) fn system(&self) -> Uuid {
        self.system
    }

    /// JSON form stored in context.
    pub fn to_value(&self) -> Value {
        json!({
            REF_FIELD: {
                "system": self.system.to_string(),
                "index": self.key.index,
                "generation": self.key.generation,
                "id": self.id,
            }
        })
    }

    /// Read a reference written by [`ActorRef::to_value`]. Anything else
    /// yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let inner = value.get(REF_FIELD)?;
        let system = inner.get("system")?.as_str()?.parse::<Uuid>().ok()?;
        let index = usize::try_from(inner.get("index")?.as_u64()?).ok()?;
        let generation = inner.get("generation")?.as_u64()?;
        let id = inner.get("id")?.as_str()?;
        Some(Self::new(ActorKey { index, generation }, id, system))
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> ActorRef {
        ActorRef::new(
            ActorKey {
                index: 3,
                generation: 2,
            },
            "notification-1",
            Uuid::new_v4(),
        )
    }

    #[test]
    fn value_form_reads_back() {
        let actor = reference();
        let value = actor.to_value();
        assert_eq!(value["$actor"]["id"], json!("notification-1"));
        assert_eq!(ActorRef::from_value(&value), Some(actor));
    }

    #[test]
    fn other_values_are_not_references() {
        assert_eq!(ActorRef::from_value(&json!("notification-1")), None);
        assert_eq!(ActorRef::from_value(&json!({ "$actor": { "id": "x" } })), None);
        assert_eq!(
            ActorRef::from_value(&json!({
                "$actor": { "system": "not-a-uuid", "index": 0, "generation": 0, "id": "x" }
            })),
            None
        );
    }

    #[test]
    fn generations_distinguish_reused_slots() {
        let system = Uuid::new_v4();
        let first = ActorRef::new(ActorKey { index: 0, generation: 0 }, "child", system);
        let second = ActorRef::new(ActorKey { index: 0, generation: 1 }, "child", system);
        assert_ne!(first, second);
    }
}
