//! Inspection records: an observational stream of everything actors do.

use crate::core::Event;
use crate::snapshot::Status;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::rc::Rc;

/// Callback receiving every [`Inspection`] of an actor tree.
pub type Inspector = Rc<dyn Fn(&Inspection)>;

/// One timestamped observation of an actor.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Inspection {
    pub at: DateTime<Utc>,
    /// Id of the actor the record is about.
    pub actor: String,
    pub event: InspectionEvent,
}

impl Inspection {
    pub(crate) fn new(actor: impl Into<String>, event: InspectionEvent) -> Self {
        Self {
            at: Utc::now(),
            actor: actor.into(),
            event,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InspectionEvent {
    ActorCreated {
        parent: Option<String>,
        logic: String,
    },
    EventDelivered {
        event: Event,
    },
    Microstep {
        event: String,
        transitions: Vec<TransitionRecord>,
    },
    ActionExecuted {
        action: String,
    },
    SnapshotPublished {
        status: Status,
    },
    ActorStopped,
}

/// A transition taken in a microstep, by state id.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransitionRecord {
    pub source: String,
    pub targets: Vec<String>,
}
