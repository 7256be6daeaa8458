//! Host-facing handles: commands in, snapshots out.

use super::reference::{ActorKey, ActorRef};
use super::system::{drain, Lifecycle, Mail, Shared};
use crate::core::Event;
use crate::error::ActorError;
use crate::snapshot::Snapshot;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, warn};

pub(crate) type Listener = Rc<dyn Fn(&Snapshot)>;

/// Handle to an actor owned by an [`ActorSystem`](super::ActorSystem).
///
/// Every command runs to completion before it returns: by the time
/// [`send`](Self::send) returns, the event and everything it caused
/// (messages between actors, spawned children, notifications) has been
/// processed.
#[derive(Clone)]
pub struct ActorHandle {
    shared: Rc<Shared>,
    actor: ActorRef,
}

impl ActorHandle {
    pub(crate) fn new(shared: Rc<Shared>, actor: ActorRef) -> Self {
        Self { shared, actor }
    }

    pub fn id(&self) -> &str {
        self.actor.id()
    }

    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor
    }

    /// Enter the initial configuration. Events sent before this are
    /// buffered and processed right after.
    pub fn start(&self) -> Result<(), ActorError> {
        match self.shared.lifecycle(self.actor.key())? {
            None => Err(ActorError::AlreadyStopped(self.id().to_string())),
            Some(Lifecycle::Created) => {
                self.shared.try_post(Mail::Start(self.actor.key()))?;
                drain(&self.shared);
                Ok(())
            }
            Some(_) => Err(ActorError::AlreadyStarted(self.id().to_string())),
        }
    }

    /// Deliver an event. Sending to a stopped actor does nothing.
    pub fn send(&self, event: impl Into<Event>) -> Result<(), ActorError> {
        let event = event.into();
        if self.shared.lifecycle(self.actor.key())?.is_none() {
            debug!(actor = %self.actor, event = %event, "actor is stopped, event dropped");
            return Ok(());
        }
        self.shared.try_post(Mail::Deliver {
            to: self.actor.key(),
            event,
            token: None,
        })?;
        drain(&self.shared);
        Ok(())
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Result<Snapshot, ActorError> {
        let snapshots = self.shared.snapshots.try_borrow().map_err(|_| ActorError::Busy)?;
        snapshots
            .get(&self.actor.key())
            .cloned()
            .ok_or_else(|| ActorError::UnknownActor(self.id().to_string()))
    }

    /// Call `listener` with every snapshot published from now on, in the
    /// order the steps completed.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Snapshot) + 'static,
    {
        let id = self.shared.next_subscription();
        self.shared
            .subscribers
            .borrow_mut()
            .entry(self.actor.key())
            .or_default()
            .push((id, Rc::new(listener)));
        Subscription {
            shared: Rc::downgrade(&self.shared),
            actor: self.actor.key(),
            id,
        }
    }

    /// Stop the actor and all its descendants. No exit actions run.
    pub fn stop(&self) -> Result<(), ActorError> {
        if self.shared.lifecycle(self.actor.key())?.is_none() {
            return Err(ActorError::AlreadyStopped(self.id().to_string()));
        }
        self.shared.try_post(Mail::Stop(self.actor.key()))?;
        drain(&self.shared);
        Ok(())
    }
}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorHandle").field("actor", &self.actor).finish()
    }
}

/// Registration returned by [`ActorHandle::subscribe`].
#[derive(Debug)]
pub struct Subscription {
    shared: Weak<Shared>,
    actor: ActorKey,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut subscribers = shared.subscribers.borrow_mut();
        if let Some(listeners) = subscribers.get_mut(&self.actor) {
            listeners.retain(|(id, _)| *id != self.id);
            if listeners.is_empty() {
                subscribers.remove(&self.actor);
            }
        }
    }
}

/// Given to a callback actor for sending events to its parent. Events sent
/// after the actor stopped are dropped.
#[derive(Clone)]
pub struct Sender {
    shared: Weak<Shared>,
    origin: ActorKey,
    id: String,
}

impl Sender {
    pub(crate) fn new(shared: Weak<Shared>, origin: ActorKey, id: impl Into<String>) -> Self {
        Self {
            shared,
            origin,
            id: id.into(),
        }
    }

    /// Id of the callback actor.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn send(&self, event: impl Into<Event>) {
        let event = event.into();
        let Some(shared) = self.shared.upgrade() else {
            debug!(actor = %self.id, event = %event, "actor system dropped, event lost");
            return;
        };
        let forwarded = shared.try_post(Mail::Forward {
            from: self.origin,
            event,
        });
        if let Err(err) = forwarded {
            warn!(actor = %self.id, error = %err, "could not forward event to parent");
            return;
        }
        drain(&shared);
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender").field("id", &self.id).finish()
    }
}
