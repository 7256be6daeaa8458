//! The actor system: owns every actor, routes messages and drives time.
//!
//! All actors of a system live in one arena of generational slots. A step
//! of one actor never calls into another; it returns effects that the
//! system applies afterwards, queueing deliveries in a single FIFO
//! mailbox. The mailbox is drained to completion by whichever host call
//! started it, so subscriber callbacks and callback processes that send
//! events while the system is busy only enqueue.

use super::handle::{ActorHandle, Listener, Sender};
use super::inspect::{Inspection, InspectionEvent, Inspector, TransitionRecord};
use super::logic::{ActorLogic, CallbackFn, Process, PromiseFn};
use super::reference::{ActorKey, ActorRef};
use super::scheduler::{Scheduler, Timer};
use crate::config::{ActorOptions, SystemConfig};
use crate::core::{Event, Machine};
use crate::error::{ActionError, ActorError};
use crate::interpreter::{ActorScope, Effect, Interpreter, Limits, SpawnOptions, Step, Trace};
use crate::snapshot::{Snapshot, Status};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use stillwater::effect::BoxedEffect;
use stillwater::effect::Effect as _;
use tracing::{debug, warn};
use uuid::Uuid;

/// Owner of a tree of actors.
///
/// # Example
///
/// ```rust
/// use machina::actor::{ActorOptions, ActorSystem};
/// use machina::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
/// use std::time::Duration;
///
/// let machine = MachineBuilder::new("debounce")
///     .initial("Idle")
///     .state(StateBuilder::new("Idle").on("click", "Debouncing"))
///     .state(
///         StateBuilder::new("Debouncing")
///             .on("click", TransitionBuilder::to("Debouncing").reenter(true))
///             .after(500, "Idle"),
///     )
///     .build()
///     .unwrap();
///
/// let system = ActorSystem::new();
/// let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
/// actor.start().unwrap();
/// actor.send("click").unwrap();
/// system.advance(Duration::from_millis(500)).unwrap();
/// assert!(actor.snapshot().unwrap().matches("Idle"));
/// ```
pub struct ActorSystem {
    shared: Rc<Shared>,
}

impl ActorSystem {
    pub fn new() -> Self {
        Self::with_config(SystemConfig::default())
    }

    pub fn with_config(config: SystemConfig) -> Self {
        let limits = Limits::from(&config);
        Self {
            shared: Rc::new(Shared {
                id: Uuid::new_v4(),
                config,
                limits,
                registry: RefCell::new(Registry::default()),
                mailbox: RefCell::new(VecDeque::new()),
                scheduler: RefCell::new(Scheduler::new()),
                pending: RefCell::new(VecDeque::new()),
                snapshots: RefCell::new(HashMap::new()),
                subscribers: RefCell::new(HashMap::new()),
                next_subscription: Cell::new(0),
                notices: RefCell::new(Vec::new()),
                running: Cell::new(false),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn config(&self) -> &SystemConfig {
        &self.shared.config
    }

    /// Create a root actor running `machine`. It does nothing until
    /// [`ActorHandle::start`] is called.
    pub fn create_actor(
        &self,
        machine: impl Into<Arc<Machine>>,
        options: ActorOptions,
    ) -> Result<ActorHandle, ActorError> {
        let machine = machine.into();
        let shared = &self.shared;
        let actor = {
            let mut registry = shared.registry.try_borrow_mut().map_err(|_| ActorError::Busy)?;
            let id = match options.id {
                Some(id) if registry.root(&id).is_some() => return Err(ActorError::DuplicateId(id)),
                Some(id) => id,
                None => registry.free_root_id(machine.id()),
            };
            let interpreter = Interpreter::new(Arc::clone(&machine), id.clone(), shared.limits);
            let key = registry.insert(|key| Entry {
                actor: ActorRef::new(key, id.clone(), shared.id),
                parent: None,
                children: Vec::new(),
                spawned: 0,
                body: Body::Machine(Some(interpreter)),
                input: options.input,
                inspector: options.inspect.clone(),
                lifecycle: Lifecycle::Created,
                deferred: Vec::new(),
            });
            let actor = registry.get(key).map(|entry| entry.actor.clone());
            actor
        }
        .ok_or_else(|| ActorError::UnknownActor(machine.id().to_string()))?;

        debug!(actor = %actor, machine = machine.id(), "created actor");
        if let Some(inspector) = options.inspect {
            shared.notify(Notice::Inspect(
                inspector,
                Inspection::new(
                    actor.id(),
                    InspectionEvent::ActorCreated {
                        parent: None,
                        logic: "machine".to_string(),
                    },
                ),
            ));
        }
        shared.refresh_snapshot(actor.key());
        drain(shared);
        Ok(ActorHandle::new(Rc::clone(shared), actor))
    }

    /// Handle to a live actor of this system.
    pub fn get(&self, actor: &ActorRef) -> Option<ActorHandle> {
        if actor.system() != self.shared.id {
            return None;
        }
        let registry = self.shared.registry.try_borrow().ok()?;
        registry
            .get(actor.key())
            .map(|entry| ActorHandle::new(Rc::clone(&self.shared), entry.actor.clone()))
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.shared.scheduler.borrow().now()
    }

    /// Time until the next timer is due, if any is armed.
    pub fn next_timer_in(&self) -> Option<Duration> {
        self.shared.scheduler.borrow().next_in()
    }

    pub fn pending_timers(&self) -> usize {
        self.shared.scheduler.borrow().len()
    }

    /// Promise actors waiting for [`ActorSystem::settle`].
    pub fn pending_promises(&self) -> usize {
        self.shared.pending.borrow().len()
    }

    /// Move the virtual clock forward, firing due timers in deadline order.
    /// Each delivery runs to completion before the next timer fires.
    pub fn advance(&self, by: Duration) -> Result<(), ActorError> {
        let shared = &self.shared;
        if shared.running.get() {
            return Err(ActorError::Busy);
        }
        let until = shared.scheduler.try_borrow().map_err(|_| ActorError::Busy)?.now() + by;
        loop {
            let due = shared.scheduler.borrow_mut().pop_due(until);
            let Some(timer) = due else {
                break;
            };
            debug!(timer = %timer.id, event = %timer.event, "timer fired");
            shared.post(Mail::Deliver {
                to: timer.target,
                event: timer.event,
                token: timer.token,
            });
            drain(shared);
        }
        shared.scheduler.borrow_mut().advance_to(until);
        Ok(())
    }

    /// Run every pending promise actor to completion, reporting results to
    /// their parents. Promises started while settling are run too. Returns
    /// the number of promises run.
    pub async fn settle(&self) -> usize {
        let shared = &self.shared;
        let mut settled = 0;
        loop {
            let next = shared.pending.borrow_mut().pop_front();
            let Some(Pending { actor, effect }) = next else {
                break;
            };
            let result = effect.run(&()).await;
            shared.post(Mail::Settled { actor, result });
            drain(shared);
            settled += 1;
        }
        settled
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("id", &self.shared.id)
            .field("config", &self.shared.config)
            .finish()
    }
}

pub(crate) struct Shared {
    id: Uuid,
    config: SystemConfig,
    limits: Limits,
    registry: RefCell<Registry>,
    mailbox: RefCell<VecDeque<Mail>>,
    scheduler: RefCell<Scheduler>,
    pending: RefCell<VecDeque<Pending>>,
    pub(crate) snapshots: RefCell<HashMap<ActorKey, Snapshot>>,
    pub(crate) subscribers: RefCell<HashMap<ActorKey, Vec<(u64, Listener)>>>,
    next_subscription: Cell<u64>,
    notices: RefCell<Vec<Notice>>,
    running: Cell<bool>,
}

pub(crate) enum Mail {
    Start(ActorKey),
    Deliver {
        to: ActorKey,
        event: Event,
        token: Option<u64>,
    },
    /// Event from a callback process to its parent.
    Forward { from: ActorKey, event: Event },
    Settled {
        actor: ActorKey,
        result: Result<Value, ActionError>,
    },
    Stop(ActorKey),
}

enum Notice {
    Inspect(Inspector, Inspection),
    Publish(ActorKey, Snapshot),
}

struct Pending {
    actor: ActorKey,
    effect: BoxedEffect<Value, ActionError, ()>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    Created,
    Running,
    /// Reached done or error; stays registered until stopped.
    Finished,
}

enum Body {
    /// `None` while the interpreter is out of its slot running a step.
    Machine(Option<Interpreter>),
    Callback {
        logic: CallbackFn,
        process: Option<Process>,
    },
    Promise {
        logic: PromiseFn,
    },
}

impl Body {
    fn new(logic: &ActorLogic, id: &str, limits: Limits) -> Self {
        match logic {
            ActorLogic::Machine(machine) => {
                Body::Machine(Some(Interpreter::new(Arc::clone(machine), id, limits)))
            }
            ActorLogic::Callback(logic) => Body::Callback {
                logic: Arc::clone(logic),
                process: None,
            },
            ActorLogic::Promise(logic) => Body::Promise {
                logic: Arc::clone(logic),
            },
        }
    }
}

struct Entry {
    actor: ActorRef,
    parent: Option<ActorKey>,
    /// Live children by id, in spawn order.
    children: Vec<(String, ActorKey)>,
    spawned: u64,
    body: Body,
    input: Value,
    inspector: Option<Inspector>,
    lifecycle: Lifecycle,
    /// Events delivered before the actor started.
    deferred: Vec<(Event, Option<u64>)>,
}

struct Slot {
    generation: u64,
    entry: Option<Entry>,
}

#[derive(Default)]
struct Registry {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl Registry {
    fn insert(&mut self, make: impl FnOnce(ActorKey) -> Entry) -> ActorKey {
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                let key = ActorKey {
                    index,
                    generation: slot.generation,
                };
                slot.entry = Some(make(key));
                key
            }
            None => {
                let key = ActorKey {
                    index: self.slots.len(),
                    generation: 0,
                };
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(make(key)),
                });
                key
            }
        }
    }

    fn get(&self, key: ActorKey) -> Option<&Entry> {
        self.slots
            .get(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn get_mut(&mut self, key: ActorKey) -> Option<&mut Entry> {
        self.slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    fn remove(&mut self, key: ActorKey) -> Option<Entry> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|slot| slot.generation == key.generation)?;
        let entry = slot.entry.take()?;
        slot.generation += 1;
        self.free.push(key.index);
        Some(entry)
    }

    fn root(&self, id: &str) -> Option<ActorKey> {
        self.slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .find(|entry| entry.parent.is_none() && entry.actor.id() == id)
            .map(|entry| entry.actor.key())
    }

    fn free_root_id(&self, base: &str) -> String {
        if self.root(base).is_none() {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}:{n}"))
            .find(|id| self.root(id).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn child_ids(&self, key: ActorKey) -> Vec<String> {
        self.get(key)
            .map(|entry| entry.children.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default()
    }
}

/// Child bookkeeping for the actor whose step is running.
struct Scope<'r> {
    registry: &'r mut Registry,
    system: Uuid,
    limits: Limits,
    owner: ActorKey,
    actor: ActorRef,
    inspector: Option<Inspector>,
    created: Vec<Inspection>,
    /// Children released during the step. They stay registered under the
    /// owner until the step's `Stop` effects run, so a failed step still
    /// tears them down with the rest of its children.
    released: Vec<ActorKey>,
}

impl Scope<'_> {
    fn owned(&self) -> impl Iterator<Item = &(String, ActorKey)> + '_ {
        self.registry
            .get(self.owner)
            .into_iter()
            .flat_map(|owner| owner.children.iter())
            .filter(|(_, key)| !self.released.contains(key))
    }
}

impl ActorScope for Scope<'_> {
    fn self_ref(&self) -> Option<&ActorRef> {
        Some(&self.actor)
    }

    fn spawn(&mut self, logic: &ActorLogic, options: SpawnOptions) -> Result<ActorRef, ActionError> {
        if let Some(id) = &options.id {
            if self.owned().any(|(child, _)| child == id) {
                return Err(ActionError::DuplicateChild(id.clone()));
            }
        }
        let owner = self
            .registry
            .get_mut(self.owner)
            .ok_or_else(|| ActionError::NotRunning(self.actor.id().to_string()))?;
        let id = match options.id {
            Some(id) => id,
            None => {
                let n = owner.spawned;
                owner.spawned += 1;
                format!("{}:{n}", self.actor.id())
            }
        };

        let body = Body::new(logic, &id, self.limits);
        let (system, parent, inspector) = (self.system, self.owner, self.inspector.clone());
        let key = self.registry.insert(|key| Entry {
            actor: ActorRef::new(key, id.clone(), system),
            parent: Some(parent),
            children: Vec::new(),
            spawned: 0,
            body,
            input: options.input,
            inspector,
            lifecycle: Lifecycle::Created,
            deferred: Vec::new(),
        });
        if let Some(owner) = self.registry.get_mut(self.owner) {
            owner.children.push((id.clone(), key));
        }

        debug!(parent = %self.actor, child = %id, logic = logic.kind(), "spawned actor");
        if self.inspector.is_some() {
            self.created.push(Inspection::new(
                id.clone(),
                InspectionEvent::ActorCreated {
                    parent: Some(self.actor.id().to_string()),
                    logic: logic.kind().to_string(),
                },
            ));
        }
        Ok(ActorRef::new(key, id, system))
    }

    fn release(&mut self, actor: &ActorRef) {
        if !self.released.contains(&actor.key()) {
            self.released.push(actor.key());
        }
    }

    fn owns(&self, actor: &ActorRef) -> bool {
        actor.system() == self.system && self.owned().any(|(_, key)| *key == actor.key())
    }

    fn child(&self, id: &str) -> Option<ActorRef> {
        let (_, key) = self.owned().find(|(child, _)| child == id)?;
        self.registry.get(*key).map(|entry| entry.actor.clone())
    }

    fn children(&self) -> Vec<String> {
        self.owned().map(|(id, _)| id.clone()).collect()
    }
}

/// Process queued mail until the mailbox is empty. A call made while the
/// system is already draining returns at once; the outer call picks the
/// new mail up.
pub(crate) fn drain(shared: &Rc<Shared>) {
    if shared.running.replace(true) {
        return;
    }
    loop {
        shared.flush();
        let next = shared.mailbox.borrow_mut().pop_front();
        let Some(mail) = next else {
            break;
        };
        shared.process(mail);
    }
    shared.running.set(false);
}

impl Shared {
    pub(crate) fn post(&self, mail: Mail) {
        self.mailbox.borrow_mut().push_back(mail);
    }

    pub(crate) fn try_post(&self, mail: Mail) -> Result<(), ActorError> {
        self.mailbox
            .try_borrow_mut()
            .map_err(|_| ActorError::Busy)?
            .push_back(mail);
        Ok(())
    }

    pub(crate) fn next_subscription(&self) -> u64 {
        let id = self.next_subscription.get();
        self.next_subscription.set(id + 1);
        id
    }

    pub(crate) fn lifecycle(&self, key: ActorKey) -> Result<Option<Lifecycle>, ActorError> {
        let registry = self.registry.try_borrow().map_err(|_| ActorError::Busy)?;
        Ok(registry.get(key).map(|entry| entry.lifecycle))
    }

    fn notify(&self, notice: Notice) {
        self.notices.borrow_mut().push(notice);
    }

    fn inspect(&self, inspector: &Option<Inspector>, actor: &str, event: InspectionEvent) {
        if let Some(inspector) = inspector {
            self.notify(Notice::Inspect(Rc::clone(inspector), Inspection::new(actor, event)));
        }
    }

    /// Run inspectors and subscribers with no borrows held.
    fn flush(&self) {
        loop {
            let notices = std::mem::take(&mut *self.notices.borrow_mut());
            if notices.is_empty() {
                return;
            }
            for notice in notices {
                match notice {
                    Notice::Inspect(inspector, inspection) => inspector(&inspection),
                    Notice::Publish(key, snapshot) => {
                        let listeners: Vec<Listener> = self
                            .subscribers
                            .borrow()
                            .get(&key)
                            .map(|listeners| {
                                listeners.iter().map(|(_, listener)| Rc::clone(listener)).collect()
                            })
                            .unwrap_or_default();
                        for listener in listeners {
                            listener(&snapshot);
                        }
                    }
                }
            }
        }
    }

    fn process(self: &Rc<Self>, mail: Mail) {
        match mail {
            Mail::Start(key) => self.start(key),
            Mail::Deliver { to, event, token } => self.deliver(to, event, token),
            Mail::Forward { from, event } => self.forward(from, event),
            Mail::Settled { actor, result } => self.settled(actor, result),
            Mail::Stop(key) => self.stop_tree(key),
        }
    }

    fn start(self: &Rc<Self>, key: ActorKey) {
        enum Starting {
            Machine(Value),
            Callback(CallbackFn, Value, ActorRef),
            Promise(PromiseFn, Value),
        }

        let starting = {
            let mut registry = self.registry.borrow_mut();
            let Some(entry) = registry.get_mut(key) else {
                return;
            };
            if entry.lifecycle != Lifecycle::Created {
                return;
            }
            entry.lifecycle = Lifecycle::Running;
            let input = std::mem::take(&mut entry.input);
            match &entry.body {
                Body::Machine(_) => Starting::Machine(input),
                Body::Callback { logic, .. } => {
                    Starting::Callback(Arc::clone(logic), input, entry.actor.clone())
                }
                Body::Promise { logic } => Starting::Promise(Arc::clone(logic), input),
            }
        };

        match starting {
            Starting::Machine(input) => {
                self.run_machine(key, move |interpreter, scope| interpreter.start(input, scope));
            }
            Starting::Callback(logic, input, actor) => {
                let sender = Sender::new(Rc::downgrade(self), key, actor.id());
                match logic(&input, sender) {
                    Ok(process) => {
                        let mut process = Some(process);
                        if let Some(Entry {
                            body: Body::Callback { process: slot, .. },
                            ..
                        }) = self.registry.borrow_mut().get_mut(key)
                        {
                            *slot = process.take();
                        }
                        if let Some(mut orphan) = process {
                            orphan.cleanup();
                        }
                    }
                    Err(err) => {
                        warn!(actor = %actor, error = %err, "callback actor failed to start");
                        self.finish(key, Err(err.to_string()));
                    }
                }
            }
            Starting::Promise(logic, input) => {
                let effect = logic(&input);
                self.pending.borrow_mut().push_back(Pending { actor: key, effect });
            }
        }

        let deferred = match self.registry.borrow_mut().get_mut(key) {
            Some(entry) => std::mem::take(&mut entry.deferred),
            None => Vec::new(),
        };
        let mut mailbox = self.mailbox.borrow_mut();
        for (event, token) in deferred.into_iter().rev() {
            mailbox.push_front(Mail::Deliver {
                to: key,
                event,
                token,
            });
        }
    }

    fn deliver(self: &Rc<Self>, key: ActorKey, event: Event, token: Option<u64>) {
        enum Target {
            Machine,
            Callback(Option<Process>),
            Ignore,
        }

        let (target, actor, inspector) = {
            let mut registry = self.registry.borrow_mut();
            let Some(entry) = registry.get_mut(key) else {
                debug!(event = %event, "dropping event for an actor that no longer exists");
                return;
            };
            if entry.lifecycle == Lifecycle::Created {
                entry.deferred.push((event, token));
                return;
            }
            let target = match (&mut entry.body, entry.lifecycle) {
                (Body::Machine(_), Lifecycle::Running) => Target::Machine,
                (Body::Callback { process, .. }, Lifecycle::Running) => {
                    Target::Callback(process.take())
                }
                _ => Target::Ignore,
            };
            (target, entry.actor.clone(), entry.inspector.clone())
        };

        debug!(actor = %actor, event = %event, "delivering event");
        self.inspect(
            &inspector,
            actor.id(),
            InspectionEvent::EventDelivered {
                event: event.clone(),
            },
        );

        match target {
            Target::Machine => {
                self.run_machine(key, move |interpreter, scope| {
                    interpreter.receive(event, token, scope)
                });
            }
            Target::Callback(Some(mut process)) => {
                if !process.deliver(&event) {
                    debug!(actor = %actor, event = %event, "callback actor ignores events");
                }
                let mut process = Some(process);
                if let Some(Entry {
                    body: Body::Callback { process: slot, .. },
                    ..
                }) = self.registry.borrow_mut().get_mut(key)
                {
                    *slot = process.take();
                }
                if let Some(mut orphan) = process {
                    orphan.cleanup();
                }
            }
            Target::Callback(None) | Target::Ignore => {
                debug!(actor = %actor, event = %event, "actor is not accepting events");
            }
        }
    }

    fn forward(self: &Rc<Self>, from: ActorKey, event: Event) {
        let parent = {
            let registry = self.registry.borrow();
            registry
                .get(from)
                .filter(|entry| entry.lifecycle == Lifecycle::Running)
                .and_then(|entry| entry.parent)
        };
        match parent {
            Some(parent) => self.post(Mail::Deliver {
                to: parent,
                event,
                token: None,
            }),
            None => debug!(event = %event, "dropping event from a stopped callback actor"),
        }
    }

    fn settled(self: &Rc<Self>, key: ActorKey, result: Result<Value, ActionError>) {
        let running = {
            let registry = self.registry.borrow();
            registry
                .get(key)
                .is_some_and(|entry| entry.lifecycle == Lifecycle::Running)
        };
        if !running {
            debug!("promise settled after its actor stopped, result dropped");
            return;
        }
        self.finish(key, result.map_err(|err| err.to_string()));
    }

    /// Mark a child as finished and report the outcome to its parent.
    fn finish(self: &Rc<Self>, key: ActorKey, outcome: Result<Value, String>) {
        let (actor, parent) = {
            let mut registry = self.registry.borrow_mut();
            let Some(entry) = registry.get_mut(key) else {
                return;
            };
            entry.lifecycle = Lifecycle::Finished;
            (entry.actor.clone(), entry.parent)
        };
        let Some(parent) = parent else {
            return;
        };
        let event = match outcome {
            Ok(output) => Event::done_actor(actor.id(), output),
            Err(error) => Event::error_actor(actor.id(), &error),
        };
        debug!(actor = %actor, event = %event, "reporting to parent");
        self.post(Mail::Deliver {
            to: parent,
            event,
            token: None,
        });
    }

    /// Run a machine step with the interpreter taken out of its slot, then
    /// apply its effects and publish the new snapshot.
    fn run_machine<F>(self: &Rc<Self>, key: ActorKey, work: F)
    where
        F: FnOnce(&mut Interpreter, &mut dyn ActorScope) -> Step,
    {
        let (step, before, after, outcome, actor, inspector, created) = {
            let mut registry = self.registry.borrow_mut();
            let (mut interpreter, actor, inspector) = {
                let Some(entry) = registry.get_mut(key) else {
                    return;
                };
                let Body::Machine(slot) = &mut entry.body else {
                    return;
                };
                let Some(interpreter) = slot.take() else {
                    return;
                };
                (interpreter, entry.actor.clone(), entry.inspector.clone())
            };

            let before = interpreter.status();
            let mut scope = Scope {
                registry: &mut *registry,
                system: self.id,
                limits: self.limits,
                owner: key,
                actor: actor.clone(),
                inspector: inspector.clone(),
                created: Vec::new(),
                released: Vec::new(),
            };
            let step = work(&mut interpreter, &mut scope);
            let created = std::mem::take(&mut scope.created);
            let after = interpreter.status();
            let outcome = match after {
                Status::Done => Some(Ok(interpreter.output().cloned().unwrap_or(Value::Null))),
                Status::Error => Some(Err(interpreter.error().unwrap_or("unknown error").to_string())),
                _ => None,
            };

            if let Some(Entry {
                body: Body::Machine(slot),
                ..
            }) = registry.get_mut(key)
            {
                *slot = Some(interpreter);
            }
            (step, before, after, outcome, actor, inspector, created)
        };

        if let Some(inspector) = &inspector {
            for inspection in created {
                self.notify(Notice::Inspect(Rc::clone(inspector), inspection));
            }
            for trace in &step.trace {
                let event = match trace {
                    Trace::Microstep { event, transitions } => InspectionEvent::Microstep {
                        event: event.clone(),
                        transitions: transitions
                            .iter()
                            .map(|(source, targets)| TransitionRecord {
                                source: source.clone(),
                                targets: targets.clone(),
                            })
                            .collect(),
                    },
                    Trace::Action { label } => InspectionEvent::ActionExecuted {
                        action: label.clone(),
                    },
                };
                self.notify(Notice::Inspect(
                    Rc::clone(inspector),
                    Inspection::new(actor.id(), event),
                ));
            }
        }

        let processed = step.processed;
        self.apply(key, &actor, step.effects);

        if before != after {
            if let Some(outcome) = outcome {
                self.scheduler.borrow_mut().cancel_all(key);
                self.stop_children(key);
                self.finish(key, outcome);
            }
        }
        if processed || before != after {
            self.refresh_snapshot(key);
        }
    }

    fn apply(self: &Rc<Self>, owner: ActorKey, actor: &ActorRef, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Schedule {
                    id,
                    delay,
                    to,
                    event,
                    token,
                } => {
                    let target = match to {
                        Some(to) if to.system() != self.id => {
                            warn!(actor = %actor, recipient = %to, "recipient belongs to another system, dropping delayed event");
                            continue;
                        }
                        Some(to) => to.key(),
                        None => owner,
                    };
                    debug!(actor = %actor, timer = %id, ?delay, "scheduling event");
                    self.scheduler.borrow_mut().schedule(
                        delay,
                        Timer {
                            owner,
                            id,
                            target,
                            event,
                            token,
                        },
                    );
                }
                Effect::Cancel { id } => {
                    if self.scheduler.borrow_mut().cancel(owner, &id) {
                        debug!(actor = %actor, timer = %id, "cancelled timer");
                    }
                }
                Effect::Send { to, event } => {
                    if to.system() != self.id {
                        warn!(actor = %actor, recipient = %to, "recipient belongs to another system, dropping event");
                        continue;
                    }
                    self.post(Mail::Deliver {
                        to: to.key(),
                        event,
                        token: None,
                    });
                }
                Effect::SendParent { event } => {
                    let parent = self.registry.borrow().get(owner).and_then(|entry| entry.parent);
                    match parent {
                        Some(parent) => self.post(Mail::Deliver {
                            to: parent,
                            event,
                            token: None,
                        }),
                        None => warn!(actor = %actor, event = %event, "root actor has no parent, dropping event"),
                    }
                }
                Effect::Start(child) => self.post(Mail::Start(child.key())),
                Effect::Stop(child) => {
                    let owned = self
                        .registry
                        .borrow()
                        .get(child.key())
                        .is_some_and(|entry| entry.parent == Some(owner));
                    if owned {
                        self.stop_tree(child.key());
                    } else {
                        warn!(actor = %actor, child = %child, "can only stop own live children");
                    }
                }
            }
        }
    }

    fn stop_children(self: &Rc<Self>, key: ActorKey) {
        let children: Vec<ActorKey> = self
            .registry
            .borrow()
            .get(key)
            .map(|entry| entry.children.iter().map(|(_, child)| *child).collect())
            .unwrap_or_default();
        for child in children {
            self.stop_tree(child);
        }
    }

    /// Stop an actor and all its descendants, deepest first. Runs callback
    /// cleanups and cancels timers; idempotent for actors already gone.
    pub(crate) fn stop_tree(self: &Rc<Self>, key: ActorKey) {
        self.stop_children(key);

        let entry = {
            let mut registry = self.registry.borrow_mut();
            let Some(entry) = registry.remove(key) else {
                return;
            };
            if let Some(parent) = entry.parent.and_then(|parent| registry.get_mut(parent)) {
                parent.children.retain(|(_, child)| *child != key);
            }
            entry
        };
        self.scheduler.borrow_mut().cancel_all(key);
        debug!(actor = %entry.actor, "stopped actor");
        self.inspect(&entry.inspector, entry.actor.id(), InspectionEvent::ActorStopped);

        match entry.body {
            Body::Machine(Some(mut interpreter)) => {
                interpreter.stop();
                let snapshot = interpreter.snapshot(Vec::new());
                self.inspect(
                    &entry.inspector,
                    entry.actor.id(),
                    InspectionEvent::SnapshotPublished {
                        status: snapshot.status(),
                    },
                );
                let mut snapshots = self.snapshots.borrow_mut();
                if entry.parent.is_none() {
                    snapshots.insert(key, snapshot.clone());
                } else {
                    snapshots.remove(&key);
                }
                drop(snapshots);
                self.notify(Notice::Publish(key, snapshot));
                if entry.parent.is_some() {
                    self.subscribers.borrow_mut().remove(&key);
                }
            }
            Body::Callback {
                process: Some(mut process),
                ..
            } => process.cleanup(),
            _ => {}
        }
    }

    fn refresh_snapshot(&self, key: ActorKey) {
        let published = {
            let registry = self.registry.borrow();
            let Some(entry) = registry.get(key) else {
                return;
            };
            let Body::Machine(Some(interpreter)) = &entry.body else {
                return;
            };
            (
                interpreter.snapshot(registry.child_ids(key)),
                entry.actor.clone(),
                entry.inspector.clone(),
            )
        };
        let (snapshot, actor, inspector) = published;
        self.inspect(
            &inspector,
            actor.id(),
            InspectionEvent::SnapshotPublished {
                status: snapshot.status(),
            },
        );
        self.snapshots.borrow_mut().insert(key, snapshot.clone());
        self.notify(Notice::Publish(key, snapshot));
    }
}
