//! The macrostep loop: one event processed to completion.
//!
//! An [`Interpreter`] owns the runtime state of one machine instance. Each
//! call to [`Interpreter::receive`] works on a copy of that state and only
//! commits it when the whole macrostep succeeded, so a failing guard or
//! action leaves the last settled configuration and context in place.

use super::algorithm::{
    entry_set, exit_set, initial_entry_set, record_history, select_eventless,
    select_transitions,
};
use super::configuration::{
    active_tags, check_complete, is_in_final_state, state_value, Configuration,
};
use super::effects::{ActorScope, Effect, SpawnOptions, Spawner};
use crate::actor::ActorRef;
use crate::config::SystemConfig;
use crate::core::{
    Action, ActionQueue, Context, Event, HistoryMemory, Machine, Recipient, StateId, StateKind,
    TransitionId,
};
use crate::error::{ActionError, InterpreterError};
use crate::snapshot::{Snapshot, Status};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Per-step limits taken from [`SystemConfig`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct Limits {
    pub max_microsteps: usize,
    pub check_configuration: bool,
    pub log_unhandled: bool,
}

impl From<&SystemConfig> for Limits {
    fn from(config: &SystemConfig) -> Self {
        Self {
            max_microsteps: config.max_microsteps,
            check_configuration: config.check_configuration,
            log_unhandled: config.log_unhandled_events,
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&SystemConfig::default())
    }
}

/// What happened during a step, for inspection.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Trace {
    Microstep {
        event: String,
        /// Source state id and target state ids of each transition taken.
        transitions: Vec<(String, Vec<String>)>,
    },
    Action {
        label: String,
    },
}

/// Result of starting an interpreter or delivering one event.
#[derive(Debug, Default)]
pub(crate) struct Step {
    pub effects: Vec<Effect>,
    pub trace: Vec<Trace>,
    /// Whether the event was accepted: at least one transition was enabled,
    /// or the step failed trying.
    pub processed: bool,
    pub error: Option<InterpreterError>,
}

impl Step {
    fn ignored() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug)]
struct MachineState {
    configuration: Configuration,
    context: Context,
    history: HistoryMemory,
    /// Armed delayed-transition timers by event type, with their token.
    timers: HashMap<String, u64>,
    next_token: u64,
    next_send: u64,
    status: Status,
    output: Option<Value>,
    error: Option<String>,
    event: Option<Event>,
    internal: VecDeque<Event>,
}

impl MachineState {
    fn new() -> Self {
        Self {
            configuration: Configuration::new(),
            context: Context::new(),
            history: HistoryMemory::new(),
            timers: HashMap::new(),
            next_token: 0,
            next_send: 0,
            status: Status::NotStarted,
            output: None,
            error: None,
            event: None,
            internal: VecDeque::new(),
        }
    }
}

/// Runtime state of one machine instance.
pub(crate) struct Interpreter {
    machine: Arc<Machine>,
    actor: String,
    limits: Limits,
    state: MachineState,
}

impl Interpreter {
    pub(crate) fn new(machine: Arc<Machine>, actor: impl Into<String>, limits: Limits) -> Self {
        Self {
            machine,
            actor: actor.into(),
            limits,
            state: MachineState::new(),
        }
    }

    pub(crate) fn status(&self) -> Status {
        self.state.status
    }

    pub(crate) fn output(&self) -> Option<&Value> {
        self.state.output.as_ref()
    }

    pub(crate) fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Initialize the context from `input`, enter the initial configuration
    /// and settle. Ignored unless the interpreter has not started yet.
    pub(crate) fn start(&mut self, input: Value, scope: &mut dyn ActorScope) -> Step {
        if self.state.status != Status::NotStarted {
            return Step::ignored();
        }
        let mut next = self.state.clone();
        next.status = Status::Active;

        let machine = Arc::clone(&self.machine);
        let actor = self.actor.clone();
        let mut run = Run::new(&machine, &actor, self.limits, scope);
        let result = run.initialize(&mut next, input).map(|()| true);
        let (effects, trace) = run.into_parts();
        self.commit(next, result, effects, trace)
    }

    /// Process one event to completion. `token` must match the armed timer
    /// for delayed-transition events; anything else drops them.
    pub(crate) fn receive(
        &mut self,
        event: Event,
        token: Option<u64>,
        scope: &mut dyn ActorScope,
    ) -> Step {
        if self.state.status != Status::Active {
            return Step::ignored();
        }
        let mut next = self.state.clone();
        if event.is_timer() {
            match (token, next.timers.get(event.kind())) {
                (Some(token), Some(armed)) if token == *armed => {
                    next.timers.remove(event.kind());
                }
                _ => {
                    debug!(actor = %self.actor, event = %event, "dropping stale timer event");
                    return Step::ignored();
                }
            }
        }

        let machine = Arc::clone(&self.machine);
        let actor = self.actor.clone();
        let mut run = Run::new(&machine, &actor, self.limits, scope);
        let result = run.macrostep(&mut next, event);
        let (effects, trace) = run.into_parts();
        self.commit(next, result, effects, trace)
    }

    /// Halt the instance. No exit actions run; the owner cancels timers and
    /// stops children.
    pub(crate) fn stop(&mut self) {
        self.state.status = Status::Stopped;
        self.state.timers.clear();
        self.state.internal.clear();
    }

    pub(crate) fn snapshot(&self, children: Vec<String>) -> Snapshot {
        let machine = &self.machine;
        let configuration = &self.state.configuration;
        Snapshot {
            status: self.state.status,
            value: state_value(machine, configuration, StateId::ROOT),
            configuration: configuration
                .iter()
                .map(|state| machine.node(*state).id().to_string())
                .collect(),
            paths: configuration
                .iter()
                .map(|state| machine.node(*state).path().to_string())
                .collect(),
            context: self.state.context.clone(),
            tags: active_tags(machine, configuration),
            event: self.state.event.clone(),
            output: self.state.output.clone(),
            error: self.state.error.clone(),
            children,
        }
    }

    fn commit(
        &mut self,
        next: MachineState,
        result: Result<bool, InterpreterError>,
        effects: Vec<Effect>,
        trace: Vec<Trace>,
    ) -> Step {
        match result {
            Ok(processed) => {
                self.state = next;
                Step {
                    effects,
                    trace,
                    processed,
                    error: None,
                }
            }
            Err(err) => {
                warn!(actor = %self.actor, error = %err, "step failed, actor moved to error status");
                self.state.status = Status::Error;
                self.state.error = Some(err.to_string());
                self.state.internal.clear();
                Step {
                    effects: Vec::new(),
                    trace,
                    processed: true,
                    error: Some(err),
                }
            }
        }
    }
}

/// Scratch space for one start or macrostep.
struct Run<'a> {
    machine: &'a Machine,
    actor: &'a str,
    limits: Limits,
    scope: &'a mut dyn ActorScope,
    effects: Vec<Effect>,
    trace: Vec<Trace>,
    microsteps: usize,
}

impl<'a> Run<'a> {
    fn new(
        machine: &'a Machine,
        actor: &'a str,
        limits: Limits,
        scope: &'a mut dyn ActorScope,
    ) -> Self {
        Self {
            machine,
            actor,
            limits,
            scope,
            effects: Vec::new(),
            trace: Vec::new(),
            microsteps: 0,
        }
    }

    fn into_parts(self) -> (Vec<Effect>, Vec<Trace>) {
        (self.effects, self.trace)
    }

    fn initialize(&mut self, state: &mut MachineState, input: Value) -> Result<(), InterpreterError> {
        let event = Event::init(input);
        state.context = self.machine.initial_context(event.data())?;
        state.event = Some(event.clone());

        self.count_microstep()?;
        let entering = initial_entry_set(self.machine, &state.history);
        self.trace.push(Trace::Microstep {
            event: event.kind().to_string(),
            transitions: vec![(
                self.machine.root().id().to_string(),
                entering
                    .iter()
                    .filter(|id| self.machine.node(**id).kind().is_atomic())
                    .map(|id| self.machine.node(*id).id().to_string())
                    .collect(),
            )],
        });
        self.enter_all(state, &entering, &event)?;
        self.settle(state, event)
    }

    fn macrostep(&mut self, state: &mut MachineState, event: Event) -> Result<bool, InterpreterError> {
        state.event = Some(event.clone());
        let enabled = select_transitions(
            self.machine,
            &state.configuration,
            &state.history,
            &state.context,
            &event,
        )?;
        let processed = !enabled.is_empty();
        if processed {
            self.microstep(state, &enabled, &event)?;
        } else if self.limits.log_unhandled {
            debug!(actor = self.actor, event = %event, "event not handled in any active state");
        }
        self.settle(state, event)?;
        Ok(processed)
    }

    /// Take eventless transitions and drain the internal queue until
    /// neither has anything left.
    fn settle(&mut self, state: &mut MachineState, mut event: Event) -> Result<(), InterpreterError> {
        loop {
            if state.status != Status::Active {
                state.internal.clear();
                return Ok(());
            }

            let eventless = select_eventless(
                self.machine,
                &state.configuration,
                &state.history,
                &state.context,
                &event,
            )?;
            if !eventless.is_empty() {
                self.microstep(state, &eventless, &event)?;
                continue;
            }

            let Some(internal) = state.internal.pop_front() else {
                return Ok(());
            };
            let enabled = select_transitions(
                self.machine,
                &state.configuration,
                &state.history,
                &state.context,
                &internal,
            )?;
            if !enabled.is_empty() {
                self.microstep(state, &enabled, &internal)?;
            }
            event = internal;
        }
    }

    fn count_microstep(&mut self) -> Result<(), InterpreterError> {
        self.microsteps += 1;
        if self.microsteps > self.limits.max_microsteps {
            return Err(InterpreterError::MicrostepLimit {
                limit: self.limits.max_microsteps,
            });
        }
        Ok(())
    }

    fn microstep(
        &mut self,
        state: &mut MachineState,
        transitions: &[TransitionId],
        event: &Event,
    ) -> Result<(), InterpreterError> {
        self.count_microstep()?;
        let machine = self.machine;
        self.trace.push(Trace::Microstep {
            event: event.kind().to_string(),
            transitions: transitions
                .iter()
                .map(|tid| {
                    let transition = machine.transition(*tid);
                    (
                        machine.node(transition.source()).id().to_string(),
                        transition
                            .targets()
                            .iter()
                            .map(|target| machine.node(*target).id().to_string())
                            .collect(),
                    )
                })
                .collect(),
        });
        trace!(actor = self.actor, event = %event, transitions = transitions.len(), "microstep");

        let exits = exit_set(machine, &state.configuration, &state.history, transitions);
        state.history = record_history(machine, &state.configuration, &exits, &state.history);
        for exiting in exits.iter().rev() {
            self.exit_state(state, *exiting, event)?;
        }

        for tid in transitions {
            for action in machine.transition(*tid).actions() {
                self.execute(state, action, event)?;
            }
        }

        let entering = entry_set(machine, &state.history, transitions);
        self.enter_all(state, &entering, event)
    }

    fn enter_all(
        &mut self,
        state: &mut MachineState,
        entering: &BTreeSet<StateId>,
        event: &Event,
    ) -> Result<(), InterpreterError> {
        for id in entering {
            if state.configuration.contains(id) {
                continue;
            }
            self.enter_state(state, *id, event)?;
        }

        if is_in_final_state(self.machine, &state.configuration, StateId::ROOT) {
            self.finish(state, event)?;
        }

        if self.limits.check_configuration {
            check_complete(self.machine, &state.configuration)
                .map_err(InterpreterError::IllegalConfiguration)?;
        }
        Ok(())
    }

    fn exit_state(
        &mut self,
        state: &mut MachineState,
        id: StateId,
        event: &Event,
    ) -> Result<(), ActionError> {
        let machine = self.machine;
        let node = machine.node(id);
        for action in &node.exit {
            self.execute(state, action, event)?;
        }
        for delayed in node.delayed() {
            if state.timers.remove(delayed.event()).is_some() {
                self.effects.push(Effect::Cancel {
                    id: delayed.event().to_string(),
                });
            }
        }
        for invocation in node.invocations() {
            if let Some(child) = self.scope.child(invocation.id()) {
                self.scope.release(&child);
                self.effects.push(Effect::Stop(child));
            }
        }
        state.configuration.remove(&id);
        Ok(())
    }

    fn enter_state(
        &mut self,
        state: &mut MachineState,
        id: StateId,
        event: &Event,
    ) -> Result<(), ActionError> {
        let machine = self.machine;
        let node = machine.node(id);
        state.configuration.insert(id);

        for action in &node.entry {
            self.execute(state, action, event)?;
        }

        for delayed in node.delayed() {
            let delay = delayed.delay().resolve(&state.context, event)?;
            let token = state.next_token;
            state.next_token += 1;
            state.timers.insert(delayed.event().to_string(), token);
            debug!(actor = self.actor, timer = delayed.event(), ?delay, "arming timer");
            self.effects.push(Effect::Schedule {
                id: delayed.event().to_string(),
                delay,
                to: None,
                event: Event::new(delayed.event()),
                token: Some(token),
            });
        }

        for invocation in node.invocations() {
            let logic = machine
                .actor_logic(invocation.src())
                .ok_or_else(|| ActionError::UnknownActor(invocation.src().to_string()))?;
            let input = invocation
                .input(&state.context, event)
                .map_err(|err| err.in_action("input"))?;
            let options = SpawnOptions::new().id(invocation.id()).input(input);
            let child = self.scope.spawn(logic, options)?;
            self.effects.push(Effect::Start(child));
        }

        if node.is_final() {
            if let Some(parent) = node.parent().filter(|parent| *parent != StateId::ROOT) {
                let output = node.output(&state.context, event)?;
                state
                    .internal
                    .push_back(Event::done_state(machine.node(parent).id(), output));

                let grandparent = machine.node(parent).parent();
                if let Some(grandparent) = grandparent.filter(|g| *g != StateId::ROOT) {
                    if machine.node(grandparent).kind() == StateKind::Parallel
                        && is_in_final_state(machine, &state.configuration, grandparent)
                    {
                        state.internal.push_back(Event::done_state(
                            machine.node(grandparent).id(),
                            Value::Null,
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// The machine reached a top-level final state.
    fn finish(&mut self, state: &mut MachineState, event: &Event) -> Result<(), ActionError> {
        let machine = self.machine;
        let output = if machine.output.is_some() {
            machine.output(&state.context, event)?
        } else {
            let final_child = machine
                .root()
                .children()
                .iter()
                .copied()
                .find(|child| state.configuration.contains(child) && machine.node(*child).is_final());
            match final_child {
                Some(child) => machine.node(child).output(&state.context, event)?,
                None => Value::Null,
            }
        };

        let active: Vec<StateId> = state.configuration.iter().rev().copied().collect();
        for id in active {
            let node = machine.node(id);
            for action in &node.exit {
                self.execute(state, action, event)?;
            }
            for invocation in node.invocations() {
                if let Some(child) = self.scope.child(invocation.id()) {
                    self.scope.release(&child);
                    self.effects.push(Effect::Stop(child));
                }
            }
        }
        for (id, _) in state.timers.drain() {
            self.effects.push(Effect::Cancel { id });
        }

        debug!(actor = self.actor, "reached final state");
        state.status = Status::Done;
        state.output = Some(output);
        state.internal.clear();
        Ok(())
    }

    fn execute(
        &mut self,
        state: &mut MachineState,
        action: &Action,
        event: &Event,
    ) -> Result<(), ActionError> {
        self.trace.push(Trace::Action {
            label: action.label().to_string(),
        });
        trace!(actor = self.actor, action = action.label(), "executing action");

        match action {
            Action::Assign { label, assign } => {
                let mut spawner = Spawner {
                    machine: self.machine,
                    scope: &mut *self.scope,
                    effects: &mut self.effects,
                };
                state.context = assign(&state.context, event, &mut spawner)
                    .map_err(|err| err.in_action(label))?;
            }
            Action::Raise {
                event: make,
                delay,
                id,
            } => {
                let raised = make(&state.context, event).map_err(|err| err.in_action("raise"))?;
                match delay {
                    None => state.internal.push_back(raised),
                    Some(delay) => {
                        let id = id.clone().unwrap_or_else(|| next_send_id(state));
                        self.effects.push(Effect::Schedule {
                            id,
                            delay: *delay,
                            to: None,
                            event: raised,
                            token: None,
                        });
                    }
                }
            }
            Action::SendTo {
                to,
                event: make,
                delay,
                id,
            } => {
                let Some(target) = self.recipient(state, to, event, "sendTo")? else {
                    warn!(actor = self.actor, recipient = ?to, "sendTo found no recipient, dropping event");
                    return Ok(());
                };
                let sent = make(&state.context, event).map_err(|err| err.in_action("sendTo"))?;
                match delay {
                    None => self.effects.push(Effect::Send {
                        to: target,
                        event: sent,
                    }),
                    Some(delay) => {
                        let id = id.clone().unwrap_or_else(|| next_send_id(state));
                        self.effects.push(Effect::Schedule {
                            id,
                            delay: *delay,
                            to: Some(target),
                            event: sent,
                            token: None,
                        });
                    }
                }
            }
            Action::SendParent { event: make } => {
                let sent = make(&state.context, event).map_err(|err| err.in_action("sendParent"))?;
                self.effects.push(Effect::SendParent { event: sent });
            }
            Action::Stop { target } => {
                let child = match (target, self.recipient(state, target, event, "stop")?) {
                    (_, Some(child)) if self.scope.owns(&child) => child,
                    (_, Some(child)) => return Err(ActionError::NotRunning(child.id().to_string())),
                    (Recipient::Child(id), None) => return Err(ActionError::NotRunning(id.clone())),
                    (_, None) => return Ok(()),
                };
                self.scope.release(&child);
                self.effects.push(Effect::Stop(child));
            }
            Action::Cancel { id } => {
                self.effects.push(Effect::Cancel { id: id.clone() });
            }
            Action::Log { message } => {
                info!(actor = self.actor, "{}", message(&state.context, event));
            }
            Action::Custom { name, run, params } => {
                let params = match params {
                    Some(params) => params(&state.context, event).map_err(|err| err.in_action(name))?,
                    None => Value::Null,
                };
                run(&state.context, event, &params).map_err(|err| err.in_action(name))?;
            }
            Action::Enqueue(enqueue) => {
                let machine = self.machine;
                let mut queue = ActionQueue::new(&machine.actions);
                enqueue(&state.context, event, &mut queue)
                    .map_err(|err| err.in_action("enqueue"))?;
                for queued in queue.into_actions() {
                    self.execute(state, &queued, event)?;
                }
            }
        }
        Ok(())
    }

    fn recipient(
        &self,
        state: &MachineState,
        recipient: &Recipient,
        event: &Event,
        action: &str,
    ) -> Result<Option<ActorRef>, ActionError> {
        match recipient {
            Recipient::Child(id) => Ok(self.scope.child(id)),
            Recipient::Ref(actor) => Ok(Some(actor.clone())),
            Recipient::Dynamic(target) => {
                target(&state.context, event).map_err(|err| err.in_action(action))
            }
        }
    }
}

fn next_send_id(state: &mut MachineState) -> String {
    let id = format!("machina.send.{}", state.next_send);
    state.next_send += 1;
    id
}
