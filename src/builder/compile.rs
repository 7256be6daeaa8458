//! Validation and resolution of a [`MachineBuilder`] into a [`Machine`].
//!
//! Every check runs even after an earlier one fails. Failures are
//! accumulated with `Validation` so a definition with several typos
//! reports all of them in one [`BuildError`].

use crate::actor::ActorLogic;
use crate::builder::error::{BuildError, DefinitionError};
use crate::builder::machine::{ContextSource, MachineBuilder};
use crate::builder::spec::{ActionSpec, DelaySpec, GuardSpec};
use crate::builder::state::{NodeKind, StateBuilder};
use crate::builder::transition::TransitionBuilder;
use crate::core::{
    after_kind, done_actor_kind, done_state_kind, error_actor_kind, Action, Context, ContextInit,
    Delay, DelayFn, DelayedTransition, EventPattern, Guard, Invocation, Machine, StateId,
    StateKind, StateNode, Transition, TransitionId, Trigger,
};
use crate::error::ActionError;
use std::collections::HashMap;
use std::sync::Arc;
use stillwater::validation::Validation;
use stillwater::NonEmptyVec;

type Checked<T> = Validation<T, NonEmptyVec<DefinitionError>>;

/// A state placed in the arena, before its references are resolved.
struct Flat<'b> {
    builder: &'b StateBuilder,
    parent: Option<StateId>,
    id: String,
    path: String,
    depth: usize,
    children: Vec<StateId>,
}

struct Compiler<'b> {
    machine_id: String,
    flat: Vec<Flat<'b>>,
    kinds: Vec<StateKind>,
    by_id: HashMap<String, StateId>,
    by_path: HashMap<String, StateId>,
    actions: &'b HashMap<String, Action>,
    guards: &'b HashMap<String, Guard>,
    delays: &'b HashMap<String, DelayFn>,
    actors: &'b HashMap<String, ActorLogic>,
    transitions: Vec<Transition>,
    checks: Vec<Checked<()>>,
}

pub(crate) fn compile(builder: MachineBuilder) -> Result<Machine, BuildError> {
    let MachineBuilder {
        root,
        context,
        actions,
        guards,
        delays,
        actors,
        output,
    } = builder;

    let mut compiler = Compiler {
        machine_id: root.key.clone(),
        flat: Vec::new(),
        kinds: Vec::new(),
        by_id: HashMap::new(),
        by_path: HashMap::new(),
        actions: &actions,
        guards: &guards,
        delays: &delays,
        actors: &actors,
        transitions: Vec::new(),
        checks: Vec::new(),
    };

    compiler.flatten(&root, None);
    compiler.classify();
    let context = compiler.context(context);
    let nodes: Vec<StateNode> = (0..compiler.flat.len())
        .map(|index| compiler.resolve_node(StateId(index)))
        .collect();
    let Compiler {
        machine_id,
        by_id,
        by_path,
        transitions,
        checks,
        ..
    } = compiler;

    if let Validation::Failure(errors) = Validation::all_vec(checks) {
        return Err(BuildError::Invalid {
            machine: machine_id,
            errors: errors.iter().cloned().collect(),
        });
    }

    Ok(Machine {
        id: machine_id,
        nodes,
        transitions,
        context,
        actions,
        actors,
        output,
        by_id,
        by_path,
    })
}

impl<'b> Compiler<'b> {
    fn report(&mut self, error: DefinitionError) {
        self.checks.push(Validation::fail(error));
    }

    fn keep<T>(&mut self, checked: Checked<T>) -> Option<T> {
        match checked {
            Validation::Success(value) => Some(value),
            Validation::Failure(errors) => {
                self.checks.push(Validation::Failure(errors));
                None
            }
        }
    }

    /// Number the tree in document order and register ids and paths.
    fn flatten(&mut self, state: &'b StateBuilder, parent: Option<StateId>) -> StateId {
        let index = StateId(self.flat.len());
        let (path, depth) = match parent {
            None => (String::new(), 0),
            Some(parent) => {
                let parent = &self.flat[parent.0];
                let path = if parent.path.is_empty() {
                    state.key.clone()
                } else {
                    format!("{}.{}", parent.path, state.key)
                };
                (path, parent.depth + 1)
            }
        };
        let id = match (&state.id, parent) {
            (Some(id), _) => id.clone(),
            (None, None) => state.key.clone(),
            (None, Some(_)) => format!("{}.{}", self.machine_id, path),
        };

        if parent.is_some() {
            self.check_key(&state.key);
        }
        if state.key.contains('#') && parent.is_none() {
            self.report(DefinitionError::InvalidStateKey {
                key: state.key.clone(),
                reason: "keys cannot contain '#'".to_string(),
            });
        }

        if self.by_path.insert(path.clone(), index).is_some() {
            let owner = parent.map(|p| self.flat[p.0].id.clone()).unwrap_or_default();
            self.report(DefinitionError::DuplicateStateKey {
                state: owner,
                key: state.key.clone(),
            });
        } else if self.by_id.insert(id.clone(), index).is_some() {
            self.report(DefinitionError::DuplicateStateId { id: id.clone() });
        }

        self.flat.push(Flat {
            builder: state,
            parent,
            id,
            path,
            depth,
            children: Vec::new(),
        });

        for child in &state.children {
            let child = self.flatten(child, Some(index));
            self.flat[index.0].children.push(child);
        }
        index
    }

    fn check_key(&mut self, key: &str) {
        let reason = if key.is_empty() {
            Some("keys cannot be empty")
        } else if key.contains('.') {
            Some("keys cannot contain '.'")
        } else if key.contains('#') {
            Some("keys cannot contain '#'")
        } else {
            None
        };
        if let Some(reason) = reason {
            self.report(DefinitionError::InvalidStateKey {
                key: key.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    /// Decide every node's kind and check the structural rules that
    /// depend on it.
    fn classify(&mut self) {
        for index in 0..self.flat.len() {
            let flat = &self.flat[index];
            let builder = flat.builder;
            let id = flat.id.clone();
            let has_children = !flat.children.is_empty();
            let kind = match builder.kind {
                NodeKind::Auto if has_children => StateKind::Compound,
                NodeKind::Auto => StateKind::Atomic,
                NodeKind::Parallel => {
                    if !has_children {
                        self.report(DefinitionError::EmptyParallel { state: id.clone() });
                    }
                    StateKind::Parallel
                }
                NodeKind::Final => {
                    if has_children {
                        self.report(DefinitionError::FinalStateWithChildren { state: id.clone() });
                    }
                    if !builder.on.is_empty()
                        || !builder.always.is_empty()
                        || !builder.after.is_empty()
                        || !builder.invoke.is_empty()
                        || !builder.on_done.is_empty()
                    {
                        self.report(DefinitionError::FinalStateWithTransitions {
                            state: id.clone(),
                        });
                    }
                    StateKind::Final
                }
                NodeKind::History(history) => {
                    if has_children {
                        self.report(DefinitionError::InvalidHistory {
                            state: id.clone(),
                            reason: "history states cannot have children".to_string(),
                        });
                    }
                    let parent_is_compound = self.flat[index]
                        .parent
                        .map(|parent| self.flat[parent.0].builder.kind == NodeKind::Auto)
                        .unwrap_or(false);
                    if !parent_is_compound {
                        self.report(DefinitionError::InvalidHistory {
                            state: id.clone(),
                            reason: "the parent must be a compound state".to_string(),
                        });
                    }
                    StateKind::History(history)
                }
            };
            self.kinds.push(kind);
        }
    }

    fn context(&mut self, source: ContextSource) -> ContextInit {
        match source {
            ContextSource::FromInput(compute) => ContextInit::FromInput(compute),
            ContextSource::Value(value) => match Context::from_value(value) {
                Ok(context) => ContextInit::Static(context),
                Err(ActionError::ContextNotObject { found }) => {
                    self.report(DefinitionError::ContextNotObject { found });
                    ContextInit::Static(Context::new())
                }
                Err(_) => ContextInit::Static(Context::new()),
            },
        }
    }

    fn resolve_node(&mut self, index: StateId) -> StateNode {
        let flat = &self.flat[index.0];
        let builder = flat.builder;
        let kind = self.kinds[index.0];
        let id = flat.id.clone();
        let parent = flat.parent;
        let children = flat.children.clone();
        let path = flat.path.clone();
        let depth = flat.depth;

        let initial = match kind {
            StateKind::Compound => self.resolve_initial(index),
            _ => None,
        };

        let entry = self.resolve_actions(&id, &builder.entry).unwrap_or_default();
        let exit = self.resolve_actions(&id, &builder.exit).unwrap_or_default();

        let mut on = Vec::new();
        for (descriptor, transition) in &builder.on {
            match EventPattern::parse(descriptor) {
                Ok(pattern) => {
                    if let Some(tid) = self.transition(index, Trigger::Event(pattern), transition) {
                        on.push(tid);
                    }
                }
                Err(reason) => self.report(DefinitionError::InvalidEventPattern {
                    state: id.clone(),
                    reason,
                }),
            }
        }

        let mut delayed = Vec::new();
        for (slot, (delay, transitions)) in group_by_delay(&builder.after).into_iter().enumerate() {
            let event = after_kind(&id, slot);
            if let Some(delay) = self.resolve_delay(&id, delay) {
                delayed.push(DelayedTransition {
                    delay,
                    event: event.clone(),
                });
            }
            for transition in transitions {
                let trigger = Trigger::Event(EventPattern::Exact(event.clone()));
                if let Some(tid) = self.transition(index, trigger, transition) {
                    on.push(tid);
                }
            }
        }

        let mut invocations = Vec::new();
        for (slot, invoke) in builder.invoke.iter().enumerate() {
            if !self.actors.contains_key(&invoke.src) {
                self.report(DefinitionError::UnknownActor {
                    state: id.clone(),
                    src: invoke.src.clone(),
                });
            }
            let actor_id = invoke.id.clone().unwrap_or_else(|| format!("{id}:{slot}"));
            let outcomes = [
                (done_actor_kind(&actor_id), &invoke.on_done),
                (error_actor_kind(&actor_id), &invoke.on_error),
            ];
            for (event, transitions) in outcomes {
                for transition in transitions {
                    let trigger = Trigger::Event(EventPattern::Exact(event.clone()));
                    if let Some(tid) = self.transition(index, trigger, transition) {
                        on.push(tid);
                    }
                }
            }
            invocations.push(Invocation {
                id: actor_id,
                src: invoke.src.clone(),
                input: invoke.input.clone(),
            });
        }

        let done_event = done_state_kind(&id);
        for transition in &builder.on_done {
            let trigger = Trigger::Event(EventPattern::Exact(done_event.clone()));
            if let Some(tid) = self.transition(index, trigger, transition) {
                on.push(tid);
            }
        }

        let mut always = Vec::new();
        for transition in &builder.always {
            if let Some(tid) = self.transition(index, Trigger::Always, transition) {
                always.push(tid);
            }
        }

        // Most specific pattern first; ties keep declaration order.
        on.sort_by_key(|tid| match &self.transitions[tid.0].trigger {
            Trigger::Event(pattern) => std::cmp::Reverse(pattern.specificity()),
            Trigger::Always => std::cmp::Reverse((0, 0)),
        });

        let history_default = match (&builder.history_default, kind) {
            (Some(target), StateKind::History(_)) => match self.resolve_target(index, target) {
                Some(target) => vec![target],
                None => {
                    self.report(DefinitionError::DanglingTarget {
                        state: id.clone(),
                        target: target.clone(),
                    });
                    Vec::new()
                }
            },
            _ => Vec::new(),
        };

        StateNode {
            index,
            key: builder.key.clone(),
            id,
            path,
            kind,
            parent,
            children,
            initial,
            entry,
            exit,
            on,
            always,
            delayed,
            invocations,
            tags: builder.tags.clone(),
            history_default,
            output: builder.output.clone(),
            description: builder.description.clone(),
            depth,
        }
    }

    fn resolve_initial(&mut self, index: StateId) -> Option<StateId> {
        let flat = &self.flat[index.0];
        let state = flat.id.clone();
        let Some(initial) = flat.builder.initial.clone() else {
            self.report(DefinitionError::MissingInitialState { state });
            return None;
        };
        let found = flat.children.iter().copied().find(|child| {
            self.flat[child.0].builder.key == initial
                && !matches!(self.kinds[child.0], StateKind::History(_))
        });
        if found.is_none() {
            self.report(DefinitionError::UnknownInitialState { state, initial });
        }
        found
    }

    fn transition(
        &mut self,
        source: StateId,
        trigger: Trigger,
        builder: &TransitionBuilder,
    ) -> Option<TransitionId> {
        let state = self.flat[source.0].id.clone();

        let targets = Validation::all_vec(
            builder
                .targets
                .iter()
                .map(|target| match self.resolve_target(source, target) {
                    Some(id) => Validation::success(id),
                    None => Validation::fail(DefinitionError::DanglingTarget {
                        state: state.clone(),
                        target: target.clone(),
                    }),
                })
                .collect(),
        );
        let guard = match &builder.guard {
            Some(spec) => self.resolve_guard(&state, spec).map(Some),
            None => Validation::success(None),
        };

        let targets = self.keep(targets);
        let guard = self.keep(guard);
        let actions = self.resolve_actions(&state, &builder.actions);
        let (targets, guard, actions) = (targets?, guard?, actions?);

        let id = TransitionId(self.transitions.len());
        self.transitions.push(Transition {
            id,
            source,
            trigger,
            guard,
            targets,
            actions,
            reenter: builder.reenter,
            description: builder.description.clone(),
        });
        Some(id)
    }

    /// Resolve `Sibling`, `Sibling.Child`, `.Child` and `#id` (optionally
    /// followed by `.Child`) against `source`.
    fn resolve_target(&self, source: StateId, target: &str) -> Option<StateId> {
        if let Some(id) = target.strip_prefix('#') {
            if let Some(&state) = self.by_id.get(id) {
                return Some(state);
            }
            let mut end = id.len();
            while let Some(dot) = id[..end].rfind('.') {
                if let Some(&base) = self.by_id.get(&id[..dot]) {
                    return self.descend(base, &id[dot + 1..]);
                }
                end = dot;
            }
            None
        } else if let Some(path) = target.strip_prefix('.') {
            self.descend(source, path)
        } else {
            let base = self.flat[source.0].parent.unwrap_or(source);
            self.descend(base, target)
        }
    }

    fn descend(&self, from: StateId, path: &str) -> Option<StateId> {
        path.split('.').try_fold(from, |current, key| {
            self.flat[current.0]
                .children
                .iter()
                .copied()
                .find(|child| self.flat[child.0].builder.key == key)
        })
    }

    fn resolve_guard(&self, state: &str, spec: &GuardSpec) -> Checked<Guard> {
        match spec {
            GuardSpec::Named(name) => match self.guards.get(name) {
                Some(guard) => Validation::success(guard.clone().labeled(name.clone())),
                None => Validation::fail(DefinitionError::UnknownGuard {
                    state: state.to_string(),
                    guard: name.clone(),
                }),
            },
            GuardSpec::Inline(guard) => Validation::success(guard.clone()),
            GuardSpec::Not(inner) => self.resolve_guard(state, inner).map(Guard::not),
            GuardSpec::And(guards) => Validation::all_vec(
                guards
                    .iter()
                    .map(|guard| self.resolve_guard(state, guard))
                    .collect(),
            )
            .map(Guard::and),
            GuardSpec::Or(guards) => Validation::all_vec(
                guards
                    .iter()
                    .map(|guard| self.resolve_guard(state, guard))
                    .collect(),
            )
            .map(Guard::or),
        }
    }

    fn resolve_actions(&mut self, state: &str, specs: &[ActionSpec]) -> Option<Vec<Action>> {
        let resolved = Validation::all_vec(
            specs
                .iter()
                .map(|spec| self.resolve_action(state, spec))
                .collect(),
        );
        self.keep(resolved)
    }

    fn resolve_action(&self, state: &str, spec: &ActionSpec) -> Checked<Action> {
        let (name, params) = match spec {
            ActionSpec::Inline(action) => return Validation::success(action.clone()),
            ActionSpec::Named { name, params } => (name, params),
        };
        match (self.actions.get(name), params) {
            (None, _) => Validation::fail(DefinitionError::UnknownAction {
                state: state.to_string(),
                action: name.clone(),
            }),
            (Some(action), None) => Validation::success(action.clone().relabel(name)),
            (Some(Action::Custom { run, .. }), Some(params)) => {
                let params = params.clone();
                Validation::success(Action::Custom {
                    name: name.clone(),
                    run: run.clone(),
                    params: Some(Arc::new(move |_, _| Ok(params.clone()))),
                })
            }
            (Some(_), Some(_)) => Validation::fail(DefinitionError::ParamsOnBuiltinAction {
                state: state.to_string(),
                action: name.clone(),
            }),
        }
    }

    fn resolve_delay(&mut self, state: &str, spec: &DelaySpec) -> Option<Delay> {
        match spec {
            DelaySpec::Fixed(duration) => Some(Delay::Fixed(*duration)),
            DelaySpec::Named(name) => match self.delays.get(name) {
                Some(compute) => Some(Delay::Computed {
                    name: name.clone(),
                    compute: compute.clone(),
                }),
                None => {
                    self.report(DefinitionError::UnknownDelay {
                        state: state.to_string(),
                        delay: name.clone(),
                    });
                    None
                }
            },
        }
    }
}

/// Group `after` candidates by delay, keeping first-appearance order.
fn group_by_delay(after: &[(DelaySpec, TransitionBuilder)]) -> Vec<(&DelaySpec, Vec<&TransitionBuilder>)> {
    let mut groups: Vec<(&DelaySpec, Vec<&TransitionBuilder>)> = Vec::new();
    for (delay, transition) in after {
        match groups.iter_mut().find(|(existing, _)| *existing == delay) {
            Some((_, transitions)) => transitions.push(transition),
            None => groups.push((delay, vec![transition])),
        }
    }
    groups
}
