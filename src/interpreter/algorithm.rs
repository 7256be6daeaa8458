//! Transition selection and the exit and entry sets of a microstep.
//!
//! These functions are pure: they read the machine, the configuration and
//! the history memory and return the states or transitions involved. The
//! order of every returned collection is fixed, so a microstep is fully
//! determined by its inputs.

use super::configuration::Configuration;
use crate::core::{
    Context, Event, HistoryKind, HistoryMemory, Machine, StateId, StateKind, TransitionId,
};
use crate::error::ActionError;
use std::collections::BTreeSet;

/// Select the transitions an event enables.
///
/// For every active atomic state, walk from the state up through its
/// ancestors and take the first candidate whose pattern matches and whose
/// guard passes. Conflicting selections are then removed.
pub(crate) fn select_transitions(
    machine: &Machine,
    configuration: &Configuration,
    history: &HistoryMemory,
    context: &Context,
    event: &Event,
) -> Result<Vec<TransitionId>, ActionError> {
    select(machine, configuration, history, |state| {
        for tid in &machine.node(state).on {
            let transition = machine.transition(*tid);
            if transition.matches(event.kind()) && transition.enabled(context, event)? {
                return Ok(Some(*tid));
            }
        }
        Ok(None)
    })
}

/// Select the eventless transitions enabled in the current configuration.
pub(crate) fn select_eventless(
    machine: &Machine,
    configuration: &Configuration,
    history: &HistoryMemory,
    context: &Context,
    event: &Event,
) -> Result<Vec<TransitionId>, ActionError> {
    select(machine, configuration, history, |state| {
        for tid in &machine.node(state).always {
            if machine.transition(*tid).enabled(context, event)? {
                return Ok(Some(*tid));
            }
        }
        Ok(None)
    })
}

fn select<F>(
    machine: &Machine,
    configuration: &Configuration,
    history: &HistoryMemory,
    mut first_enabled: F,
) -> Result<Vec<TransitionId>, ActionError>
where
    F: FnMut(StateId) -> Result<Option<TransitionId>, ActionError>,
{
    let mut enabled: Vec<TransitionId> = Vec::new();
    let atomic = configuration
        .iter()
        .copied()
        .filter(|state| machine.node(*state).kind().is_atomic());

    for state in atomic {
        let lineage = std::iter::once(state).chain(machine.ancestors(state));
        for candidate in lineage {
            if let Some(tid) = first_enabled(candidate)? {
                if !enabled.contains(&tid) {
                    enabled.push(tid);
                }
                break;
            }
        }
    }

    Ok(remove_conflicts(machine, configuration, history, enabled))
}

/// Drop transitions whose exit sets intersect an earlier one's. A
/// transition from a descendant state preempts one from its ancestor;
/// otherwise the earlier selection wins.
fn remove_conflicts(
    machine: &Machine,
    configuration: &Configuration,
    history: &HistoryMemory,
    enabled: Vec<TransitionId>,
) -> Vec<TransitionId> {
    let mut filtered: Vec<(TransitionId, BTreeSet<StateId>)> = Vec::new();

    for t1 in enabled {
        let exits1 = exit_set(machine, configuration, history, &[t1]);
        let mut preempted = false;
        let mut displaced = Vec::new();

        for (index, (t2, exits2)) in filtered.iter().enumerate() {
            if exits1.intersection(exits2).next().is_none() {
                continue;
            }
            let source1 = machine.transition(t1).source();
            let source2 = machine.transition(*t2).source();
            if machine.is_descendant(source1, source2) {
                displaced.push(index);
            } else {
                preempted = true;
                break;
            }
        }

        if !preempted {
            for index in displaced.into_iter().rev() {
                filtered.remove(index);
            }
            filtered.push((t1, exits1));
        }
    }

    filtered.into_iter().map(|(tid, _)| tid).collect()
}

/// Targets a transition enters, with a targetless reentering transition
/// targeting its own source.
fn declared_targets(machine: &Machine, tid: TransitionId) -> Vec<StateId> {
    let transition = machine.transition(tid);
    if transition.targets().is_empty() && transition.reenter() {
        vec![transition.source()]
    } else {
        transition.targets().to_vec()
    }
}

/// Declared targets with history states replaced by what they restore.
fn effective_targets(machine: &Machine, history: &HistoryMemory, tid: TransitionId) -> Vec<StateId> {
    let mut targets = Vec::new();
    for target in declared_targets(machine, tid) {
        if machine.node(target).is_history() {
            for restored in history_targets(machine, history, target) {
                if !targets.contains(&restored) {
                    targets.push(restored);
                }
            }
        } else if !targets.contains(&target) {
            targets.push(target);
        }
    }
    targets
}

/// What a history state restores: recorded states, else its default
/// target, else its parent's initial state.
fn history_targets(machine: &Machine, history: &HistoryMemory, state: StateId) -> Vec<StateId> {
    if let Some(recorded) = history.recall(state) {
        return recorded.to_vec();
    }
    let node = machine.node(state);
    if !node.history_default.is_empty() {
        return node.history_default.clone();
    }
    node.parent()
        .and_then(|parent| machine.node(parent).initial())
        .into_iter()
        .collect()
}

/// The state whose active descendants a transition exits. `None` means the
/// whole configuration, root included.
pub(crate) fn transition_domain(
    machine: &Machine,
    history: &HistoryMemory,
    tid: TransitionId,
) -> Option<StateId> {
    let transition = machine.transition(tid);
    let source = transition.source();
    let targets = effective_targets(machine, history, tid);

    if !transition.reenter()
        && targets
            .iter()
            .all(|target| *target == source || machine.is_descendant(*target, source))
    {
        return Some(source);
    }

    let lcca = machine.ancestors(source).find(|ancestor| {
        targets
            .iter()
            .all(|target| machine.is_descendant(*target, *ancestor))
    });
    match lcca {
        Some(lcca) => Some(lcca),
        None if transition.reenter() => None,
        None => Some(StateId::ROOT),
    }
}

/// States exited by `transitions`, in exit order (deepest and latest
/// first).
pub(crate) fn exit_set(
    machine: &Machine,
    configuration: &Configuration,
    history: &HistoryMemory,
    transitions: &[TransitionId],
) -> BTreeSet<StateId> {
    let mut exits = BTreeSet::new();
    for tid in transitions {
        if machine.transition(*tid).is_internal_only() {
            continue;
        }
        match transition_domain(machine, history, *tid) {
            Some(domain) => exits.extend(
                configuration
                    .iter()
                    .copied()
                    .filter(|state| machine.is_descendant(*state, domain)),
            ),
            None => exits.extend(configuration.iter().copied()),
        }
    }
    exits
}

/// States entered by `transitions`, in document order.
pub(crate) fn entry_set(
    machine: &Machine,
    history: &HistoryMemory,
    transitions: &[TransitionId],
) -> BTreeSet<StateId> {
    let mut entering = BTreeSet::new();
    for tid in transitions {
        if machine.transition(*tid).is_internal_only() {
            continue;
        }
        let domain = transition_domain(machine, history, *tid);
        for target in declared_targets(machine, *tid) {
            add_descendants(machine, history, target, &mut entering);
        }
        for target in effective_targets(machine, history, *tid) {
            add_ancestors(machine, history, target, domain, &mut entering);
        }
    }
    entering
}

/// States entered when a machine starts.
pub(crate) fn initial_entry_set(machine: &Machine, history: &HistoryMemory) -> BTreeSet<StateId> {
    let mut entering = BTreeSet::new();
    add_descendants(machine, history, StateId::ROOT, &mut entering);
    entering
}

fn add_descendants(
    machine: &Machine,
    history: &HistoryMemory,
    state: StateId,
    entering: &mut BTreeSet<StateId>,
) {
    let node = machine.node(state);
    if node.is_history() {
        let parent = node.parent().unwrap_or(StateId::ROOT);
        let restored = history_targets(machine, history, state);
        for target in &restored {
            add_descendants(machine, history, *target, entering);
        }
        for target in &restored {
            add_ancestors(machine, history, *target, Some(parent), entering);
        }
        return;
    }

    entering.insert(state);
    match node.kind() {
        StateKind::Compound => {
            if let Some(initial) = node.initial() {
                add_descendants(machine, history, initial, entering);
            }
        }
        StateKind::Parallel => fill_regions(machine, history, state, entering),
        _ => {}
    }
}

/// Add the proper ancestors of `state` below `domain`, filling in the
/// regions of any parallel ancestor.
fn add_ancestors(
    machine: &Machine,
    history: &HistoryMemory,
    state: StateId,
    domain: Option<StateId>,
    entering: &mut BTreeSet<StateId>,
) {
    for ancestor in machine.ancestors(state) {
        if Some(ancestor) == domain {
            break;
        }
        entering.insert(ancestor);
        if machine.node(ancestor).kind() == StateKind::Parallel {
            fill_regions(machine, history, ancestor, entering);
        }
    }
}

fn fill_regions(
    machine: &Machine,
    history: &HistoryMemory,
    parallel: StateId,
    entering: &mut BTreeSet<StateId>,
) {
    for region in machine.node(parallel).children() {
        if machine.node(*region).is_history() {
            continue;
        }
        let covered = entering
            .iter()
            .any(|state| state == region || machine.is_descendant(*state, *region));
        if !covered {
            add_descendants(machine, history, *region, entering);
        }
    }
}

/// Record history for every exited state that has history children,
/// using the configuration before anything is exited.
pub(crate) fn record_history(
    machine: &Machine,
    configuration: &Configuration,
    exits: &BTreeSet<StateId>,
    history: &HistoryMemory,
) -> HistoryMemory {
    let mut memory = history.clone();
    for state in exits {
        for child in machine.node(*state).children() {
            let Some(kind) = machine.node(*child).history_kind() else {
                continue;
            };
            let recorded: Vec<StateId> = configuration
                .iter()
                .copied()
                .filter(|active| match kind {
                    HistoryKind::Deep => {
                        machine.node(*active).kind().is_atomic()
                            && machine.is_descendant(*active, *state)
                    }
                    HistoryKind::Shallow => machine.node(*active).parent() == Some(*state),
                })
                .collect();
            memory = memory.record(*child, recorded);
        }
    }
    memory
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder, TransitionBuilder};

    fn configuration_of(machine: &Machine, paths: &[&str]) -> Configuration {
        let mut configuration = Configuration::new();
        configuration.insert(StateId::ROOT);
        for path in paths {
            configuration.insert(machine.find(path).unwrap());
        }
        configuration
    }

    fn paths(machine: &Machine, states: impl IntoIterator<Item = StateId>) -> Vec<String> {
        states
            .into_iter()
            .map(|state| machine.node(state).path().to_string())
            .collect()
    }

    fn first_transition(machine: &Machine, path: &str) -> TransitionId {
        machine.node(machine.find(path).unwrap()).on[0]
    }

    #[test]
    fn deepest_state_wins_over_ancestor() {
        let machine = MachineBuilder::new("m")
            .initial("A")
            .state(
                StateBuilder::new("A")
                    .initial("B")
                    .on("go", "C")
                    .state(StateBuilder::new("B").on("go", "D"))
                    .state(StateBuilder::new("D")),
            )
            .state(StateBuilder::new("C"))
            .build()
            .unwrap();

        let configuration = configuration_of(&machine, &["A", "A.B"]);
        let selected = select_transitions(
            &machine,
            &configuration,
            &HistoryMemory::new(),
            &Context::new(),
            &Event::new("go"),
        )
        .unwrap();
        assert_eq!(selected, vec![first_transition(&machine, "A.B")]);
    }

    #[test]
    fn self_target_without_reenter_exits_nothing() {
        let machine = MachineBuilder::new("m")
            .initial("Debouncing")
            .state(
                StateBuilder::new("Debouncing")
                    .on("click", "Debouncing")
                    .on("tap", TransitionBuilder::to("Debouncing").reenter(true)),
            )
            .build()
            .unwrap();
        let configuration = configuration_of(&machine, &["Debouncing"]);
        let history = HistoryMemory::new();
        let debouncing = machine.node(machine.find("Debouncing").unwrap());

        let plain = debouncing.on[0];
        assert!(exit_set(&machine, &configuration, &history, &[plain]).is_empty());

        let reenter = debouncing.on[1];
        assert_eq!(
            paths(&machine, exit_set(&machine, &configuration, &history, &[reenter])),
            vec!["Debouncing"]
        );
        assert_eq!(
            paths(&machine, entry_set(&machine, &history, &[reenter])),
            vec!["Debouncing"]
        );
    }

    #[test]
    fn entering_a_parallel_descendant_fills_sibling_regions() {
        let machine = MachineBuilder::new("m")
            .initial("Off")
            .state(StateBuilder::new("Off").on("go", "On.Video.Playing"))
            .state(
                StateBuilder::parallel("On")
                    .state(
                        StateBuilder::new("Video")
                            .initial("Paused")
                            .state(StateBuilder::new("Paused"))
                            .state(StateBuilder::new("Playing")),
                    )
                    .state(
                        StateBuilder::new("Volume")
                            .initial("Unmuted")
                            .state(StateBuilder::new("Unmuted")),
                    ),
            )
            .build()
            .unwrap();

        let tid = first_transition(&machine, "Off");
        let entered = entry_set(&machine, &HistoryMemory::new(), &[tid]);
        assert_eq!(
            paths(&machine, entered),
            vec!["On", "On.Video", "On.Video.Playing", "On.Volume", "On.Volume.Unmuted"]
        );
    }

    #[test]
    fn parallel_regions_both_fire_without_conflict() {
        let machine = MachineBuilder::new("m")
            .parallel()
            .state(
                StateBuilder::new("A")
                    .initial("X")
                    .state(StateBuilder::new("X").on("go", "Y"))
                    .state(StateBuilder::new("Y")),
            )
            .state(
                StateBuilder::new("B")
                    .initial("X")
                    .state(StateBuilder::new("X").on("go", "Y"))
                    .state(StateBuilder::new("Y")),
            )
            .build()
            .unwrap();

        let configuration = configuration_of(&machine, &["A", "A.X", "B", "B.X"]);
        let selected = select_transitions(
            &machine,
            &configuration,
            &HistoryMemory::new(),
            &Context::new(),
            &Event::new("go"),
        )
        .unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn conflicting_transitions_keep_the_first() {
        let machine = MachineBuilder::new("m")
            .initial("P")
            .state(
                StateBuilder::parallel("P")
                    .state(
                        StateBuilder::new("A")
                            .initial("X")
                            .state(StateBuilder::new("X").on("go", "#m.Out")),
                    )
                    .state(
                        StateBuilder::new("B")
                            .initial("X")
                            .state(StateBuilder::new("X").on("go", "#m.Other")),
                    ),
            )
            .state(StateBuilder::new("Out"))
            .state(StateBuilder::new("Other"))
            .build()
            .unwrap();

        let configuration = configuration_of(&machine, &["P", "P.A", "P.A.X", "P.B", "P.B.X"]);
        let selected = select_transitions(
            &machine,
            &configuration,
            &HistoryMemory::new(),
            &Context::new(),
            &Event::new("go"),
        )
        .unwrap();
        assert_eq!(selected, vec![first_transition(&machine, "P.A.X")]);
    }

    #[test]
    fn history_restores_recorded_children() {
        let machine = MachineBuilder::new("m")
            .initial("Player")
            .state(
                StateBuilder::new("Player")
                    .initial("Paused")
                    .on("hide", "Hidden")
                    .state(StateBuilder::new("Paused"))
                    .state(StateBuilder::new("Playing"))
                    .state(StateBuilder::history("Hist", HistoryKind::Shallow)),
            )
            .state(StateBuilder::new("Hidden").on("show", "Player.Hist"))
            .build()
            .unwrap();

        let before = configuration_of(&machine, &["Player", "Player.Playing"]);
        let hide = first_transition(&machine, "Player");
        let exits = exit_set(&machine, &before, &HistoryMemory::new(), &[hide]);
        let memory = record_history(&machine, &before, &exits, &HistoryMemory::new());

        let show = first_transition(&machine, "Hidden");
        assert_eq!(
            paths(&machine, entry_set(&machine, &memory, &[show])),
            vec!["Player", "Player.Playing"]
        );
        assert_eq!(
            paths(&machine, entry_set(&machine, &HistoryMemory::new(), &[show])),
            vec!["Player", "Player.Paused"]
        );
    }
}
