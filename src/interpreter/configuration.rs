//! Queries over a configuration, the set of active states.

use crate::core::{Machine, StateId, StateKind};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub(crate) type Configuration = BTreeSet<StateId>;

/// Whether `state` has reached completion: an active final child for a
/// compound state, every region complete for a parallel state.
pub(crate) fn is_in_final_state(
    machine: &Machine,
    configuration: &Configuration,
    state: StateId,
) -> bool {
    let node = machine.node(state);
    match node.kind() {
        StateKind::Compound => node.children().iter().any(|child| {
            configuration.contains(child) && machine.node(*child).is_final()
        }),
        StateKind::Parallel => node
            .children()
            .iter()
            .filter(|child| !machine.node(**child).is_history())
            .all(|child| is_in_final_state(machine, configuration, *child)),
        StateKind::Final => configuration.contains(&state),
        StateKind::Atomic | StateKind::History(_) => false,
    }
}

/// Nested JSON value of the active states under `state`.
///
/// A compound state whose active child is atomic maps to the child's key;
/// otherwise each active child maps to its own value.
pub(crate) fn state_value(machine: &Machine, configuration: &Configuration, state: StateId) -> Value {
    let node = machine.node(state);
    match node.kind() {
        StateKind::Compound => {
            let active = node
                .children()
                .iter()
                .copied()
                .find(|child| configuration.contains(child));
            match active {
                Some(child) if machine.node(child).kind().is_atomic() => {
                    Value::String(machine.node(child).key().to_string())
                }
                Some(child) => {
                    let mut map = Map::new();
                    map.insert(
                        machine.node(child).key().to_string(),
                        state_value(machine, configuration, child),
                    );
                    Value::Object(map)
                }
                None => Value::Object(Map::new()),
            }
        }
        StateKind::Parallel => Value::Object(
            node.children()
                .iter()
                .copied()
                .filter(|child| configuration.contains(child))
                .map(|child| {
                    (
                        machine.node(child).key().to_string(),
                        state_value(machine, configuration, child),
                    )
                })
                .collect(),
        ),
        _ => Value::Object(Map::new()),
    }
}

/// Tags of every active state, sorted and deduplicated.
pub(crate) fn active_tags(machine: &Machine, configuration: &Configuration) -> Vec<String> {
    configuration
        .iter()
        .flat_map(|state| machine.node(*state).tags().iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Check that a configuration is legal: the root is active, every active
/// state's parent is active, compound states have exactly one active child
/// and parallel states have all of theirs.
pub(crate) fn check_complete(machine: &Machine, configuration: &Configuration) -> Result<(), String> {
    if !configuration.contains(&StateId::ROOT) {
        return Err("the root state is not active".to_string());
    }
    for state in configuration {
        let node = machine.node(*state);
        if let Some(parent) = node.parent() {
            if !configuration.contains(&parent) {
                return Err(format!(
                    "'{}' is active but its parent is not",
                    node.id()
                ));
            }
        }
        let active = node
            .children()
            .iter()
            .filter(|child| configuration.contains(child))
            .count();
        match node.kind() {
            StateKind::Compound if active != 1 => {
                return Err(format!(
                    "compound state '{}' has {active} active children",
                    node.id()
                ));
            }
            StateKind::Parallel => {
                let regions = node
                    .children()
                    .iter()
                    .filter(|child| !machine.node(**child).is_history())
                    .count();
                if active != regions {
                    return Err(format!(
                        "parallel state '{}' has {active} of {regions} regions active",
                        node.id()
                    ));
                }
            }
            StateKind::History(_) => {
                return Err(format!("history state '{}' is active", node.id()));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{MachineBuilder, StateBuilder};
    use serde_json::json;

    fn player() -> Machine {
        MachineBuilder::new("player")
            .parallel()
            .state(
                StateBuilder::new("Video")
                    .initial("Paused")
                    .state(StateBuilder::new("Paused").tag("idle"))
                    .state(StateBuilder::new("Playing").tag("busy")),
            )
            .state(
                StateBuilder::new("Volume")
                    .initial("On")
                    .state(StateBuilder::new("On").tag("idle"))
                    .state(StateBuilder::new("Muted")),
            )
            .build()
            .unwrap()
    }

    fn active(machine: &Machine, paths: &[&str]) -> Configuration {
        let mut configuration = Configuration::new();
        configuration.insert(StateId::ROOT);
        for path in paths {
            configuration.insert(machine.find(path).unwrap());
        }
        configuration
    }

    #[test]
    fn state_value_nests_parallel_regions() {
        let machine = player();
        let configuration = active(&machine, &["Video", "Video.Paused", "Volume", "Volume.On"]);
        assert_eq!(
            state_value(&machine, &configuration, StateId::ROOT),
            json!({ "Video": "Paused", "Volume": "On" })
        );
        assert_eq!(active_tags(&machine, &configuration), vec!["idle".to_string()]);
    }

    #[test]
    fn completeness_rejects_missing_regions() {
        let machine = player();
        let complete = active(&machine, &["Video", "Video.Paused", "Volume", "Volume.On"]);
        assert!(check_complete(&machine, &complete).is_ok());

        let missing = active(&machine, &["Video", "Video.Paused"]);
        assert!(check_complete(&machine, &missing).is_err());

        let doubled = active(
            &machine,
            &["Video", "Video.Paused", "Video.Playing", "Volume", "Volume.On"],
        );
        assert!(check_complete(&machine, &doubled)
            .unwrap_err()
            .contains("2 active children"));
    }

    #[test]
    fn parallel_is_final_when_every_region_is() {
        let machine = MachineBuilder::new("m")
            .parallel()
            .state(
                StateBuilder::new("A")
                    .initial("Done")
                    .state(StateBuilder::final_state("Done")),
            )
            .state(
                StateBuilder::new("B")
                    .initial("Working")
                    .state(StateBuilder::new("Working"))
                    .state(StateBuilder::final_state("Done")),
            )
            .build()
            .unwrap();

        let working = active(&machine, &["A", "A.Done", "B", "B.Working"]);
        assert!(!is_in_final_state(&machine, &working, StateId::ROOT));
        assert!(is_in_final_state(&machine, &working, machine.find("A").unwrap()));

        let done = active(&machine, &["A", "A.Done", "B", "B.Done"]);
        assert!(is_in_final_state(&machine, &done, StateId::ROOT));
    }
}
