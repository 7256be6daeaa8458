//! Property-based tests for the interpreter and actor system.
//!
//! These tests use proptest to drive machines with random event
//! sequences and check properties that must hold after every step.

mod common;

use machina::actor::{ActorOptions, ActorSystem};
use machina::builder::{MachineBuilder, StateBuilder, TransitionBuilder};
use machina::core::{EventPattern, HistoryKind, Machine, StateKind};
use machina::Snapshot;
use proptest::prelude::*;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
enum Step {
    Send(&'static str),
    Advance(u64),
}

fn steps(events: &'static [&'static str]) -> impl Strategy<Value = Vec<Step>> {
    let step = prop_oneof![
        3 => proptest::sample::select(events).prop_map(Step::Send),
        1 => (0..2500u64).prop_map(Step::Advance),
    ];
    proptest::collection::vec(step, 0..40)
}

/// Run `steps` against a fresh system and collect every snapshot observed
/// after a step.
fn run(machine: Machine, steps: &[Step]) -> Vec<Snapshot> {
    let system = ActorSystem::new();
    let actor = system
        .create_actor(machine, ActorOptions::new())
        .expect("fresh system");
    actor.start().expect("not started yet");
    let mut seen = vec![actor.snapshot().expect("published on start")];
    for step in steps {
        match step {
            Step::Send(event) => actor.send(*event).expect("system is idle"),
            Step::Advance(millis) => system.advance(common::ms(*millis)).expect("system is idle"),
        }
        seen.push(actor.snapshot().expect("root snapshots are kept"));
    }
    seen
}

/// Check that the active states form a legal configuration of `machine`.
fn check_configuration(machine: &Machine, snapshot: &Snapshot) -> Result<(), String> {
    let by_id: HashMap<&str, usize> = machine
        .nodes()
        .iter()
        .enumerate()
        .map(|(index, node)| (node.id(), index))
        .collect();
    let active: HashSet<usize> = snapshot
        .configuration()
        .iter()
        .map(|id| by_id.get(id.as_str()).copied().ok_or(format!("unknown state '{id}'")))
        .collect::<Result<_, _>>()?;

    if !active.contains(&0) {
        return Err("root is not active".to_string());
    }
    for &index in &active {
        let node = &machine.nodes()[index];
        if let Some(parent) = node.parent() {
            if !active.contains(&parent.index()) {
                return Err(format!("'{}' is active without its parent", node.id()));
            }
        }
        let children: Vec<usize> = node
            .children()
            .iter()
            .map(|child| child.index())
            .filter(|child| !matches!(machine.nodes()[*child].kind(), StateKind::History(_)))
            .collect();
        let active_children = children.iter().filter(|child| active.contains(child)).count();
        match node.kind() {
            StateKind::Compound if active_children != 1 => {
                return Err(format!("'{}' has {active_children} active children", node.id()));
            }
            StateKind::Parallel if active_children != children.len() => {
                return Err(format!("'{}' has an inactive region", node.id()));
            }
            StateKind::History(_) => {
                return Err(format!("history state '{}' is active", node.id()));
            }
            _ => {}
        }
    }
    Ok(())
}

fn with_history() -> Machine {
    MachineBuilder::new("player")
        .initial("Off")
        .state(StateBuilder::new("Off").on("power", "On.Resume"))
        .state(
            StateBuilder::new("On")
                .initial("Menu")
                .state(StateBuilder::history("Resume", HistoryKind::Deep).default_target("Menu"))
                .state(StateBuilder::new("Menu").on("select", "Game"))
                .state(
                    StateBuilder::new("Game")
                        .initial("Level one")
                        .state(StateBuilder::new("Level one").on("next", "Level two"))
                        .state(StateBuilder::new("Level two").after(700, "Level one"))
                        .on("back", "Menu"),
                )
                .on("power", "Off"),
        )
        .build()
        .expect("history machine is valid")
}

const PLAYER_EVENTS: &[&str] = &["play", "pause", "toggle", "toggle.click", "metadata.loaded", "waiting", "canplay", "hover.hovering", "hover.end", "play-state-animation.end", "fullscreen.toggle", "fullscreen.expanded", "fullscreen.exited", "fullscreen.error"];
const HISTORY_EVENTS: &[&str] = &["power", "select", "next", "back"];
const COUNTER_EVENTS: &[&str] = &["click", "reset", "unknown"];

proptest! {
    #[test]
    fn configurations_stay_legal(steps in steps(PLAYER_EVENTS)) {
        let machine = common::video_player();
        for snapshot in run(machine.clone(), &steps) {
            prop_assert_eq!(check_configuration(&machine, &snapshot), Ok(()));
        }
    }

    #[test]
    fn history_configurations_stay_legal(steps in steps(HISTORY_EVENTS)) {
        let machine = with_history();
        for snapshot in run(machine.clone(), &steps) {
            prop_assert_eq!(check_configuration(&machine, &snapshot), Ok(()));
        }
    }

    #[test]
    fn runs_are_deterministic(steps in steps(COUNTER_EVENTS)) {
        prop_assert_eq!(run(common::debouncing(), &steps), run(common::debouncing(), &steps));
        prop_assert_eq!(run(common::throttling(), &steps), run(common::throttling(), &steps));
        prop_assert_eq!(run(with_history(), &steps), run(with_history(), &steps));
    }

    #[test]
    fn delayed_transitions_need_an_uninterrupted_wait(
        steps in proptest::collection::vec(
            prop_oneof![
                Just(Step::Send("leave")),
                Just(Step::Send("back")),
                (0..1500u64).prop_map(Step::Advance),
            ],
            0..30,
        )
    ) {
        let machine = MachineBuilder::new("m")
            .initial("Waiting")
            .state(StateBuilder::new("Waiting").after(1000, "Expired").on("leave", "Elsewhere"))
            .state(StateBuilder::new("Expired"))
            .state(StateBuilder::new("Elsewhere").on("back", "Waiting"))
            .build()
            .expect("timer machine is valid");

        // Model: Some(waited) while waiting, None elsewhere.
        let mut waited = Some(0u64);
        let mut expired = false;
        let mut expected = vec![json!("Waiting")];
        for step in &steps {
            match (step, waited) {
                (Step::Send("leave"), Some(_)) if !expired => waited = None,
                (Step::Send("back"), None) if !expired => waited = Some(0),
                (Step::Advance(millis), Some(elapsed)) if !expired => {
                    if elapsed + millis >= 1000 {
                        expired = true;
                    } else {
                        waited = Some(elapsed + millis);
                    }
                }
                _ => {}
            }
            let value = match (expired, waited) {
                (true, _) => "Expired",
                (false, Some(_)) => "Waiting",
                (false, None) => "Elsewhere",
            };
            expected.push(json!(value));
        }

        let values: Vec<_> = run(machine, &steps)
            .iter()
            .map(|snapshot| snapshot.value().clone())
            .collect();
        prop_assert_eq!(values, expected);
    }

    #[test]
    fn stopping_cleans_up_every_listener_once(notifications in 0..8usize, stop_first in any::<bool>()) {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let system = ActorSystem::new();
        let center = system
            .create_actor(
                common::notification_center(common::counted_listener(Arc::clone(&cleanups))),
                ActorOptions::new(),
            )
            .expect("fresh system");
        center.start().expect("not started yet");
        for n in 0..notifications {
            let timeout = if n % 2 == 0 { json!(1000) } else { json!(null) };
            center
                .send(machina::Event::with_data(
                    "notification.trigger",
                    json!({ "title": format!("#{n}"), "timeout": timeout }),
                ))
                .expect("system is idle");
        }
        prop_assert_eq!(center.snapshot().expect("running").children().len(), notifications + 1);

        let refs = center.snapshot().expect("running").context().actor_refs("notificationRefs");
        if stop_first {
            center.stop().expect("running");
        } else {
            system.advance(common::ms(1000)).expect("system is idle");
            prop_assert_eq!(
                center.snapshot().expect("running").children().len(),
                notifications / 2 + 1
            );
            center.stop().expect("running");
        }

        prop_assert_eq!(cleanups.load(Ordering::SeqCst), 1);
        prop_assert_eq!(system.pending_timers(), 0);
        prop_assert!(refs.iter().all(|actor| system.get(actor).is_none()));
    }

    #[test]
    fn prefix_patterns_match_whole_tokens(
        prefix in "[a-z]{1,3}(\\.[a-z]{1,3}){0,2}",
        kind in "[a-z]{1,3}(\\.[a-z]{1,3}){0,3}",
    ) {
        let pattern = EventPattern::parse(&format!("{prefix}.*")).expect("valid wildcard");
        let expected = kind == prefix || kind.starts_with(&format!("{prefix}."));
        prop_assert_eq!(pattern.matches(&kind), expected);
    }

    #[test]
    fn exact_patterns_match_only_themselves(
        descriptor in "[a-z]{1,3}(\\.[a-z]{1,3}){0,2}",
        kind in "[a-z]{1,3}(\\.[a-z]{1,3}){0,2}",
    ) {
        let pattern = EventPattern::parse(&descriptor).expect("valid descriptor");
        prop_assert_eq!(pattern.matches(&kind), kind == descriptor);
    }
}

#[test]
fn guarded_self_transitions_keep_the_configuration() {
    let machine = MachineBuilder::new("m")
        .context(json!({ "n": 0 }))
        .initial("A")
        .state(
            StateBuilder::new("A").on(
                "tick",
                TransitionBuilder::new().when(|context, _| context.get_i64("n") == Some(0)),
            ),
        )
        .build()
        .expect("machine is valid");
    let seen = run(machine.clone(), &[Step::Send("tick"), Step::Send("tick")]);
    for snapshot in &seen {
        assert_eq!(check_configuration(&machine, snapshot), Ok(()));
        assert!(snapshot.matches("A"));
    }
}
