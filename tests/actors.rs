//! Supervision, lifecycle and notification behaviour of the actor system.

mod common;

use machina::actor::{ActorLogic, ActorOptions, ActorSystem, InspectionEvent, Process};
use machina::builder::{InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
use machina::config::SystemConfig;
use machina::core::{Action, Context, Event, Guard, Machine};
use machina::error::ActorError;
use machina::interpreter::SpawnOptions;
use machina::snapshot::Status;
use machina::ActionError;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn listener(cleanups: Arc<AtomicUsize>) -> ActorLogic {
    ActorLogic::callback(move |_, _| {
        let cleanups = Arc::clone(&cleanups);
        Ok(Process::new().with_cleanup(move || {
            cleanups.fetch_add(1, Ordering::SeqCst);
        }))
    })
}

/// Three levels: root invokes `middle`, which invokes a listener and spawns
/// a second one from an assign.
fn family(cleanups: Arc<AtomicUsize>) -> Machine {
    let middle = MachineBuilder::new("middle")
        .actor("Listener", listener(Arc::clone(&cleanups)))
        .action(
            "Spawn extra listener",
            Action::assign_with_spawn(|context, _, spawner| {
                let extra = spawner.spawn_with("Listener", SpawnOptions::new().id("extra"))?;
                Ok(context.clone().with_actor("extra", &extra))
            }),
        )
        .initial("Running")
        .state(
            StateBuilder::new("Running")
                .entry("Spawn extra listener")
                .invoke(InvokeBuilder::new("Listener").id("listener")),
        )
        .build()
        .expect("middle machine is valid");

    MachineBuilder::new("root")
        .actor("Middle", ActorLogic::machine(middle))
        .initial("Active")
        .state(
            StateBuilder::new("Active")
                .invoke(InvokeBuilder::new("Middle").id("middle"))
                .on("leave", "Idle"),
        )
        .state(StateBuilder::new("Idle"))
        .build()
        .expect("root machine is valid")
}

fn stopped_order(system: &ActorSystem, machine: Machine, trigger: impl FnOnce(&machina::ActorHandle)) -> Vec<String> {
    let stopped = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&stopped);
    let actor = system
        .create_actor(
            machine,
            ActorOptions::new().inspect(move |inspection| {
                if inspection.event == InspectionEvent::ActorStopped {
                    log.borrow_mut().push(inspection.actor.clone());
                }
            }),
        )
        .unwrap();
    actor.start().unwrap();
    trigger(&actor);
    let order = stopped.borrow().clone();
    order
}

#[test]
fn stopping_a_root_stops_every_descendant_deepest_first() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let system = ActorSystem::new();
    let order = stopped_order(&system, family(Arc::clone(&cleanups)), |actor| {
        assert_eq!(actor.snapshot().unwrap().children(), ["middle"]);
        actor.stop().unwrap();
    });

    assert_eq!(order, ["extra", "listener", "middle", "root"]);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    assert_eq!(system.pending_timers(), 0);
}

#[test]
fn leaving_an_invoking_state_tears_down_its_subtree() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let system = ActorSystem::new();
    let order = stopped_order(&system, family(Arc::clone(&cleanups)), |actor| {
        actor.send("leave").unwrap();
        let snapshot = actor.snapshot().unwrap();
        assert!(snapshot.matches("Idle"));
        assert!(snapshot.children().is_empty());
    });

    assert_eq!(order, ["extra", "listener", "middle"]);
    assert_eq!(cleanups.load(Ordering::SeqCst), 2);
}

#[test]
fn lifecycle_misuse_is_reported() {
    let system = ActorSystem::new();
    let actor = system
        .create_actor(common::debouncing(), ActorOptions::new())
        .unwrap();
    assert_eq!(actor.snapshot().unwrap().status(), Status::NotStarted);

    actor.start().unwrap();
    assert_eq!(
        actor.start().unwrap_err(),
        ActorError::AlreadyStarted("Debouncing".into())
    );

    actor.stop().unwrap();
    assert_eq!(actor.snapshot().unwrap().status(), Status::Stopped);
    assert_eq!(
        actor.stop().unwrap_err(),
        ActorError::AlreadyStopped("Debouncing".into())
    );
    assert_eq!(
        actor.start().unwrap_err(),
        ActorError::AlreadyStopped("Debouncing".into())
    );
    assert!(system.get(actor.actor_ref()).is_none());

    actor.send("click").unwrap();
    assert_eq!(actor.snapshot().unwrap().status(), Status::Stopped);
}

#[test]
fn a_finished_machine_ignores_further_events() {
    let machine = MachineBuilder::new("once")
        .initial("Waiting")
        .state(StateBuilder::new("Waiting").on("go", "Done"))
        .state(StateBuilder::final_state("Done").output(|_, event| Ok(json!(event.kind()))))
        .build()
        .unwrap();
    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
    actor.start().unwrap();

    let published = Rc::new(RefCell::new(0));
    let count = Rc::clone(&published);
    let _subscription = actor.subscribe(move |_| *count.borrow_mut() += 1);

    actor.send("go").unwrap();
    let snapshot = actor.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Done);
    assert_eq!(snapshot.output(), Some(&json!("go")));

    actor.send("go").unwrap();
    assert_eq!(*published.borrow(), 1);
    assert!(system.get(actor.actor_ref()).is_some());
}

#[test]
fn subscribers_see_every_step_in_order() {
    let system = ActorSystem::new();
    let actor = system
        .create_actor(common::throttling(), ActorOptions::new())
        .unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let first = {
        let seen = Rc::clone(&seen);
        actor.subscribe(move |snapshot| {
            seen.borrow_mut().push(("first", snapshot.value().clone()));
        })
    };
    let _second = {
        let seen = Rc::clone(&seen);
        actor.subscribe(move |snapshot| {
            seen.borrow_mut().push(("second", snapshot.value().clone()));
        })
    };

    actor.start().unwrap();
    actor.send("click").unwrap();
    first.unsubscribe();
    system.advance(common::ms(1000)).unwrap();

    assert_eq!(
        *seen.borrow(),
        vec![
            ("first", json!("Idle")),
            ("second", json!("Idle")),
            ("first", json!("Throttling")),
            ("second", json!("Throttling")),
            ("second", json!("Idle")),
        ]
    );
}

#[test]
fn subscribers_may_send_while_being_notified() {
    let system = ActorSystem::new();
    let actor = system
        .create_actor(common::throttling(), ActorOptions::new())
        .unwrap();
    actor.start().unwrap();

    let values = Rc::new(RefCell::new(Vec::new()));
    let (log, echo) = (Rc::clone(&values), actor.clone());
    let _subscription = actor.subscribe(move |snapshot| {
        log.borrow_mut().push(snapshot.value().clone());
        if snapshot.matches("Idle") && snapshot.context().get_i64("counter") == Some(1) {
            echo.send("reset").unwrap();
        }
    });

    actor.send("click").unwrap();
    system.advance(common::ms(1000)).unwrap();

    assert_eq!(actor.snapshot().unwrap().context().get_i64("counter"), Some(0));
    assert_eq!(
        *values.borrow(),
        vec![json!("Throttling"), json!("Idle"), json!("Idle")]
    );
}

fn fragile_child() -> Machine {
    MachineBuilder::new("fragile")
        .guard(
            "Has budget",
            Guard::fallible(|context, _| {
                context
                    .get_i64("budget")
                    .map(|budget| budget > 0)
                    .ok_or_else(|| ActionError::new("budget is missing"))
            }),
        )
        .initial("Ready")
        .state(
            StateBuilder::new("Ready")
                .on("spend", TransitionBuilder::to("Spent").guard("Has budget")),
        )
        .state(StateBuilder::new("Spent"))
        .build()
        .expect("fragile machine is valid")
}

#[test]
fn failing_children_report_to_their_parent() {
    let machine = MachineBuilder::new("supervisor")
        .context(json!({ "failure": null }))
        .actor("Fragile", ActorLogic::machine(fragile_child()))
        .initial("Supervising")
        .state(
            StateBuilder::new("Supervising")
                .invoke(
                    InvokeBuilder::new("Fragile").id("fragile").on_error(
                        TransitionBuilder::to("Recovered").action(Action::assign_field(
                            "failure",
                            |_, event| event.error().map(Value::from).unwrap_or(Value::Null),
                        )),
                    ),
                )
                .on("spend", TransitionBuilder::new().action(Action::send_to_child("fragile", "spend"))),
        )
        .state(StateBuilder::new("Recovered"))
        .build()
        .unwrap();

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
    actor.start().unwrap();
    actor.send("spend").unwrap();

    let snapshot = actor.snapshot().unwrap();
    assert!(snapshot.matches("Recovered"));
    assert_eq!(
        snapshot.context().get_str("failure"),
        Some("guard 'Has budget' failed: budget is missing")
    );
    assert_eq!(snapshot.status(), Status::Active);
}

#[test]
fn a_failing_root_stops_processing() {
    let system = ActorSystem::new();
    let actor = system.create_actor(fragile_child(), ActorOptions::new()).unwrap();
    actor.start().unwrap();
    actor.send("spend").unwrap();

    let snapshot = actor.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Error);
    assert!(snapshot.matches("Ready"));
    assert_eq!(snapshot.error(), Some("guard 'Has budget' failed: budget is missing"));

    actor.send("spend").unwrap();
    assert_eq!(actor.snapshot().unwrap(), snapshot);
}

#[test]
fn a_failed_step_still_cleans_up_the_children_it_was_leaving() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let machine = MachineBuilder::new("leaving")
        .actor("Listener", listener(Arc::clone(&cleanups)))
        .initial("Listening")
        .state(
            StateBuilder::new("Listening")
                .invoke(InvokeBuilder::new("Listener").id("listener"))
                .on("go", "Broken"),
        )
        .state(
            StateBuilder::new("Broken")
                .entry(Action::assign(|_, _| Err(ActionError::new("boom")))),
        )
        .build()
        .unwrap();

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
    actor.start().unwrap();
    assert_eq!(actor.snapshot().unwrap().children(), ["listener"]);

    actor.send("go").unwrap();
    let snapshot = actor.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Error);
    assert!(snapshot.matches("Listening"));
    assert!(snapshot.children().is_empty());
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);

    actor.stop().unwrap();
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

fn stopper(cleanups: Arc<AtomicUsize>) -> Machine {
    MachineBuilder::new("stopper")
        .actor("Listener", listener(cleanups))
        .initial("Idle")
        .state(
            StateBuilder::new("Idle")
                .on(
                    "spawn",
                    TransitionBuilder::new().action(Action::assign_with_spawn(
                        |context, _, spawner| {
                            let child = spawner.spawn_with("Listener", SpawnOptions::new().id("x"))?;
                            Ok(context.clone().with_actor("child", &child))
                        },
                    )),
                )
                .on("kill", TransitionBuilder::new().action(Action::stop_child("x")))
                .on(
                    "kill-ref",
                    TransitionBuilder::new()
                        .action(Action::stop(|context, _| context.actor_ref("child"))),
                ),
        )
        .build()
        .expect("stopper machine is valid")
}

#[test]
fn stopping_a_child_twice_is_an_error() {
    for kill in ["kill", "kill-ref"] {
        let cleanups = Arc::new(AtomicUsize::new(0));
        let system = ActorSystem::new();
        let actor = system
            .create_actor(stopper(Arc::clone(&cleanups)), ActorOptions::new())
            .unwrap();
        actor.start().unwrap();
        actor.send("spawn").unwrap();

        actor.send(kill).unwrap();
        let snapshot = actor.snapshot().unwrap();
        assert_eq!(snapshot.status(), Status::Active, "{kill}");
        assert!(snapshot.children().is_empty());
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        actor.send(kill).unwrap();
        let snapshot = actor.snapshot().unwrap();
        assert_eq!(snapshot.status(), Status::Error, "{kill}");
        assert_eq!(snapshot.error(), Some("actor 'x' is not running"));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn a_throwing_guard_moves_the_actor_to_error() {
    let machine = MachineBuilder::new("checked")
        .context(json!({ "attempts": 0 }))
        .guard(
            "Is allowed",
            Guard::fallible(|_, event| {
                event
                    .get("allowed")
                    .and_then(Value::as_bool)
                    .ok_or_else(|| ActionError::new("allowed is missing"))
            }),
        )
        .guard(
            "Within limit",
            Guard::fallible(|context, _| {
                context
                    .get_i64("limit")
                    .map(|limit| limit > 0)
                    .ok_or_else(|| ActionError::new("limit is missing"))
            }),
        )
        .initial("Idle")
        .state(
            StateBuilder::new("Idle")
                .on("enter", TransitionBuilder::to("Inside").guard("Is allowed"))
                .on(
                    "check",
                    TransitionBuilder::to("Checking").action(Action::assign_field(
                        "attempts",
                        |context, _| json!(context.get_i64("attempts").unwrap_or(0) + 1),
                    )),
                ),
        )
        .state(StateBuilder::new("Inside"))
        .state(
            StateBuilder::new("Checking")
                .always(TransitionBuilder::to("Inside").guard("Within limit"))
                .always("Idle"),
        )
        .build()
        .unwrap();

    let system = ActorSystem::new();

    let selecting = system
        .create_actor(machine.clone(), ActorOptions::new().id("selecting"))
        .unwrap();
    selecting.start().unwrap();
    selecting.send(Event::new("enter")).unwrap();
    let snapshot = selecting.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Error);
    assert!(snapshot.matches("Idle"));
    assert_eq!(snapshot.error(), Some("guard 'Is allowed' failed: allowed is missing"));

    let eventless = system
        .create_actor(machine, ActorOptions::new().id("eventless"))
        .unwrap();
    eventless.start().unwrap();
    eventless.send("check").unwrap();
    let snapshot = eventless.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Error);
    assert!(snapshot.matches("Idle"));
    assert!(!snapshot.matches("Checking"));
    assert_eq!(snapshot.context().get_i64("attempts"), Some(0));
    assert_eq!(snapshot.error(), Some("guard 'Within limit' failed: limit is missing"));

    eventless.send("check").unwrap();
    assert_eq!(eventless.snapshot().unwrap(), snapshot);
}

#[test]
fn duplicate_child_ids_fail_the_spawning_step() {
    let cleanups = Arc::new(AtomicUsize::new(0));
    let machine = MachineBuilder::new("spawner")
        .actor("Listener", listener(Arc::clone(&cleanups)))
        .action(
            "Spawn listener",
            Action::assign_with_spawn(|context, _, spawner| {
                spawner.spawn_with("Listener", SpawnOptions::new().id("listener"))?;
                Ok(context.clone())
            }),
        )
        .initial("Idle")
        .state(
            StateBuilder::new("Idle").on("spawn", TransitionBuilder::new().action("Spawn listener")),
        )
        .build()
        .unwrap();

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
    actor.start().unwrap();
    actor.send("spawn").unwrap();
    assert_eq!(actor.snapshot().unwrap().children(), ["listener"]);

    actor.send("spawn").unwrap();
    let snapshot = actor.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Error);
    assert!(snapshot
        .error()
        .is_some_and(|error| error.contains("'listener' is already a child")));
    assert_eq!(cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn eventless_loops_hit_the_microstep_limit() {
    let machine = MachineBuilder::new("spinner")
        .context(json!({ "spins": 0 }))
        .initial("Idle")
        .state(StateBuilder::new("Idle").on("spin", "Left"))
        .state(
            StateBuilder::new("Left").always(TransitionBuilder::to("Right").action(
                Action::assign_field("spins", |context, _| {
                    json!(context.get_i64("spins").unwrap_or(0) + 1)
                }),
            )),
        )
        .state(StateBuilder::new("Right").always("Left"))
        .build()
        .unwrap();

    let config = SystemConfig {
        max_microsteps: 20,
        ..SystemConfig::default()
    };
    let system = ActorSystem::with_config(config);
    let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
    actor.start().unwrap();
    actor.send("spin").unwrap();

    let snapshot = actor.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Error);
    assert!(snapshot.matches("Idle"));
    assert_eq!(snapshot.context().get_i64("spins"), Some(0));
    assert!(snapshot.error().is_some_and(|error| error.contains("20 microsteps")));
}

#[test]
fn inspection_follows_each_step() {
    let records = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&records);
    let system = ActorSystem::new();
    let actor = system
        .create_actor(
            common::debouncing(),
            ActorOptions::new().id("debouncer").inspect(move |inspection| {
                log.borrow_mut().push(inspection.event.clone());
            }),
        )
        .unwrap();
    actor.start().unwrap();
    records.borrow_mut().clear();

    actor.send("click").unwrap();
    let records = records.borrow();
    assert!(matches!(
        &records[0],
        InspectionEvent::EventDelivered { event } if event.kind() == "click"
    ));
    assert!(records.iter().any(|record| matches!(
        record,
        InspectionEvent::Microstep { event, transitions }
            if event == "click"
                && transitions[0].source == "Debouncing.Idle"
                && transitions[0].targets == ["Debouncing.Debouncing"]
    )));
    assert_eq!(
        records.last(),
        Some(&InspectionEvent::SnapshotPublished {
            status: Status::Active
        })
    );
}

#[test]
fn sending_to_a_missing_child_is_a_no_op() {
    let machine = MachineBuilder::new("lonely")
        .context(json!({ "sent": 0 }))
        .initial("Idle")
        .state(
            StateBuilder::new("Idle").on(
                "ping",
                TransitionBuilder::new()
                    .action(Action::send_to_child("nobody", "ping"))
                    .action(Action::assign(|context, _| {
                        let sent = context.get_i64("sent").unwrap_or(0) + 1;
                        Ok(Context::clone(context).with("sent", sent))
                    })),
            ),
        )
        .build()
        .unwrap();

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new()).unwrap();
    actor.start().unwrap();
    actor.send(Event::new("ping")).unwrap();

    let snapshot = actor.snapshot().unwrap();
    assert_eq!(snapshot.status(), Status::Active);
    assert_eq!(snapshot.context().get_i64("sent"), Some(1));
}

#[test]
fn references_from_another_system_do_not_resolve() {
    let first = ActorSystem::new();
    let second = ActorSystem::new();
    let actor = first
        .create_actor(common::throttling(), ActorOptions::new())
        .unwrap();

    assert!(first.get(actor.actor_ref()).is_some());
    assert!(second.get(actor.actor_ref()).is_none());
}
