//! User Activity
//!
//! Tracks whether the user is still around. DOM activity arrives from a
//! callback actor; after a configurable period without any, the machine
//! reaches its final `Done` state and reports the user inactive.
//!
//! Run with: cargo run --example user_activity

mod machines;

use machina::actor::{Process, Sender};
use machina::core::Event;
use machina::{init_tracing, ActorLogic, ActorOptions, ActorSystem, Error};
use serde_json::json;
use std::cell::RefCell;
use std::time::Duration;

thread_local! {
    static DOM: RefCell<Option<Sender>> = const { RefCell::new(None) };
}

fn activity(at: Duration) {
    println!("activity at {at:?}");
    if let Some(sender) = DOM.with(|dom| dom.borrow().clone()) {
        sender.send(Event::with_data("activity", json!({ "at": at.as_millis() as u64 })));
    }
}

fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== User Activity ===\n");

    let listener = ActorLogic::callback(|_, sender| {
        DOM.with(|dom| *dom.borrow_mut() = Some(sender));
        Ok(Process::new().with_cleanup(|| println!("  (DOM listeners removed)")))
    });

    let machine = machines::user_activity(listener);

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new().input(json!({ "timeout": 5000 })))?;
    actor.subscribe(|snapshot| {
        println!(
            "  {} last active = {}ms",
            snapshot.value(),
            snapshot.context().get_i64("lastActive").unwrap_or_default()
        );
    });
    actor.start()?;

    for _ in 0..3 {
        system.advance(Duration::from_secs(2))?;
        activity(system.now());
    }
    println!("(user walks away)");
    system.advance(Duration::from_secs(6))?;
    activity(system.now());

    actor.stop()?;
    Ok(())
}
