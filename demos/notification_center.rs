//! Notification Center
//!
//! A center spawns one actor per notification. Notifications with a
//! timeout close themselves, pause while the window is in the background
//! and report back to the center when they are done.
//!
//! Key concepts:
//! - Spawning children from an assign and keeping their references
//! - Children talking to their parent with `send_parent`
//! - A callback actor standing in for a window focus listener
//! - Forwarding wildcard events (`window.*`) to every child
//!
//! Run with: cargo run --example notification_center

mod machines;

use machina::actor::{ActorLogic, Process, Sender};
use machina::core::Event;
use machina::{init_tracing, ActorOptions, ActorSystem, Error};
use serde_json::json;
use std::cell::RefCell;
use std::time::Duration;

thread_local! {
    static WINDOW: RefCell<Option<Sender>> = const { RefCell::new(None) };
}

/// Callback actor standing in for the browser's focus and blur listeners.
fn window_listener() -> ActorLogic {
    ActorLogic::callback(|_, sender| {
        WINDOW.with(|window| *window.borrow_mut() = Some(sender));
        Ok(Process::new().with_cleanup(|| println!("  (window listener removed)")))
    })
}

fn window(kind: &str) {
    println!("window: {kind}");
    if let Some(sender) = WINDOW.with(|window| window.borrow().clone()) {
        sender.send(kind);
    }
}

fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== Notification Center ===\n");

    let system = ActorSystem::new();
    let center = system.create_actor(
        machines::notification_center(window_listener()),
        ActorOptions::new(),
    )?;
    center.subscribe(|snapshot| {
        let open: Vec<_> = snapshot.children().iter().filter(|id| *id != "window").collect();
        println!("  open: {open:?}");
    });
    center.start()?;

    center.send(Event::with_data(
        "notification.trigger",
        json!({ "title": "Saved", "timeout": 3000 }),
    ))?;
    center.send(Event::with_data("notification.trigger", json!({ "title": "New message" })))?;

    system.advance(Duration::from_secs(1))?;
    window("window.blur");
    println!("(ten seconds in the background)");
    system.advance(Duration::from_secs(10))?;
    window("window.focus");
    system.advance(Duration::from_secs(3))?;

    let manual = center.snapshot()?.context().actor_refs("notificationRefs");
    for actor in manual.iter().filter_map(|actor| system.get(actor)) {
        println!("closing {}", actor.id());
        actor.send("close")?;
    }

    center.stop()?;
    println!("\nVirtual time elapsed: {:?}", system.now());
    Ok(())
}
