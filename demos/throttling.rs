//! Throttling
//!
//! Counts at most one click per second; clicks while the window is open
//! are ignored.
//!
//! Run with: cargo run --example throttling

mod machines;

use machina::{init_tracing, ActorOptions, ActorSystem, Error};
use std::time::Duration;

fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== Throttling ===\n");

    let machine = machines::throttling();

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new())?;
    actor.start()?;

    // A click every 200ms for three seconds.
    for tick in 0..15 {
        actor.send("click")?;
        system.advance(Duration::from_millis(200))?;
        let snapshot = actor.snapshot()?;
        println!(
            "t={:>5}ms  {:<12} counter = {}",
            (tick + 1) * 200,
            snapshot.value(),
            snapshot.context().get_i64("counter").unwrap_or_default()
        );
    }
    Ok(())
}
