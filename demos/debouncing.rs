//! Debouncing
//!
//! Counts bursts of clicks instead of single clicks: the counter only
//! moves once the clicking has stopped for a full second.
//!
//! Key concepts:
//! - Delayed (`after`) transitions
//! - Re-entering a state restarts its timers
//! - Driving time with the virtual clock
//!
//! Run with: cargo run --example debouncing

mod machines;

use machina::{init_tracing, ActorOptions, ActorSystem, Error};
use std::time::Duration;

fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== Debouncing ===\n");

    let machine = machines::debouncing();

    let system = ActorSystem::new();
    let actor = system.create_actor(machine, ActorOptions::new())?;
    actor.subscribe(|snapshot| {
        println!(
            "  {:<12} counter = {}",
            snapshot.value(),
            snapshot.context().get_i64("counter").unwrap_or_default()
        );
    });
    actor.start()?;

    println!("Three quick clicks:");
    for _ in 0..3 {
        actor.send("click")?;
        system.advance(Duration::from_millis(300))?;
    }
    println!("Waiting for the quiet period...");
    system.advance(Duration::from_secs(1))?;

    println!("\nOne more click, then silence:");
    actor.send("click")?;
    system.advance(Duration::from_secs(2))?;

    println!("\nVirtual time elapsed: {:?}", system.now());
    Ok(())
}
