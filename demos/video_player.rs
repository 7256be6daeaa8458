//! Video Player
//!
//! A parallel root with two regions: `Video` drives playback and
//! `Fullscreen` tracks the browser's fullscreen state. Inside `Ready`, a
//! second parallel state runs the controls next to a play/pause animation
//! that is triggered through raised events.
//!
//! Key concepts:
//! - Parallel regions moving independently
//! - Wildcard events (`toggle.*`) next to exact ones (`toggle`)
//! - `#id` targets and completion (`on_done`) of nested final states
//! - Tags as the view's single source of truth
//!
//! Run with: cargo run --example video_player

mod machines;

use machina::{init_tracing, ActorOptions, ActorSystem, Error, Event};
use serde_json::json;
use std::time::Duration;

fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== Video Player ===\n");

    let system = ActorSystem::new();
    let player = system.create_actor(machines::video_player(), ActorOptions::new())?;
    player.subscribe(|snapshot| {
        println!("  value = {}", snapshot.value());
        println!("  tags  = {:?}", snapshot.tags());
    });
    player.start()?;

    let script: [(&str, Option<Event>, u64); 8] = [
        ("press play", Some(Event::new("play")), 600),
        (
            "metadata arrives",
            Some(Event::with_data("metadata.loaded", json!({ "videoDuration": 596 }))),
            0,
        ),
        ("controls fade out", None, 2000),
        ("click the video", Some(Event::new("toggle.click")), 0),
        ("animation ends", Some(Event::new("play-state-animation.end")), 0),
        ("keyboard shortcut", Some(Event::new("toggle")), 0),
        ("go fullscreen", Some(Event::new("fullscreen.toggle")), 0),
        ("browser confirms", Some(Event::new("fullscreen.expanded")), 0),
    ];
    for (step, event, wait) in script {
        println!("\n{step}:");
        if let Some(event) = event {
            player.send(event)?;
        }
        system.advance(Duration::from_millis(wait))?;
    }
    Ok(())
}
