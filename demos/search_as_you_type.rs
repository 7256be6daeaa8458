//! Search As You Type
//!
//! An autocomplete box: typing is debounced, the search runs as a promise
//! actor, and a search superseded by newer input never reports back.
//!
//! Key concepts:
//! - Promise actors built from stillwater effects
//! - Invocations stopped when their state is left
//! - Tags for view concerns (`Display loader`)
//!
//! Run with: cargo run --example search_as_you_type

mod machines;

use machina::core::Event;
use machina::{init_tracing, ActorLogic, ActorOptions, ActorSystem, Error};
use serde_json::{json, Value};
use std::time::Duration;
use stillwater::prelude::*;

const LANGUAGES: &[&str] = &["rust", "ruby", "python", "prolog", "pascal", "perl", "racket"];

fn search() -> ActorLogic {
    ActorLogic::promise(|input| {
        let query = input
            .get("search")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        from_fn(move |_: &()| {
            println!("  searching for {query:?}");
            let items: Vec<Value> = LANGUAGES
                .iter()
                .filter(|language| !query.is_empty() && language.starts_with(&query))
                .map(|language| json!(language))
                .collect();
            Ok(Value::Array(items))
        })
        .boxed()
    })
}

fn typed(text: &str) -> Event {
    Event::with_data("input.change", json!({ "searchInput": text }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== Search As You Type ===\n");

    let system = ActorSystem::new();
    let actor = system.create_actor(machines::search_as_you_type(search()), ActorOptions::new())?;
    actor.subscribe(|snapshot| {
        let loader = if snapshot.has_tag("Display loader") { " (loading)" } else { "" };
        println!(
            "  {}{loader} items = {}",
            snapshot.value(),
            snapshot.context().get("availableItems").cloned().unwrap_or_default()
        );
    });
    actor.start()?;
    actor.send("input.focus")?;

    println!("Typing \"p\", \"pr\" quickly:");
    actor.send(typed("p"))?;
    system.advance(Duration::from_millis(200))?;
    actor.send(typed("pr"))?;
    system.advance(Duration::from_millis(500))?;
    system.settle().await;

    println!("\nTyping \"r\", pausing, then \"ru\" while the first search is in flight:");
    actor.send(typed("r"))?;
    system.advance(Duration::from_millis(500))?;
    actor.send(typed("ru"))?;
    system.advance(Duration::from_millis(500))?;
    let ran = system.settle().await;
    println!("  {ran} searches ran, only the last one reported");

    actor.send("combobox.click-outside")?;
    Ok(())
}
