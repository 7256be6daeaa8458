//! Machines shared by the integration tests.

#![allow(dead_code)]

#[path = "../../demos/machines/mod.rs"]
mod machines;

pub use machines::{debouncing, notification, notification_center, throttling, user_activity, video_player};

use machina::actor::{ActorLogic, Process};
use machina::core::Machine;
use machina::ActionError;
use machines::AuthBackend;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stillwater::prelude::*;

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Window listener that counts its cleanups.
pub fn counted_listener(cleanups: Arc<AtomicUsize>) -> ActorLogic {
    ActorLogic::callback(move |_, _sender| {
        let cleanups = Arc::clone(&cleanups);
        Ok(Process::new().with_cleanup(move || {
            cleanups.fetch_add(1, Ordering::SeqCst);
        }))
    })
}

pub const WORDS: &[&str] = &["rust", "rustacean", "ruby", "python", "rusty"];

pub fn search_as_you_type() -> Machine {
    machines::search_as_you_type(machines::prefix_search(WORDS))
}

/// Authentication flow over an in-memory user store.
pub fn authentication(store: Arc<Mutex<Option<Value>>>) -> Machine {
    let fetch_store = Arc::clone(&store);
    let fetch_user = ActorLogic::promise(move |_| {
        let store = Arc::clone(&fetch_store);
        from_fn(move |_: &()| {
            let user = store
                .lock()
                .map_err(|_| ActionError::new("user store poisoned"))?
                .clone();
            Ok(user.unwrap_or(Value::Null))
        })
        .boxed()
    });

    let sign_out_store = Arc::clone(&store);
    let sign_out = ActorLogic::promise(move |_| {
        let store = Arc::clone(&sign_out_store);
        from_fn(move |_: &()| {
            store
                .lock()
                .map_err(|_| ActionError::new("user store poisoned"))?
                .take();
            Ok(Value::Null)
        })
        .boxed()
    });

    let sign_in_store = Arc::clone(&store);
    let sign_in = ActorLogic::promise(move |input| {
        let username = input.get("username").cloned().unwrap_or(Value::Null);
        let password = input.get("password").and_then(Value::as_str).unwrap_or_default();
        if password.len() < 2 {
            return pure(json!({ "success": false, "error": "invalid credentials" })).boxed();
        }
        let user = json!({ "username": username });
        let store = Arc::clone(&sign_in_store);
        from_fn(move |_: &()| {
            *store.lock().map_err(|_| ActionError::new("user store poisoned"))? = Some(user.clone());
            Ok(json!({ "success": true, "userData": user }))
        })
        .boxed()
    });

    let sign_up = ActorLogic::promise(|input| {
        let username = input.get("username").and_then(Value::as_str).unwrap_or_default();
        if username.eq_ignore_ascii_case("admin") {
            return pure(json!({ "success": false, "error": "duplication" })).boxed();
        }
        if username.is_empty() {
            return fail(ActionError::new("username is required")).boxed();
        }
        pure(json!({ "success": true, "userData": { "username": username } })).boxed()
    });

    machines::authentication(AuthBackend {
        fetch_user,
        sign_in,
        sign_up,
        sign_out,
    })
}
