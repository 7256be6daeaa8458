//! Authentication
//!
//! Sign in, sign up and sign out against an in-memory user store. Each
//! server call is a promise actor; nested final states (`Successfully
//! signed on`, `Signed out`) move the machine between the authenticated
//! and anonymous halves.
//!
//! Run with: cargo run --example authentication

mod machines;

use machina::{init_tracing, ActionError, ActorLogic, ActorOptions, ActorSystem, Error, Event};
use machines::AuthBackend;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use stillwater::prelude::*;

/// Registered users by name, with their password.
type Users = Arc<Mutex<HashMap<String, String>>>;

fn field(input: &Value, name: &str) -> String {
    input.get(name).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn sign_in(users: Users) -> ActorLogic {
    ActorLogic::promise(move |input| {
        let (username, password) = (field(input, "username"), field(input, "password"));
        let users = Arc::clone(&users);
        from_fn(move |_: &()| {
            let users = users.lock().map_err(|_| ActionError::new("user store poisoned"))?;
            if users.get(&username) == Some(&password) {
                Ok(json!({ "success": true, "userData": { "username": username } }))
            } else {
                Ok(json!({ "success": false, "error": "invalid credentials" }))
            }
        })
        .boxed()
    })
}

fn sign_up(users: Users) -> ActorLogic {
    ActorLogic::promise(move |input| {
        let (username, password) = (field(input, "username"), field(input, "password"));
        if username.is_empty() {
            return fail(ActionError::new("username is required")).boxed();
        }
        let users = Arc::clone(&users);
        from_fn(move |_: &()| {
            let mut users = users.lock().map_err(|_| ActionError::new("user store poisoned"))?;
            if users.contains_key(&username) {
                return Ok(json!({ "success": false, "error": "duplication" }));
            }
            users.insert(username.clone(), password.clone());
            Ok(json!({ "success": true, "userData": { "username": username } }))
        })
        .boxed()
    })
}

fn backend(users: Users) -> AuthBackend {
    AuthBackend {
        fetch_user: ActorLogic::promise(|_| pure(Value::Null).boxed()),
        sign_in: sign_in(Arc::clone(&users)),
        sign_up: sign_up(users),
        sign_out: ActorLogic::promise(|_| pure(Value::Null).boxed()),
    }
}

fn credentials(kind: &str, username: &str, password: &str) -> Event {
    Event::with_data(kind, json!({ "username": username, "password": password }))
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();
    println!("=== Authentication ===\n");

    let users = Users::default();
    let system = ActorSystem::new();
    let actor = system.create_actor(machines::authentication(backend(users)), ActorOptions::new())?;
    actor.subscribe(|snapshot| {
        let context = snapshot.context();
        println!(
            "  {} user = {} toast = {}",
            snapshot.value(),
            context.get("userData").cloned().unwrap_or_default(),
            context.get("authenticationErrorToast").cloned().unwrap_or_default()
        );
    });
    actor.start()?;
    system.settle().await;

    let attempts = [
        credentials("sign-in", "ada", "lovelace"),
        credentials("sign-up", "ada", "lovelace"),
        Event::new("sign-out"),
        credentials("sign-up", "ada", "again"),
        credentials("sign-in", "ada", "lovelace"),
    ];
    for event in attempts {
        println!("-> {event}");
        actor.send(event)?;
        system.settle().await;
    }
    Ok(())
}
