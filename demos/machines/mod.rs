//! The machine catalogue, shared by the demos and the integration tests.
//!
//! Machines that talk to the outside world take the actor logic for it as
//! a parameter, so a demo can print from it and a test can count on it.

#![allow(dead_code)]

use machina::actor::ActorLogic;
use machina::builder::{InvokeBuilder, MachineBuilder, StateBuilder, TransitionBuilder};
use machina::core::{Action, Context, Event, Guard, Machine};
use machina::interpreter::SpawnOptions;
use machina::ActionError;
use serde_json::{json, Value};
use std::time::Duration;
use stillwater::prelude::*;

fn increment(field: &'static str) -> Action {
    Action::assign_field(field, move |context, _| {
        json!(context.get_i64(field).unwrap_or(0) + 1)
    })
}

pub fn debouncing() -> Machine {
    MachineBuilder::new("Debouncing")
        .context(json!({ "counter": 0 }))
        .action("Increment counter", increment("counter"))
        .action("Reset counter", Action::set("counter", 0))
        .initial("Idle")
        .state(
            StateBuilder::new("Idle")
                .on("click", "Debouncing")
                .on("reset", TransitionBuilder::new().action("Reset counter")),
        )
        .state(
            StateBuilder::new("Debouncing")
                .after(1000, TransitionBuilder::to("Idle").action("Increment counter"))
                .on("click", TransitionBuilder::to("Debouncing").reenter(true)),
        )
        .build()
        .expect("debouncing machine is valid")
}

pub fn throttling() -> Machine {
    MachineBuilder::new("Throttling")
        .context(json!({ "counter": 0 }))
        .action("Increment counter", increment("counter"))
        .action("Reset counter", Action::set("counter", 0))
        .initial("Idle")
        .state(
            StateBuilder::new("Idle")
                .on("click", "Throttling")
                .on("reset", TransitionBuilder::new().action("Reset counter")),
        )
        .state(
            StateBuilder::new("Throttling")
                .after(1000, TransitionBuilder::to("Idle").action("Increment counter")),
        )
        .build()
        .expect("throttling machine is valid")
}

pub fn notification() -> Machine {
    MachineBuilder::new("Notification")
        .context_from_input(|input| Context::from_value(input.clone()))
        .guard(
            "Is timer defined",
            Guard::new(|context, _| context.get("timeout").is_some_and(Value::is_number)),
        )
        .delay("Notification timeout", |context, _| {
            context
                .get("timeout")
                .and_then(Value::as_u64)
                .map(Duration::from_millis)
                .ok_or_else(|| ActionError::new("Expect timeout to be defined."))
        })
        .initial("Checking if timer is required")
        .state(
            StateBuilder::new("Checking if timer is required")
                .always(TransitionBuilder::to("Waiting for timeout").guard("Is timer defined"))
                .always("Waiting for manual action"),
        )
        .state(
            StateBuilder::new("Waiting for timeout")
                .initial("Active")
                .state(
                    StateBuilder::new("Active")
                        .after("Notification timeout", "#Notification.Done")
                        .on("mouse.enter", "Hovering"),
                )
                .state(StateBuilder::new("Hovering").on("mouse.leave", "Active"))
                .state(StateBuilder::new("Window inactive").on("window.focus", "Active"))
                .on("window.blur", ".Window inactive")
                .on("close", "Done")
                .on("animation.end", "Done"),
        )
        .state(StateBuilder::new("Waiting for manual action").on("close", "Done"))
        .state(
            StateBuilder::final_state("Done").entry(Action::send_parent_with(|context, _| {
                Ok(Event::with_data(
                    "notification.closed",
                    json!({ "notificationId": context.get("notificationId") }),
                ))
            })),
        )
        .build()
        .expect("notification machine is valid")
}

/// Notification center invoking `focus` as its window listener.
pub fn notification_center(focus: ActorLogic) -> Machine {
    MachineBuilder::new("Notification Center")
        .context(json!({ "notificationRefs": [], "triggered": 0 }))
        .actor("windowFocusLogic", focus)
        .actor("notificationMachine", ActorLogic::machine(notification()))
        .action(
            "Assign notification configuration into context",
            Action::assign_with_spawn(|context, event, spawner| {
                let triggered = context.get_i64("triggered").unwrap_or(0) + 1;
                let id = format!("notification-{triggered}");
                let actor = spawner.spawn_with(
                    "notificationMachine",
                    SpawnOptions::new().id(id.clone()).input(json!({
                        "notificationId": id,
                        "title": event.get("title"),
                        "description": event.get("description"),
                        "timeout": event.get("timeout"),
                    })),
                )?;
                let mut refs = vec![actor.to_value()];
                refs.extend(context.actor_refs("notificationRefs").iter().map(|r| r.to_value()));
                Ok(context
                    .clone()
                    .with("notificationRefs", refs)
                    .with("triggered", triggered))
            }),
        )
        .action(
            "Stop closed notification",
            Action::stop(|context, event| {
                let id = event.get("notificationId")?.as_str()?;
                context
                    .actor_refs("notificationRefs")
                    .into_iter()
                    .find(|actor| actor.id() == id)
            }),
        )
        .action(
            "Remove closed notification from context",
            Action::assign(|context, event| {
                let id = event.get("notificationId").and_then(Value::as_str);
                let remaining: Vec<Value> = context
                    .actor_refs("notificationRefs")
                    .iter()
                    .filter(|actor| Some(actor.id()) != id)
                    .map(|actor| actor.to_value())
                    .collect();
                Ok(context.clone().with("notificationRefs", remaining))
            }),
        )
        .invoke(InvokeBuilder::new("windowFocusLogic").id("window"))
        .on(
            "notification.trigger",
            TransitionBuilder::new().action("Assign notification configuration into context"),
        )
        .on(
            "notification.closed",
            TransitionBuilder::new()
                .action("Stop closed notification")
                .action("Remove closed notification from context"),
        )
        .on(
            "window.*",
            TransitionBuilder::new().action(Action::enqueue(|context, event, queue| {
                for actor in context.actor_refs("notificationRefs") {
                    queue.send_to(actor, event.clone());
                }
                Ok(())
            })),
        )
        .build()
        .expect("notification center machine is valid")
}

/// Promise actor returning the `words` starting with the search input.
pub fn prefix_search(words: &'static [&'static str]) -> ActorLogic {
    ActorLogic::promise(move |input| {
        let search = input
            .get("search")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_lowercase();
        let items: Vec<Value> = if search.is_empty() {
            Vec::new()
        } else {
            words
                .iter()
                .filter(|word| word.starts_with(&search))
                .map(|word| json!(word))
                .collect()
        };
        pure(Value::Array(items)).boxed()
    })
}

/// Autocomplete box running `search` as its promise actor. The actor gets
/// `{"search": input}` and resolves with the matching items.
pub fn search_as_you_type(search: ActorLogic) -> Machine {
    MachineBuilder::new("Search as you type")
        .context(json!({
            "searchInput": "",
            "activeItemIndex": -1,
            "availableItems": [],
            "lastFetchedSearch": "",
        }))
        .actor("Autocomplete search", search)
        .action(
            "Assign search input to context",
            Action::assign_field("searchInput", |_, event| {
                event.get("searchInput").cloned().unwrap_or_else(|| json!(""))
            }),
        )
        .action(
            "Assign active item index to context",
            Action::assign_field("activeItemIndex", |_, event| {
                event.get("itemId").cloned().unwrap_or_else(|| json!(-1))
            }),
        )
        .action("Reset active item index into context", Action::set("activeItemIndex", -1))
        .action(
            "Assign selected item as current search input into context",
            Action::assign_field("searchInput", |context, event| {
                let selected = event
                    .get("itemId")
                    .and_then(Value::as_u64)
                    .and_then(|index| context.get("availableItems")?.get(index as usize).cloned());
                selected.unwrap_or_else(|| context.get("searchInput").cloned().unwrap_or_default())
            }),
        )
        .action(
            "Assign last fetched search into context",
            Action::assign_field("lastFetchedSearch", |context, _| {
                context.get("searchInput").cloned().unwrap_or_default()
            }),
        )
        .action("Reset available items in context", Action::set("availableItems", json!([])))
        .guard(
            "Has search query been fetched",
            Guard::new(|context, _| context.get("searchInput") == context.get("lastFetchedSearch")),
        )
        .initial("Inactive")
        .state(StateBuilder::new("Inactive").on("input.focus", "Active"))
        .state(
            StateBuilder::new("Active")
                .entry("Reset active item index into context")
                .initial("Checking if initial fetching is required")
                .state(
                    StateBuilder::new("Checking if initial fetching is required")
                        .always(TransitionBuilder::to("Idle").guard("Has search query been fetched"))
                        .always("Fetching"),
                )
                .state(StateBuilder::new("Idle"))
                .state(StateBuilder::new("Debouncing").after(500, "Fetching"))
                .state(
                    StateBuilder::new("Fetching").tag("Display loader").invoke(
                        InvokeBuilder::new("Autocomplete search")
                            .input(|context, _| Ok(json!({ "search": context.get("searchInput") })))
                            .on_done(
                                TransitionBuilder::to("Idle")
                                    .action(Action::assign_field("availableItems", |_, event| {
                                        event.output().cloned().unwrap_or_else(|| json!([]))
                                    }))
                                    .action("Assign last fetched search into context"),
                            ),
                    ),
                )
                .on(
                    "input.change",
                    TransitionBuilder::to(".Debouncing")
                        .reenter(true)
                        .action("Assign search input to context"),
                )
                .on("combobox.click-outside", "Inactive")
                .on(
                    "item.mouseenter",
                    TransitionBuilder::new().action("Assign active item index to context"),
                )
                .on(
                    "item.mouseleave",
                    TransitionBuilder::new().action("Reset active item index into context"),
                )
                .on(
                    "item.click",
                    TransitionBuilder::to("Inactive")
                        .action("Assign selected item as current search input into context")
                        .action("Reset available items in context"),
                ),
        )
        .build()
        .expect("search machine is valid")
}

/// Server calls behind the authentication flow, one promise actor each.
///
/// `sign_in` and `sign_up` get `{"username", "password"}` and resolve with
/// `{"success": true, "userData": ...}` or `{"success": false, "error": ...}`.
/// `fetch_user` resolves with the stored user or `null`.
pub struct AuthBackend {
    pub fetch_user: ActorLogic,
    pub sign_in: ActorLogic,
    pub sign_up: ActorLogic,
    pub sign_out: ActorLogic,
}

pub fn authentication(backend: AuthBackend) -> Machine {
    let credentials = |_: &Context, event: &Event| -> Result<Value, ActionError> {
        Ok(json!({
            "username": event.get("username"),
            "password": event.get("password"),
        }))
    };
    let succeeded = |_: &Context, event: &Event| {
        event
            .output()
            .and_then(|output| output.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    };
    let on_sign_on_done = |src: &str| {
        InvokeBuilder::new(src)
            .input(credentials)
            .on_done(
                TransitionBuilder::to("Successfully signed on")
                    .when(succeeded)
                    .action(Action::assign_field("userData", |_, event| {
                        event
                            .output()
                            .and_then(|output| output.get("userData"))
                            .cloned()
                            .unwrap_or(Value::Null)
                    })),
            )
            .on_done(TransitionBuilder::to("Idle").action(Action::assign_field(
                "authenticationErrorToast",
                |_, event| {
                    event
                        .output()
                        .and_then(|output| output.get("error"))
                        .cloned()
                        .unwrap_or(Value::Null)
                },
            )))
            .on_error(
                TransitionBuilder::to("Idle")
                    .action(Action::set("authenticationErrorToast", "unknown error")),
            )
    };

    MachineBuilder::new("Authentication")
        .context(json!({ "userData": null, "authenticationErrorToast": null }))
        .actor("Fetch user data", backend.fetch_user)
        .actor("Sign out", backend.sign_out)
        .actor("Sign in", backend.sign_in)
        .actor("Sign up", backend.sign_up)
        .action("Clear user data in context", Action::set("userData", Value::Null))
        .action(
            "Clear authentication error toast in context",
            Action::set("authenticationErrorToast", Value::Null),
        )
        .initial("Checking if user is initially authenticated")
        .state(
            StateBuilder::new("Checking if user is initially authenticated").invoke(
                InvokeBuilder::new("Fetch user data")
                    .on_done(
                        TransitionBuilder::to("Authenticated")
                            .when(|_, event| event.output().is_some_and(|output| !output.is_null()))
                            .action(Action::assign_field("userData", |_, event| {
                                event.output().cloned().unwrap_or(Value::Null)
                            })),
                    )
                    .on_done("Not authenticated")
                    .on_error("Not authenticated"),
            ),
        )
        .state(
            StateBuilder::new("Authenticated")
                .initial("Idle")
                .state(StateBuilder::new("Idle").on("sign-out", "Signing out"))
                .state(
                    StateBuilder::new("Signing out").invoke(
                        InvokeBuilder::new("Sign out")
                            .on_done(
                                TransitionBuilder::to("Signed out")
                                    .action("Clear user data in context"),
                            )
                            .on_error("Idle"),
                    ),
                )
                .state(StateBuilder::final_state("Signed out"))
                .on_done("Not authenticated"),
        )
        .state(
            StateBuilder::new("Not authenticated")
                .entry("Clear authentication error toast in context")
                .initial("Idle")
                .state(
                    StateBuilder::new("Idle")
                        .on("sign-in", "Signing in")
                        .on("sign-up", "Signing up")
                        .on(
                            "switching sign-on page",
                            TransitionBuilder::new()
                                .action("Clear authentication error toast in context"),
                        ),
                )
                .state(
                    StateBuilder::new("Signing in")
                        .tag("Submitting sign-on form")
                        .invoke(on_sign_on_done("Sign in")),
                )
                .state(
                    StateBuilder::new("Signing up")
                        .tag("Submitting sign-on form")
                        .invoke(on_sign_on_done("Sign up")),
                )
                .state(StateBuilder::final_state("Successfully signed on"))
                .on_done("Authenticated"),
        )
        .build()
        .expect("authentication machine is valid")
}

pub fn video_player() -> Machine {
    let animate = |animation: &'static str, target: &'static str| {
        TransitionBuilder::to(target)
            .when(move |_, event| event.get("animation").and_then(Value::as_str) == Some(animation))
            .action("Set animation timestamp to now")
    };
    let animation = |name: &str| Event::with_data("animate", json!({ "animation": name }));
    let (playing, paused) = (animation("playing"), animation("paused"));

    MachineBuilder::new("Video Player")
        .context_from_input(|input| {
            Ok(Context::new()
                .with("videoSrc", input.get("videoSrc").cloned().unwrap_or_default())
                .with("currentVideoSrc", Value::Null)
                .with("videoDuration", Value::Null)
                .with("videoCurrentTime", 0)
                .with("muted", false)
                .with("volume", 1.0)
                .with("animationActionTimestamp", ""))
        })
        .action("Play the video", Action::custom("Play the video", |_, _, _| Ok(())))
        .action("Pause the video", Action::custom("Pause the video", |_, _, _| Ok(())))
        .action(
            "Set animation timestamp to now",
            Action::assign_field("animationActionTimestamp", |_, _| {
                json!(chrono::Utc::now().to_rfc3339())
            }),
        )
        .parallel()
        .state(
            StateBuilder::new("Video")
                .initial("Stopped")
                .state(
                    StateBuilder::new("Stopped")
                        .tag("Show loading overlay")
                        .on(
                            "play",
                            TransitionBuilder::to("Initial loading").action(Action::assign_field(
                                "currentVideoSrc",
                                |context, _| context.get("videoSrc").cloned().unwrap_or_default(),
                            )),
                        )
                        .on(
                            "toggle.*",
                            TransitionBuilder::to("Initial loading").action(Action::assign_field(
                                "currentVideoSrc",
                                |context, _| context.get("videoSrc").cloned().unwrap_or_default(),
                            )),
                        ),
                )
                .state(
                    StateBuilder::new("Initial loading")
                        .initial("Hide")
                        .state(StateBuilder::new("Hide").tag("Show loading overlay").after(500, "Show"))
                        .state(StateBuilder::new("Show").tag("Show loader"))
                        .on(
                            "metadata.loaded",
                            TransitionBuilder::to("#Video Player.Video.Ready").action(
                                Action::assign_field("videoDuration", |_, event| {
                                    event.get("videoDuration").cloned().unwrap_or_default()
                                }),
                            ),
                        ),
                )
                .state(
                    StateBuilder::parallel("Ready")
                        .state(
                            StateBuilder::new("Controls")
                                .initial("Playing")
                                .state(
                                    StateBuilder::new("Playing")
                                        .entry("Play the video")
                                        .initial("Hovering")
                                        .state(StateBuilder::new("Idle").on("hover.hovering", "Hovering"))
                                        .state(
                                            StateBuilder::new("Hovering")
                                                .tag("Show controls")
                                                .after(2000, "Idle")
                                                .on("hover.end", "Idle")
                                                .on(
                                                    "hover.hovering",
                                                    TransitionBuilder::to("Hovering").reenter(true),
                                                ),
                                        )
                                        .on("waiting", "Loading")
                                        .on("pause", "Paused")
                                        .on("toggle", "Paused")
                                        .on(
                                            "toggle.*",
                                            TransitionBuilder::to("Paused").action(Action::raise(paused)),
                                        )
                                        .on(
                                            "time.update",
                                            TransitionBuilder::new().action(Action::assign_field(
                                                "videoCurrentTime",
                                                |_, event| event.get("currentTime").cloned().unwrap_or_default(),
                                            )),
                                        ),
                                )
                                .state(StateBuilder::new("Loading").tag("Show loader").on("canplay", "Playing"))
                                .state(
                                    StateBuilder::new("Paused")
                                        .tag("Show controls")
                                        .entry("Pause the video")
                                        .on("play", "Playing")
                                        .on("toggle", "Playing")
                                        .on(
                                            "toggle.*",
                                            TransitionBuilder::to("Playing").action(Action::raise(playing)),
                                        ),
                                )
                                .on(
                                    "volume.mute.toggle",
                                    TransitionBuilder::new().action(Action::assign_field("muted", |context, _| {
                                        json!(!context.get_bool("muted").unwrap_or(false))
                                    })),
                                ),
                        )
                        .state(
                            StateBuilder::new("Animation")
                                .initial("Idle")
                                .state(StateBuilder::new("Idle"))
                                .state(
                                    StateBuilder::new("Animating playing state")
                                        .tag("Animate action")
                                        .tag("Animate playing state"),
                                )
                                .state(
                                    StateBuilder::new("Animating paused state")
                                        .tag("Animate action")
                                        .tag("Animate paused state"),
                                )
                                .on("play-state-animation.end", ".Idle")
                                .on("animate", animate("playing", ".Animating playing state"))
                                .on("animate", animate("paused", ".Animating paused state")),
                        ),
                ),
        )
        .state(
            StateBuilder::new("Fullscreen")
                .initial("Off")
                .state(
                    StateBuilder::new("Off")
                        .initial("Idle")
                        .state(StateBuilder::new("Idle").on("fullscreen.toggle", "Waiting for acknowledgement"))
                        .state(
                            StateBuilder::new("Waiting for acknowledgement")
                                .on("fullscreen.expanded", "Done")
                                .on("fullscreen.error", "Idle")
                                .on("fullscreen.exited", "Idle"),
                        )
                        .state(StateBuilder::final_state("Done"))
                        .on_done("On"),
                )
                .state(
                    StateBuilder::new("On")
                        .initial("Idle")
                        .state(StateBuilder::new("Idle").on("fullscreen.toggle", "Waiting for acknowledgement"))
                        .state(
                            StateBuilder::new("Waiting for acknowledgement")
                                .on("fullscreen.exited", "Done")
                                .on("fullscreen.error", "Idle")
                                .on("fullscreen.expanded", "Idle"),
                        )
                        .state(StateBuilder::final_state("Done"))
                        .on_done("Off"),
                ),
        )
        .build()
        .expect("video player machine is valid")
}

/// Inactivity tracker. `listener` stands in for the DOM listeners and
/// sends `activity` events carrying an `at` timestamp.
pub fn user_activity(listener: ActorLogic) -> Machine {
    MachineBuilder::new("User activity")
        .context_from_input(|input| {
            Ok(Context::new()
                .with("timeout", input.get("timeout").cloned().unwrap_or(json!(60_000)))
                .with("lastActive", 0))
        })
        .actor("Listen to DOM events", listener)
        .delay("Inactivity timeout", |context, _| {
            Ok(Duration::from_millis(
                context.get("timeout").and_then(Value::as_u64).unwrap_or(60_000),
            ))
        })
        .action(
            "Assign last active timestamp to context",
            Action::assign_field("lastActive", |context, event| {
                event
                    .get("at")
                    .cloned()
                    .unwrap_or_else(|| context.get("lastActive").cloned().unwrap_or_default())
            }),
        )
        .invoke(InvokeBuilder::new("Listen to DOM events"))
        .initial("Active")
        .state(
            StateBuilder::new("Active")
                .initial("Idle")
                .state(
                    StateBuilder::new("Idle")
                        .after("Inactivity timeout", "Done")
                        .on(
                            "activity",
                            TransitionBuilder::to("Deduplicating")
                                .action("Assign last active timestamp to context"),
                        ),
                )
                .state(StateBuilder::new("Deduplicating").after(50, "Idle"))
                .state(StateBuilder::final_state("Done"))
                .on_done("Inactive"),
        )
        .state(
            StateBuilder::new("Inactive").on(
                "activity",
                TransitionBuilder::to("Active").action("Assign last active timestamp to context"),
            ),
        )
        .build()
        .expect("user activity machine is valid")
}
