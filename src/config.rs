//! Configuration for actor systems and individual actors.

use crate::actor::Inspector;
use crate::actor::inspect::Inspection;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Settings shared by every actor in an [`ActorSystem`](crate::actor::ActorSystem).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Microsteps allowed in one macrostep before the actor is put in the
    /// error status. Guards against eventless transitions that never settle.
    pub max_microsteps: usize,

    /// Verify after every microstep that the configuration is complete.
    pub check_configuration: bool,

    /// Emit a debug record for events no active state handles.
    pub log_unhandled_events: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            max_microsteps: 10_000,
            check_configuration: true,
            log_unhandled_events: false,
        }
    }
}

impl SystemConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// ```rust
    /// use machina::config::SystemConfig;
    ///
    /// let config = SystemConfig::from_json_str(r#"{ "max_microsteps": 50 }"#).unwrap();
    /// assert_eq!(config.max_microsteps, 50);
    /// assert!(config.check_configuration);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SystemConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_microsteps == 0 {
            return Err(ConfigError::Invalid {
                field: "max_microsteps",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Options for a root actor created with
/// [`ActorSystem::create_actor`](crate::actor::ActorSystem::create_actor).
#[derive(Clone, Default)]
pub struct ActorOptions {
    /// Actor id. Defaults to the machine id, suffixed when already taken.
    pub id: Option<String>,
    /// Input passed to context initialization and the init event.
    pub input: Value,
    /// Receives an inspection record for everything the actor and its
    /// descendants do.
    pub inspect: Option<Inspector>,
}

impl ActorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn inspect<F>(mut self, inspect: F) -> Self
    where
        F: Fn(&Inspection) + 'static,
    {
        self.inspect = Some(Rc::new(inspect));
        self
    }
}

impl fmt::Debug for ActorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorOptions")
            .field("id", &self.id)
            .field("input", &self.input)
            .field("inspect", &self.inspect.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_sensible() {
        let config = SystemConfig::default();
        assert_eq!(config.max_microsteps, 10_000);
        assert!(config.check_configuration);
        assert!(!config.log_unhandled_events);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SystemConfig::from_json_str(r#"{ "log_unhandled_events": true }"#).unwrap();
        assert!(config.log_unhandled_events);
        assert_eq!(config.max_microsteps, 10_000);
    }

    #[test]
    fn rejects_zero_microsteps() {
        let err = SystemConfig::from_json_str(r#"{ "max_microsteps": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "max_microsteps",
                ..
            }
        ));
        assert!(SystemConfig::from_json_str("not json").is_err());
    }

    #[test]
    fn actor_options_builder() {
        let options = ActorOptions::new()
            .id("center")
            .input(json!({ "timeout": 5000 }))
            .inspect(|_| {});
        assert_eq!(options.id.as_deref(), Some("center"));
        assert_eq!(options.input, json!({ "timeout": 5000 }));
        assert!(options.inspect.is_some());
    }
}
