//! Configuration for the Dingolytics tracker

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TrackerResult;

/// Storage key the client identifier lives under unless overridden
pub const DEFAULT_STORAGE_CLIENT_ID_KEY: &str = "dingolytics:client_id";

/// Tracker configuration
///
/// Caller-supplied fields are overlaid onto the defaults below. Nothing is
/// validated beyond the presence of `app` and `dsn`; auto-track names are
/// kept as plain strings and checked when the tracker is initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Tenant / application key stamped on every event
    pub app: String,

    /// Collector URL events are posted to
    pub dsn: String,

    /// Emit internal diagnostics through `tracing`
    #[serde(default)]
    pub debug: bool,

    /// Auto-instrumentation sources to enable, in activation order
    #[serde(default = "default_auto_track_events")]
    pub auto_track_events: Vec<String>,

    /// Storage key for the client identifier
    #[serde(default = "default_storage_client_id_key")]
    pub storage_client_id_key: String,
}

fn default_auto_track_events() -> Vec<String> {
    vec!["page_view".to_string()]
}

fn default_storage_client_id_key() -> String {
    DEFAULT_STORAGE_CLIENT_ID_KEY.to_string()
}

impl TrackerConfig {
    /// Create a configuration with the required fields and defaults for the rest
    pub fn new(app: impl Into<String>, dsn: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            dsn: dsn.into(),
            debug: false,
            auto_track_events: default_auto_track_events(),
            storage_client_id_key: default_storage_client_id_key(),
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_auto_track_events<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_track_events = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_storage_client_id_key(mut self, key: impl Into<String>) -> Self {
        self.storage_client_id_key = key.into();
        self
    }

    /// Parse a JSON configuration object
    pub fn from_json(json: &str) -> TrackerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn from_file(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let config = TrackerConfig::new("acme", "https://collect.example.com/e");
        assert!(!config.debug);
        assert_eq!(config.auto_track_events, vec!["page_view"]);
        assert_eq!(config.storage_client_id_key, "dingolytics:client_id");
    }

    #[test]
    fn test_json_overlays_defaults() {
        let config = TrackerConfig::from_json(
            r#"{"app": "acme", "dsn": "https://c.example.com", "autoTrackEvents": ["external_link", "bogus"]}"#,
        )
        .unwrap();

        assert_eq!(config.app, "acme");
        assert_eq!(config.auto_track_events, vec!["external_link", "bogus"]);
        assert_eq!(config.storage_client_id_key, DEFAULT_STORAGE_CLIENT_ID_KEY);
        assert!(!config.debug);
    }

    #[test]
    fn test_json_requires_app_and_dsn() {
        assert!(TrackerConfig::from_json(r#"{"app": "acme"}"#).is_err());
        assert!(TrackerConfig::from_json(r#"{"dsn": "https://c.example.com"}"#).is_err());
    }

    #[test]
    fn test_explicit_empty_auto_track_list() {
        let config = TrackerConfig::from_json(
            r#"{"app": "a", "dsn": "d", "autoTrackEvents": [], "debug": true}"#,
        )
        .unwrap();
        assert!(config.auto_track_events.is_empty());
        assert!(config.debug);
    }
}
