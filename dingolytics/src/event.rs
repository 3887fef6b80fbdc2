//! Event records and the template they are assembled from

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::environment::Environment;
use crate::error::TrackerResult;

/// Name of the page view event
pub const PAGE_VIEW: &str = "page_view";
/// Name of the document download event
pub const DOCUMENT_DOWNLOAD: &str = "document_download";
/// Name of the external link event
pub const EXTERNAL_LINK: &str = "external_link";
/// Name of the form submission event
pub const FORM_SUBMIT: &str = "form_submit";

/// A single analytics event, exactly as transmitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub app: String,
    pub client_id: String,
    pub user_id: Option<String>,
    pub event: String,
    pub path: String,
    pub host: String,

    /// Serialized custom properties, or null when none were given
    pub attrs_raw: Option<String>,

    pub client_user_agent: String,
    pub client_name: String,
    pub client_version: String,
    pub is_mobile: bool,
    pub os_name: String,
    pub os_version: String,
    pub referrer: String,
}

/// Per-call override fields, merged over the template
pub type Overrides = Map<String, Value>;

/// Base record shared by every event
///
/// Everything except the user identity is fixed at construction.
/// The identity lives in its own cell so `set_user` never touches the
/// rest of the record.
#[derive(Debug)]
pub struct EventTemplate {
    app: String,
    client_id: String,
    environment: Environment,
    user_id: RwLock<Option<String>>,
}

impl EventTemplate {
    pub fn new(app: impl Into<String>, client_id: impl Into<String>, environment: Environment) -> Self {
        Self {
            app: app.into(),
            client_id: client_id.into(),
            environment,
            user_id: RwLock::new(None),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn user_id(&self) -> Option<String> {
        match self.user_id.read() {
            Ok(user_id) => user_id.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the user identity. Empty strings clear it.
    pub fn set_user_id(&self, user_id: Option<&str>) {
        let next = user_id.filter(|id| !id.is_empty()).map(str::to_string);
        match self.user_id.write() {
            Ok(mut user_id) => *user_id = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// The template as a record, with the current identity and `path`
    pub fn base(&self, path: &str) -> Event {
        let env = &self.environment;
        Event {
            app: self.app.clone(),
            client_id: self.client_id.clone(),
            user_id: self.user_id(),
            event: String::new(),
            path: path.to_string(),
            host: env.host.clone(),
            attrs_raw: None,
            client_user_agent: env.user_agent.clone(),
            client_name: env.client_name.clone(),
            client_version: env.client_version.clone(),
            is_mobile: env.is_mobile,
            os_name: env.os_name.clone(),
            os_version: env.os_version.clone(),
            referrer: env.referrer.clone(),
        }
    }

    /// Merge `overrides` over the template.
    ///
    /// Shallow merge, override wins per key. `attrs` is collapsed into
    /// `attrs_raw`; keys that are not event fields are dropped and
    /// returned so the caller can report them.
    pub fn assemble(&self, path: &str, mut overrides: Overrides) -> TrackerResult<Assembled> {
        let attrs = overrides.remove("attrs");

        let mut record = match serde_json::to_value(self.base(path))? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        let mut dropped = Vec::new();
        for (key, value) in overrides {
            if record.contains_key(&key) {
                record.insert(key, value);
            } else {
                dropped.push(key);
            }
        }

        let attrs_raw = match attrs {
            None | Some(Value::Null) => Value::Null,
            Some(attrs) => Value::String(serde_json::to_string(&attrs)?),
        };
        record.insert("attrs_raw".to_string(), attrs_raw);

        let event = serde_json::from_value(Value::Object(record))?;
        Ok(Assembled { event, dropped })
    }
}

/// Result of assembling one event
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub event: Event,

    /// Override keys that were not event fields
    pub dropped: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template() -> EventTemplate {
        let env = Environment {
            user_agent: "test-agent".into(),
            client_name: "Chrome".into(),
            client_version: "120.0".into(),
            os_name: "Linux".into(),
            os_version: String::new(),
            is_mobile: false,
            referrer: "https://ref.example.com/".into(),
            host: "example.com".into(),
        };
        EventTemplate::new("acme", "0b1f2c3d-4e5f-4a6b-8c7d-8e9fa0b1c2d3", env)
    }

    fn overrides(value: Value) -> Overrides {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_override_wins_and_rest_untouched() {
        let template = template();
        let before = template.base("https://example.com/");

        let assembled = template
            .assemble(
                "https://example.com/",
                overrides(json!({"event": "signup", "path": "/welcome"})),
            )
            .unwrap();

        let expected = Event {
            event: "signup".into(),
            path: "/welcome".into(),
            ..before.clone()
        };
        assert_eq!(assembled.event, expected);
        assert!(assembled.dropped.is_empty());
        assert_eq!(template.base("https://example.com/"), before);
    }

    #[test]
    fn test_attrs_collapsed_into_raw() {
        let assembled = template()
            .assemble("/", overrides(json!({"event": "e", "attrs": {"a": 1}})))
            .unwrap();
        assert_eq!(assembled.event.attrs_raw.as_deref(), Some(r#"{"a":1}"#));

        let wire = serde_json::to_value(&assembled.event).unwrap();
        assert!(wire.get("attrs").is_none());
        assert_eq!(wire["attrs_raw"], json!(r#"{"a":1}"#));
    }

    #[test]
    fn test_missing_or_null_attrs_give_null_raw() {
        let t = template();
        let none = t.assemble("/", overrides(json!({"event": "e"}))).unwrap();
        assert_eq!(none.event.attrs_raw, None);

        let null = t.assemble("/", overrides(json!({"event": "e", "attrs": null}))).unwrap();
        assert_eq!(null.event.attrs_raw, None);

        // a stray attrs_raw cannot bypass the collapse
        let stray = t
            .assemble("/", overrides(json!({"event": "e", "attrs_raw": "{}"})))
            .unwrap();
        assert_eq!(stray.event.attrs_raw, None);
    }

    #[test]
    fn test_unknown_keys_dropped() {
        let assembled = template()
            .assemble("/", overrides(json!({"event": "e", "colour": "red"})))
            .unwrap();
        assert_eq!(assembled.dropped, vec!["colour".to_string()]);

        let wire = serde_json::to_value(&assembled.event).unwrap();
        assert!(wire.get("colour").is_none());
        assert_eq!(wire.as_object().unwrap().len(), 14);
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let result = template().assemble("/", overrides(json!({"event": "e", "path": 5})));
        assert!(result.is_err());
    }

    #[test]
    fn test_user_identity_cell() {
        let t = template();
        let before = t.base("/");
        assert_eq!(before.user_id, None);

        t.set_user_id(Some("u1"));
        assert_eq!(t.base("/").user_id.as_deref(), Some("u1"));
        // records built earlier keep their identity
        assert_eq!(before.user_id, None);

        t.set_user_id(Some(""));
        assert_eq!(t.user_id(), None);
    }
}
