//! Dingolytics SDK - client-side analytics events
//!
//! The tracker is the client-side component that:
//! - Snapshots the host environment once at construction
//! - Assigns a durable anonymous client identifier
//! - Assembles events from a shared template plus per-call overrides
//! - Auto-generates events from interaction signals
//! - Delivers every event asynchronously, reporting the outcome once
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TRACKER                               │
//! │                                                              │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ Environment │  │  Identity   │  │   Config    │          │
//! │  │  Snapshot   │  │  (storage)  │  │  Resolver   │          │
//! │  └─────────────┘  └─────────────┘  └─────────────┘          │
//! │         │                │                │                  │
//! │         └────────────────┼────────────────┘                  │
//! │                    ┌─────▼─────┐        ┌─────────────┐      │
//! │                    │  Event    │◄───────│ Auto-track  │      │
//! │                    │ Template  │        │  Registry   │      │
//! │                    └───────────┘        └──────▲──────┘      │
//! │                          │                     │ signals     │
//! │                    ┌─────▼─────┐        ┌──────┴──────┐      │
//! │                    │ Delivery  │        │ Signal Hub  │      │
//! │                    └───────────┘        └─────────────┘      │
//! │                          │                                   │
//! │  ┌───────────────────────┼───────────────────────┐          │
//! │  │            TRANSPORT LAYER                     │          │
//! │  │       ┌──────┐            ┌────────┐           │          │
//! │  │       │ HTTP │            │ Memory │           │          │
//! │  │       └──────┘            └────────┘           │          │
//! │  └───────────────────────────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dingolytics::{StaticHost, Tracker, TrackerConfig};
//!
//! let config = TrackerConfig::new("my-app", "https://collect.example.com/events")
//!     .with_auto_track_events(["page_view", "external_link"]);
//!
//! let host = Arc::new(StaticHost::new("https://example.com/pricing"));
//! let tracker = Tracker::builder(config)
//!     .host(host)
//!     .callback(|outcome| println!("{:?}", outcome))
//!     .build()?;
//!
//! tracker.init();
//! tracker.set_user(Some("user-42"));
//! tracker.track_event("signup", serde_json::json!({"attrs": {"plan": "pro"}}));
//! ```

pub mod autotrack;
pub mod config;
pub mod delivery;
pub mod environment;
pub mod error;
pub mod event;
pub mod identity;
pub mod signals;
pub mod transport;

pub use autotrack::{Activation, AutoTrack, LinkClassifier};
pub use config::{TrackerConfig, DEFAULT_STORAGE_CLIENT_ID_KEY};
pub use delivery::{DeliveryCallback, DeliveryOutcome};
pub use environment::{Environment, HostEnvironment, HostFacts, Location, StaticHost};
pub use error::{TrackerError, TrackerResult};
pub use event::{Event, EventTemplate};
pub use identity::{get_or_create_client_id, ClientStorage, FileStorage, SessionStorage};
pub use signals::{Form, Link, Signal, SignalHub, SignalKind};
pub use transport::{HttpTransport, MemoryTransport, Transport};

use std::sync::{Arc, Weak};

use serde_json::{Map, Value};

use autotrack::AutoTrackRegistry;
use delivery::Dispatcher;
use event::{Assembled, Overrides};

/// The analytics tracker
///
/// Cheap to clone; clones share the same template, identity and listeners.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    /// Configuration
    config: TrackerConfig,

    /// Base record for every event
    template: EventTemplate,

    /// Host environment, read again for the current location
    host: Arc<dyn HostEnvironment>,

    /// Fire-and-forget delivery
    dispatcher: Dispatcher,

    /// Signal listeners
    signals: SignalHub,

    /// Auto-instrumentation sources
    autotrack: AutoTrackRegistry,
}

/// Non-owning tracker handle held by signal listeners
#[derive(Clone)]
pub(crate) struct WeakTracker {
    inner: Weak<TrackerInner>,
}

impl WeakTracker {
    pub(crate) fn upgrade(&self) -> Option<Tracker> {
        self.inner.upgrade().map(|inner| Tracker { inner })
    }
}

impl Tracker {
    /// Start building a tracker
    pub fn builder(config: TrackerConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Build a tracker with default capabilities: an empty host, session
    /// storage and HTTP delivery
    pub fn new(config: TrackerConfig) -> TrackerResult<Self> {
        Self::builder(config).build()
    }

    /// Activate the configured auto-instrumentation sources.
    ///
    /// Unknown names are reported and skipped. Calling this again does
    /// not attach anything twice.
    pub fn init(&self) {
        let debug = self.inner.config.debug;
        if debug {
            tracing::debug!(
                target: "dingolytics",
                app = %self.inner.config.app,
                sources = ?self.inner.config.auto_track_events,
                "init"
            );
        }

        for name in &self.inner.config.auto_track_events {
            match self.inner.autotrack.activate(name, self) {
                Activation::Activated(source) if debug => {
                    tracing::debug!(target: "dingolytics", source = %source, "auto-track source activated");
                }
                Activation::AlreadyActive(source) if debug => {
                    tracing::debug!(target: "dingolytics", source = %source, "auto-track source already active");
                }
                Activation::Unknown if debug => {
                    tracing::warn!(target: "dingolytics", name = %name, "unknown auto-track source, skipping");
                }
                _ => {}
            }
        }
    }

    /// Set or clear the user identity for events assembled from now on
    pub fn set_user(&self, user_id: Option<&str>) {
        self.inner.template.set_user_id(user_id);
        if self.inner.config.debug {
            tracing::debug!(target: "dingolytics", user_id = ?self.inner.template.user_id(), "set user");
        }
    }

    /// Track a custom event.
    ///
    /// `properties` is an object merged over the template (use `attrs`
    /// for free-form data) or null. The event name is applied last.
    pub fn track_event(&self, name: &str, properties: Value) {
        let mut overrides = match properties {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return self.inner.dispatcher.fail(TrackerError::InvalidProperties(format!(
                    "expected an object, got {}",
                    json_kind(&other)
                )));
            }
        };
        overrides.insert("event".to_string(), Value::String(name.to_string()));
        self.track(overrides);
    }

    /// Track a page view; `None` uses the current location
    pub fn track_page_view(&self, path: Option<&str>) {
        let mut overrides = event_overrides(event::PAGE_VIEW);
        if let Some(path) = path {
            overrides.insert("path".to_string(), Value::String(path.to_string()));
        }
        self.track(overrides);
    }

    pub fn track_document_download(&self, path: &str) {
        self.track_path(event::DOCUMENT_DOWNLOAD, path);
    }

    pub fn track_external_link(&self, path: &str) {
        self.track_path(event::EXTERNAL_LINK, path);
    }

    /// Track a form submission; the path is the form's action URL
    pub fn track_form_submit(&self, form: &Form) {
        self.track_path(event::FORM_SUBMIT, &form.action);
    }

    /// Forward a host signal to the registered listeners
    pub fn dispatch_signal(&self, signal: &Signal) -> usize {
        self.inner.signals.dispatch(signal)
    }

    pub fn signals(&self) -> &SignalHub {
        &self.inner.signals
    }

    pub fn client_id(&self) -> &str {
        self.inner.template.client_id()
    }

    pub fn user_id(&self) -> Option<String> {
        self.inner.template.user_id()
    }

    pub fn environment(&self) -> &Environment {
        self.inner.template.environment()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Sources activated so far, in declaration order
    pub fn active_sources(&self) -> Vec<AutoTrack> {
        self.inner.autotrack.active()
    }

    pub fn current_location(&self) -> Location {
        self.inner.host.location()
    }

    pub(crate) fn classify_click(&self, link: &Link) -> Option<AutoTrack> {
        let location = self.current_location();
        self.inner.autotrack.classify_click(link, &location.host)
    }

    pub(crate) fn downgrade(&self) -> WeakTracker {
        WeakTracker {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn track_path(&self, name: &str, path: &str) {
        let mut overrides = event_overrides(name);
        overrides.insert("path".to_string(), Value::String(path.to_string()));
        self.track(overrides);
    }

    /// Assemble one event and hand it to delivery
    fn track(&self, overrides: Overrides) {
        let location = self.current_location();
        match self.inner.template.assemble(&location.href, overrides) {
            Ok(Assembled { event, dropped }) => {
                if self.inner.config.debug && !dropped.is_empty() {
                    tracing::debug!(target: "dingolytics", fields = ?dropped, "ignoring unknown event fields");
                }
                self.inner.dispatcher.dispatch(event);
            }
            Err(error) => self.inner.dispatcher.fail(error),
        }
    }
}

fn event_overrides(name: &str) -> Overrides {
    let mut overrides = Map::new();
    overrides.insert("event".to_string(), Value::String(name.to_string()));
    overrides
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Builder wiring capabilities into a [`Tracker`]
pub struct TrackerBuilder {
    config: TrackerConfig,
    host: Option<Arc<dyn HostEnvironment>>,
    storage: Option<Arc<dyn ClientStorage>>,
    transport: Option<Arc<dyn Transport>>,
    callback: Option<DeliveryCallback>,
}

impl TrackerBuilder {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            host: None,
            storage: None,
            transport: None,
            callback: None,
        }
    }

    /// Host environment (default: an empty [`StaticHost`])
    pub fn host(mut self, host: Arc<dyn HostEnvironment>) -> Self {
        self.host = Some(host);
        self
    }

    /// Client id storage (default: a fresh [`SessionStorage`])
    pub fn storage(mut self, storage: Arc<dyn ClientStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Delivery transport (default: [`HttpTransport`])
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Delivery outcome sink
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(DeliveryOutcome) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Snapshot the environment, resolve the client id and build the tracker.
    ///
    /// Storage and environment failures are returned here.
    pub fn build(self) -> TrackerResult<Tracker> {
        let config = self.config;
        let host: Arc<dyn HostEnvironment> = match self.host {
            Some(host) => host,
            None => Arc::new(StaticHost::default()),
        };
        let storage: Arc<dyn ClientStorage> = match self.storage {
            Some(storage) => storage,
            None => Arc::new(SessionStorage::new()),
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new()),
        };

        let environment = Environment::capture(host.as_ref())?;
        let (client_id, created) =
            identity::resolve_client_id(storage.as_ref(), &config.storage_client_id_key)?;

        if config.debug {
            tracing::debug!(
                target: "dingolytics",
                client_id = %client_id,
                created,
                storage = storage.name(),
                transport = transport.name(),
                "client identity resolved"
            );
        }

        let template = EventTemplate::new(config.app.clone(), client_id, environment);
        let dispatcher = Dispatcher::new(transport, config.dsn.clone(), self.callback, config.debug);

        Ok(Tracker {
            inner: Arc::new(TrackerInner {
                config,
                template,
                host,
                dispatcher,
                signals: SignalHub::new(),
                autotrack: AutoTrackRegistry::new(),
            }),
        })
    }
}
