//! Fire-and-forget event delivery
//!
//! Every tracking call ends here exactly once: either a spawned send
//! whose completion reports the outcome, or an immediate failure report
//! when the event could not be serialized or no runtime is available.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::error::TrackerError;
use crate::event::Event;
use crate::transport::{Transport, APPLICATION_JSON, CONTENT_TYPE};

const JSON_HEADERS: [(&str, &str); 1] = [(CONTENT_TYPE, APPLICATION_JSON)];

/// Result of one delivery attempt
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The request lifecycle completed
    Delivered { event: Event },

    /// Assembly, serialization or transport failed
    Failed { error: TrackerError },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    pub fn event(&self) -> Option<&Event> {
        match self {
            DeliveryOutcome::Delivered { event } => Some(event),
            DeliveryOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&TrackerError> {
        match self {
            DeliveryOutcome::Delivered { .. } => None,
            DeliveryOutcome::Failed { error } => Some(error),
        }
    }
}

/// Completion sink, invoked once per tracking call
pub type DeliveryCallback = Arc<dyn Fn(DeliveryOutcome) + Send + Sync>;

pub(crate) struct Dispatcher {
    transport: Arc<dyn Transport>,
    dsn: String,
    callback: Option<DeliveryCallback>,
    debug: bool,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        dsn: String,
        callback: Option<DeliveryCallback>,
        debug: bool,
    ) -> Self {
        Self {
            transport,
            dsn,
            callback,
            debug,
        }
    }

    /// Serialize `event` and spawn its send. Returns immediately.
    pub fn dispatch(&self, event: Event) {
        let body = match serde_json::to_string(&event) {
            Ok(body) => body,
            Err(e) => return self.fail(e.into()),
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => return self.fail(TrackerError::NoRuntime),
        };

        let transport = Arc::clone(&self.transport);
        let dsn = self.dsn.clone();
        let callback = self.callback.clone();
        let debug = self.debug;

        if debug {
            tracing::debug!(target: "dingolytics", event = %event.event, path = %event.path, dsn = %dsn, "sending event");
        }

        handle.spawn(async move {
            let outcome = match transport.send(&dsn, body, &JSON_HEADERS).await {
                Ok(()) => DeliveryOutcome::Delivered { event },
                Err(error) => DeliveryOutcome::Failed { error },
            };
            report(callback.as_ref(), debug, outcome);
        });
    }

    /// Report a failure that happened before anything was sent
    pub fn fail(&self, error: TrackerError) {
        report(self.callback.as_ref(), self.debug, DeliveryOutcome::Failed { error });
    }
}

fn report(callback: Option<&DeliveryCallback>, debug: bool, outcome: DeliveryOutcome) {
    if debug {
        match &outcome {
            DeliveryOutcome::Delivered { event } => {
                tracing::debug!(target: "dingolytics", event = %event.event, "event delivered");
            }
            DeliveryOutcome::Failed { error } => {
                tracing::debug!(target: "dingolytics", code = error.code(), error = %error, "event delivery failed");
            }
        }
    }

    if let Some(callback) = callback {
        callback(outcome);
    }
}
