//! Ambient interaction signals and the hub listeners attach to
//!
//! The host forwards clicks, form submissions and history navigation
//! into [`SignalHub::dispatch`]; auto-instrumentation sources register
//! listeners on the hub.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::environment::Location;

/// A link element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Resolved URL
    pub href: String,

    /// Hostname plus non-default port of the target
    pub host: String,

    /// Path of the target, without query or fragment
    pub pathname: String,
}

impl Link {
    /// Build a link from an absolute URL
    pub fn new(href: &str) -> Self {
        Location::parse(href).into()
    }

    /// Build a link from a reference relative to the page it sits on
    pub fn resolve(href: &str, page: &Location) -> Self {
        page.join(href).into()
    }
}

impl From<Location> for Link {
    fn from(location: Location) -> Self {
        Self {
            href: location.href,
            host: location.host,
            pathname: location.pathname,
        }
    }
}

/// A form element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    /// Action URL the form submits to
    pub action: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Form {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            id: None,
            name: None,
        }
    }
}

/// An observed interaction or navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A click; `link` is the closest enclosing link, if any
    Click { link: Option<Link> },

    /// A form submission
    Submit { form: Form },

    /// Back/forward history navigation
    PopState,
}

impl Signal {
    pub fn click(link: Link) -> Self {
        Signal::Click { link: Some(link) }
    }

    pub fn submit(form: Form) -> Self {
        Signal::Submit { form }
    }

    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Click { .. } => SignalKind::Click,
            Signal::Submit { .. } => SignalKind::Submit,
            Signal::PopState => SignalKind::PopState,
        }
    }
}

/// Signal discriminant listeners register for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Click,
    Submit,
    PopState,
}

/// A registered listener
pub type Listener = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Registry of signal listeners
pub struct SignalHub {
    listeners: RwLock<Vec<(SignalKind, Listener)>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for one kind of signal
    pub fn add_listener(&self, kind: SignalKind, listener: Listener) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push((kind, listener)),
            Err(poisoned) => poisoned.into_inner().push((kind, listener)),
        }
    }

    /// Deliver a signal to every listener of its kind.
    ///
    /// Listeners run outside the table lock. Returns how many ran.
    pub fn dispatch(&self, signal: &Signal) -> usize {
        let kind = signal.kind();
        let matching: Vec<Listener> = match self.listeners.read() {
            Ok(listeners) => listeners
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, l)| Arc::clone(l))
                .collect(),
            Err(_) => Vec::new(),
        };

        for listener in &matching {
            listener(signal);
        }
        matching.len()
    }

    pub fn listener_count(&self, kind: SignalKind) -> usize {
        self.listeners
            .read()
            .map(|l| l.iter().filter(|(k, _)| *k == kind).count())
            .unwrap_or(0)
    }
}

impl Default for SignalHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_by_kind() {
        let hub = SignalHub::new();
        let clicks = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&clicks);
        hub.add_listener(
            SignalKind::Click,
            Arc::new(move |_: &Signal| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert_eq!(hub.dispatch(&Signal::click(Link::new("https://a.example.com/"))), 1);
        assert_eq!(hub.dispatch(&Signal::PopState), 0);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count(SignalKind::Click), 1);
        assert_eq!(hub.listener_count(SignalKind::Submit), 0);
    }

    #[test]
    fn test_listener_may_register_during_dispatch() {
        let hub = Arc::new(SignalHub::new());
        let inner = Arc::clone(&hub);
        hub.add_listener(
            SignalKind::PopState,
            Arc::new(move |_: &Signal| {
                inner.add_listener(SignalKind::Submit, Arc::new(|_: &Signal| {}))
            }),
        );

        hub.dispatch(&Signal::PopState);
        assert_eq!(hub.listener_count(SignalKind::Submit), 1);
    }

    #[test]
    fn test_link_resolution() {
        let page = Location::parse("https://example.com/blog/post");
        let link = Link::resolve("/files/a.pdf?v=2", &page);
        assert_eq!(link.host, "example.com");
        assert_eq!(link.pathname, "/files/a.pdf");
        assert_eq!(link.href, "https://example.com/files/a.pdf?v=2");
    }
}
