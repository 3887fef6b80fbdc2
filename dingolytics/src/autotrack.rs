//! Auto-instrumentation sources
//!
//! Each source has a stable name and an activation function. Activation
//! happens at most once per tracker: repeated names in the configuration
//! and repeated `init()` calls are no-ops for an already active source.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use regex::Regex;

use crate::signals::{Link, Signal, SignalKind};
use crate::Tracker;

/// A named auto-instrumentation source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AutoTrack {
    PageView,
    History,
    ExternalLink,
    DocumentDownload,
    FormSubmit,
}

impl AutoTrack {
    pub const ALL: [AutoTrack; 5] = [
        AutoTrack::PageView,
        AutoTrack::History,
        AutoTrack::ExternalLink,
        AutoTrack::DocumentDownload,
        AutoTrack::FormSubmit,
    ];

    /// Configuration name of the source
    pub fn name(&self) -> &'static str {
        match self {
            AutoTrack::PageView => "page_view",
            AutoTrack::History => "_history",
            AutoTrack::ExternalLink => "external_link",
            AutoTrack::DocumentDownload => "document_download",
            AutoTrack::FormSubmit => "form_submit",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|source| source.name() == name)
    }

    /// Signal the source listens to; `None` for sources that fire once
    pub fn signal(&self) -> Option<SignalKind> {
        match self {
            AutoTrack::PageView => None,
            AutoTrack::History => Some(SignalKind::PopState),
            AutoTrack::ExternalLink | AutoTrack::DocumentDownload => Some(SignalKind::Click),
            AutoTrack::FormSubmit => Some(SignalKind::Submit),
        }
    }
}

impl fmt::Display for AutoTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const DOCUMENT_PATTERN: &str = r"(?i)\.(pdf|docx?|xlsx?|pptx?|odt|ods|odp|rtf|txt|csv|epub|zip|rar|7z|gz|tgz|tar|bz2|dmg|exe|msi|pkg|apk|iso|mp3|wav|ogg|flac|mp4|mov|avi|mkv|webm)$";

/// Click classification rules
pub struct LinkClassifier {
    document: Option<Regex>,
}

impl LinkClassifier {
    pub fn new() -> Self {
        Self {
            document: Regex::new(DOCUMENT_PATTERN).ok(),
        }
    }

    /// Does the link point at a document or media file?
    pub fn is_document(&self, link: &Link) -> bool {
        let path = if link.pathname.is_empty() {
            link.href.split(|c: char| c == '?' || c == '#').next().unwrap_or_default()
        } else {
            link.pathname.as_str()
        };
        self.document
            .as_ref()
            .map(|re| re.is_match(path))
            .unwrap_or(false)
    }

    /// Does the link leave `current_host`?
    pub fn is_external(&self, link: &Link, current_host: &str) -> bool {
        !link.href.is_empty() && !link.host.is_empty() && link.host != current_host
    }

    /// Pick the source a click belongs to. Documents are checked first.
    pub fn classify(
        &self,
        link: &Link,
        current_host: &str,
        document_enabled: bool,
        external_enabled: bool,
    ) -> Option<AutoTrack> {
        if document_enabled && self.is_document(link) {
            return Some(AutoTrack::DocumentDownload);
        }
        if external_enabled && self.is_external(link, current_host) {
            return Some(AutoTrack::ExternalLink);
        }
        None
    }
}

impl Default for LinkClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of activating one configured name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Activated(AutoTrack),
    AlreadyActive(AutoTrack),
    Unknown,
}

type Activate = fn(&Tracker);

/// Name-keyed table of sources and their activation functions
pub(crate) struct AutoTrackRegistry {
    table: HashMap<&'static str, (AutoTrack, Activate)>,
    activated: Mutex<HashSet<AutoTrack>>,
    classifier: LinkClassifier,
}

impl AutoTrackRegistry {
    pub fn new() -> Self {
        let mut table = HashMap::new();
        register(&mut table, AutoTrack::PageView, activate_page_view);
        register(&mut table, AutoTrack::History, activate_history);
        register(&mut table, AutoTrack::ExternalLink, activate_external_link);
        register(&mut table, AutoTrack::DocumentDownload, activate_document_download);
        register(&mut table, AutoTrack::FormSubmit, activate_form_submit);

        Self {
            table,
            activated: Mutex::new(HashSet::new()),
            classifier: LinkClassifier::new(),
        }
    }

    /// Activate the source registered under `name`, unless already active
    pub fn activate(&self, name: &str, tracker: &Tracker) -> Activation {
        let Some(&(source, activate)) = self.table.get(name) else {
            return Activation::Unknown;
        };

        let newly_active = match self.activated.lock() {
            Ok(mut activated) => activated.insert(source),
            Err(poisoned) => poisoned.into_inner().insert(source),
        };
        if !newly_active {
            return Activation::AlreadyActive(source);
        }

        activate(tracker);
        Activation::Activated(source)
    }

    pub fn is_active(&self, source: AutoTrack) -> bool {
        match self.activated.lock() {
            Ok(activated) => activated.contains(&source),
            Err(poisoned) => poisoned.into_inner().contains(&source),
        }
    }

    pub fn active(&self) -> Vec<AutoTrack> {
        let mut sources: Vec<AutoTrack> = match self.activated.lock() {
            Ok(activated) => activated.iter().copied().collect(),
            Err(poisoned) => poisoned.into_inner().iter().copied().collect(),
        };
        sources.sort();
        sources
    }

    pub fn classify_click(&self, link: &Link, current_host: &str) -> Option<AutoTrack> {
        self.classifier.classify(
            link,
            current_host,
            self.is_active(AutoTrack::DocumentDownload),
            self.is_active(AutoTrack::ExternalLink),
        )
    }
}

fn register(
    table: &mut HashMap<&'static str, (AutoTrack, Activate)>,
    source: AutoTrack,
    activate: Activate,
) {
    table.insert(source.name(), (source, activate));
}

fn activate_page_view(tracker: &Tracker) {
    let location = tracker.current_location();
    tracker.track_page_view(Some(&location.pathname));
}

fn activate_history(tracker: &Tracker) {
    let weak = tracker.downgrade();
    tracker.signals().add_listener(
        SignalKind::PopState,
        Arc::new(move |_: &Signal| {
            if let Some(tracker) = weak.upgrade() {
                let location = tracker.current_location();
                tracker.track_page_view(Some(&location.pathname));
            }
        }),
    );
}

fn activate_click_source(tracker: &Tracker, source: AutoTrack) {
    let weak = tracker.downgrade();
    tracker.signals().add_listener(
        SignalKind::Click,
        Arc::new(move |signal: &Signal| {
            let Signal::Click { link: Some(link) } = signal else {
                return;
            };
            let Some(tracker) = weak.upgrade() else {
                return;
            };
            if tracker.classify_click(link) != Some(source) {
                return;
            }
            match source {
                AutoTrack::DocumentDownload => tracker.track_document_download(&link.href),
                AutoTrack::ExternalLink => tracker.track_external_link(&link.href),
                _ => {}
            }
        }),
    );
}

fn activate_external_link(tracker: &Tracker) {
    activate_click_source(tracker, AutoTrack::ExternalLink);
}

fn activate_document_download(tracker: &Tracker) {
    activate_click_source(tracker, AutoTrack::DocumentDownload);
}

fn activate_form_submit(tracker: &Tracker) {
    let weak = tracker.downgrade();
    tracker.signals().add_listener(
        SignalKind::Submit,
        Arc::new(move |signal: &Signal| {
            if let (Signal::Submit { form }, Some(tracker)) = (signal, weak.upgrade()) {
                tracker.track_form_submit(form);
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for source in AutoTrack::ALL {
            assert_eq!(AutoTrack::from_name(source.name()), Some(source));
        }
        assert_eq!(AutoTrack::from_name("bogus"), None);
        assert_eq!(AutoTrack::from_name("history"), None);
    }

    #[test]
    fn test_document_detection_ignores_query_and_case() {
        let classifier = LinkClassifier::new();
        assert!(classifier.is_document(&Link::new("https://example.com/r/Q3-Report.PDF?dl=1")));
        assert!(classifier.is_document(&Link::new("https://example.com/a.tar.gz#frag")));
        assert!(!classifier.is_document(&Link::new("https://example.com/pdf/viewer")));
        assert!(!classifier.is_document(&Link::new("https://example.com/page?file=a.pdf")));
    }

    #[test]
    fn test_relative_href_fallback() {
        let classifier = LinkClassifier::new();
        let link = Link::new("files/a.docx?x=1");
        assert!(link.pathname.is_empty());
        assert!(classifier.is_document(&link));
        assert!(!classifier.is_external(&link, "example.com"));
    }

    #[test]
    fn test_external_detection() {
        let classifier = LinkClassifier::new();
        assert!(classifier.is_external(&Link::new("https://other.org/"), "example.com"));
        assert!(!classifier.is_external(&Link::new("https://example.com/about"), "example.com"));
        assert!(classifier.is_external(&Link::new("https://example.com:8080/"), "example.com"));
    }

    #[test]
    fn test_document_takes_precedence() {
        let classifier = LinkClassifier::new();
        let link = Link::new("https://files.other.org/whitepaper.pdf");

        assert_eq!(
            classifier.classify(&link, "example.com", true, true),
            Some(AutoTrack::DocumentDownload)
        );
        assert_eq!(
            classifier.classify(&link, "example.com", false, true),
            Some(AutoTrack::ExternalLink)
        );
        assert_eq!(classifier.classify(&link, "example.com", false, false), None);
    }
}
