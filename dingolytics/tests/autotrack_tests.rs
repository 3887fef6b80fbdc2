//! Auto-instrumentation tests

use std::sync::Arc;
use std::time::Duration;

use dingolytics::{
    AutoTrack, DeliveryOutcome, Form, Link, MemoryTransport, Signal, SignalKind, StaticHost,
    Tracker, TrackerConfig,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

struct Harness {
    tracker: Tracker,
    transport: Arc<MemoryTransport>,
    host: Arc<StaticHost>,
    outcomes: UnboundedReceiver<DeliveryOutcome>,
}

fn harness(sources: &[&str]) -> Harness {
    let config = TrackerConfig::new("acme", "https://collect.example.com/events")
        .with_auto_track_events(sources.iter().copied());
    let transport = Arc::new(MemoryTransport::new());
    let host = Arc::new(StaticHost::new("https://example.com/docs/start"));
    let (tx, outcomes) = unbounded_channel();

    let tracker = Tracker::builder(config)
        .host(host.clone())
        .transport(transport.clone())
        .callback(move |outcome| {
            let _ = tx.send(outcome);
        })
        .build()
        .unwrap();

    Harness {
        tracker,
        transport,
        host,
        outcomes,
    }
}

/// Let spawned deliveries finish and collect every reported event name and path
async fn drain(rx: &mut UnboundedReceiver<DeliveryOutcome>) -> Vec<(String, String)> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(outcome) = rx.try_recv() {
        let event = outcome.event().expect("delivery succeeded");
        events.push((event.event.clone(), event.path.clone()));
    }
    events
}

fn click(href: &str) -> Signal {
    Signal::click(Link::new(href))
}

#[tokio::test]
async fn test_external_link_click() {
    let mut h = harness(&["external_link"]);
    h.tracker.init();

    h.tracker.dispatch_signal(&click("https://partner.example.org/offer"));

    assert_eq!(
        drain(&mut h.outcomes).await,
        vec![(
            "external_link".to_string(),
            "https://partner.example.org/offer".to_string()
        )]
    );
}

#[tokio::test]
async fn test_external_pdf_without_download_source_is_external_link() {
    let mut h = harness(&["external_link"]);
    h.tracker.init();

    h.tracker.dispatch_signal(&click("https://files.example.org/whitepaper.pdf"));

    let events = drain(&mut h.outcomes).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "external_link");
}

#[tokio::test]
async fn test_document_download_wins_over_external_link() {
    let mut h = harness(&["external_link", "document_download"]);
    h.tracker.init();

    h.tracker.dispatch_signal(&click("https://files.example.org/whitepaper.pdf"));

    assert_eq!(
        drain(&mut h.outcomes).await,
        vec![(
            "document_download".to_string(),
            "https://files.example.org/whitepaper.pdf".to_string()
        )]
    );
    assert_eq!(h.transport.len(), 1);
}

#[tokio::test]
async fn test_same_host_document_download() {
    let mut h = harness(&["document_download"]);
    h.tracker.init();

    h.tracker
        .dispatch_signal(&click("https://example.com/files/Price-List.XLSX?rev=3"));

    let events = drain(&mut h.outcomes).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "document_download");
}

#[tokio::test]
async fn test_internal_click_is_ignored() {
    let mut h = harness(&["external_link", "document_download"]);
    h.tracker.init();

    assert_eq!(h.tracker.dispatch_signal(&click("https://example.com/about")), 2);
    assert_eq!(h.tracker.dispatch_signal(&Signal::Click { link: None }), 2);

    assert!(drain(&mut h.outcomes).await.is_empty());
    assert!(h.transport.is_empty());
}

#[tokio::test]
async fn test_external_check_uses_current_host() {
    let mut h = harness(&["external_link"]);
    h.tracker.init();

    h.host.navigate("https://shop.example.net/");
    h.tracker.dispatch_signal(&click("https://shop.example.net/cart"));
    h.tracker.dispatch_signal(&click("https://example.com/"));

    assert_eq!(
        drain(&mut h.outcomes).await,
        vec![("external_link".to_string(), "https://example.com/".to_string())]
    );
}

#[tokio::test]
async fn test_unknown_source_does_not_block_others() {
    let mut h = harness(&["bogus", "external_link"]);
    h.tracker.init();

    assert_eq!(h.tracker.active_sources(), vec![AutoTrack::ExternalLink]);

    h.tracker.dispatch_signal(&click("https://other.org/"));
    assert_eq!(drain(&mut h.outcomes).await.len(), 1);
}

#[tokio::test]
async fn test_activation_is_idempotent() {
    let mut h = harness(&["external_link", "external_link", "page_view", "page_view"]);
    h.tracker.init();
    h.tracker.init();

    assert_eq!(h.tracker.signals().listener_count(SignalKind::Click), 1);

    // one initial page view, however often it is listed or init runs
    let events = drain(&mut h.outcomes).await;
    assert_eq!(events, vec![("page_view".to_string(), "/docs/start".to_string())]);

    h.tracker.dispatch_signal(&click("https://other.org/"));
    assert_eq!(drain(&mut h.outcomes).await.len(), 1);
}

#[tokio::test]
async fn test_default_config_fires_initial_page_view() {
    let config = TrackerConfig::new("acme", "https://collect.example.com/events");
    let transport = Arc::new(MemoryTransport::new());
    let tracker = Tracker::builder(config)
        .host(Arc::new(StaticHost::new("https://example.com/landing?ref=ad")))
        .transport(transport.clone())
        .build()
        .unwrap();

    tracker.init();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let event = requests[0].event().unwrap();
    assert_eq!(event.event, "page_view");
    assert_eq!(event.path, "/landing");
    assert_eq!(tracker.active_sources(), vec![AutoTrack::PageView]);
}

#[tokio::test]
async fn test_empty_source_list_tracks_nothing() {
    let mut h = harness(&[]);
    h.tracker.init();

    h.tracker.dispatch_signal(&click("https://other.org/"));
    h.tracker.dispatch_signal(&Signal::PopState);

    assert!(drain(&mut h.outcomes).await.is_empty());
    assert!(h.tracker.active_sources().is_empty());
}

#[tokio::test]
async fn test_history_navigation_tracks_page_view() {
    let mut h = harness(&["_history"]);
    h.tracker.init();

    h.host.navigate("/docs/install");
    h.tracker.dispatch_signal(&Signal::PopState);

    assert_eq!(
        drain(&mut h.outcomes).await,
        vec![("page_view".to_string(), "/docs/install".to_string())]
    );
}

#[tokio::test]
async fn test_form_submit_source() {
    let mut h = harness(&["form_submit"]);
    h.tracker.init();

    let form = Form {
        action: "https://example.com/newsletter".to_string(),
        id: Some("signup".to_string()),
        name: None,
    };
    h.tracker.dispatch_signal(&Signal::submit(form));

    assert_eq!(
        drain(&mut h.outcomes).await,
        vec![(
            "form_submit".to_string(),
            "https://example.com/newsletter".to_string()
        )]
    );
}

#[tokio::test]
async fn test_clones_share_listeners() {
    let mut h = harness(&["external_link"]);
    let clone = h.tracker.clone();
    clone.init();
    h.tracker.init();

    assert_eq!(h.tracker.signals().listener_count(SignalKind::Click), 1);
    drop(clone);

    h.tracker.dispatch_signal(&click("https://other.org/"));
    assert_eq!(drain(&mut h.outcomes).await.len(), 1);
}
