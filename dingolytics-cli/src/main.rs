//! Dingolytics CLI - send one tracking event from the command line
//!
//! Usage:
//!     dingolytics --app acme --dsn https://collect.example.com/events event signup --attrs '{"plan":"pro"}'
//!     dingolytics --config tracker.json --storage ~/.dingolytics.json page-view /pricing
//!     dingolytics --app acme --dsn https://collect.example.com/events client-id
//!
//! Set `RUST_LOG` to override the log filter.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dingolytics::{
    ClientStorage, DeliveryOutcome, Event, FileStorage, HttpTransport, SessionStorage, StaticHost,
    Tracker, TrackerConfig,
};
use serde_json::{json, Value};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dingolytics")]
#[command(about = "Send Dingolytics tracking events")]
#[command(version)]
struct Args {
    /// Path to a JSON tracker configuration
    #[arg(short, long, conflicts_with_all = ["app", "dsn"])]
    config: Option<PathBuf>,

    /// Application key stamped on events
    #[arg(long, requires = "dsn")]
    app: Option<String>,

    /// Collector URL events are posted to
    #[arg(long, requires = "app")]
    dsn: Option<String>,

    /// JSON file the client identifier is persisted in (in-memory if omitted)
    #[arg(short, long)]
    storage: Option<PathBuf>,

    /// Authenticated user id attached to the event
    #[arg(short, long)]
    user: Option<String>,

    /// Page location the event is reported from
    #[arg(long, default_value = "http://localhost/")]
    location: String,

    /// User agent reported for this client
    #[arg(long)]
    user_agent: Option<String>,

    /// Verbose output (tracker diagnostics)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a custom event
    Event {
        name: String,

        /// JSON object sent as the event attributes
        #[arg(long)]
        attrs: Option<String>,
    },

    /// Send a page view (defaults to the current location)
    PageView { path: Option<String> },

    /// Send a document download
    Download { url: String },

    /// Send an external link click
    Link { url: String },

    /// Print the client identifier without sending anything
    ClientId,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "dingolytics=debug"
    } else {
        "dingolytics=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(args).await {
        Ok(Some(event)) => match serde_json::to_string_pretty(&event) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error rendering event: {}", e);
                std::process::exit(1);
            }
        },
        Ok(None) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<Option<Event>, String> {
    let config = load_config(&args)?;

    let storage: Arc<dyn ClientStorage> = match &args.storage {
        Some(path) => Arc::new(FileStorage::new(path)),
        None => Arc::new(SessionStorage::new()),
    };

    let user_agent = args
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("dingolytics-cli/{}", env!("CARGO_PKG_VERSION")));
    let host = StaticHost::new(&args.location).with_user_agent(user_agent);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let tracker = Tracker::builder(config)
        .host(Arc::new(host))
        .storage(storage)
        .transport(Arc::new(HttpTransport::new()))
        .callback(move |outcome| {
            let _ = tx.send(outcome);
        })
        .build()
        .map_err(|e| format!("Failed to create tracker [{}]: {}", e.code(), e))?;

    if args.user.is_some() {
        tracker.set_user(args.user.as_deref());
    }

    match args.command {
        Command::ClientId => {
            println!("{}", tracker.client_id());
            return Ok(None);
        }
        Command::Event { name, attrs } => {
            tracker.track_event(&name, event_properties(attrs.as_deref())?);
        }
        Command::PageView { path } => tracker.track_page_view(path.as_deref()),
        Command::Download { url } => tracker.track_document_download(&url),
        Command::Link { url } => tracker.track_external_link(&url),
    }

    match rx.recv().await {
        Some(DeliveryOutcome::Delivered { event }) => Ok(Some(event)),
        Some(DeliveryOutcome::Failed { error }) => {
            Err(format!("Delivery failed [{}]: {}", error.code(), error))
        }
        None => Err("Tracker stopped before reporting an outcome".to_string()),
    }
}

fn load_config(args: &Args) -> Result<TrackerConfig, String> {
    let config = match (&args.config, &args.app, &args.dsn) {
        (Some(path), _, _) => {
            tracing::debug!(target: "dingolytics", path = %path.display(), "loading config");
            TrackerConfig::from_file(path)
                .map_err(|e| format!("Failed to load config {}: {}", path.display(), e))?
        }
        (None, Some(app), Some(dsn)) => TrackerConfig::new(app.as_str(), dsn.as_str()),
        _ => return Err("Specify --config FILE or both --app and --dsn".to_string()),
    };

    // one event per invocation; auto-instrumentation has nothing to observe here
    let debug = config.debug || args.verbose;
    Ok(config
        .with_debug(debug)
        .with_auto_track_events(Vec::<String>::new()))
}

fn event_properties(attrs: Option<&str>) -> Result<Value, String> {
    let Some(raw) = attrs else {
        return Ok(json!({}));
    };
    let attrs: Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid --attrs JSON: {}", e))?;
    if !attrs.is_object() {
        return Err("--attrs must be a JSON object".to_string());
    }
    Ok(json!({ "attrs": attrs }))
}
