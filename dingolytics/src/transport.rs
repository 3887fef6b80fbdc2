//! Transport backends for event delivery

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{TrackerError, TrackerResult};
use crate::event::Event;

pub const CONTENT_TYPE: &str = "content-type";
pub const APPLICATION_JSON: &str = "application/json";

/// Transport backend interface
#[async_trait]
pub trait Transport: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Send one request body to `url`
    async fn send(&self, url: &str, body: String, headers: &[(&str, &str)]) -> TrackerResult<()>;
}

/// HTTP transport backed by reqwest
///
/// Any response with a non-2xx status counts as a failure.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn send(&self, url: &str, body: String, headers: &[(&str, &str)]) -> TrackerResult<()> {
        let mut request = self.client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TrackerError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::HttpStatus {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// A request captured by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl SentRequest {
    /// Decode the body back into an event
    pub fn event(&self) -> TrackerResult<Event> {
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// In-process transport that records every request
#[derive(Debug, Default)]
pub struct MemoryTransport {
    requests: Mutex<Vec<SentRequest>>,
    failure: Mutex<Option<String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with `reason` (`None` to recover)
    pub fn fail_with(&self, reason: Option<&str>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = reason.map(str::to_string);
        }
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, url: &str, body: String, headers: &[(&str, &str)]) -> TrackerResult<()> {
        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(reason) = failure {
            return Err(TrackerError::Transport(reason));
        }

        let mut requests = self
            .requests
            .lock()
            .map_err(|_| TrackerError::Transport("memory transport lock poisoned".into()))?;
        requests.push(SentRequest {
            url: url.to_string(),
            body,
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        });
        Ok(())
    }
}
