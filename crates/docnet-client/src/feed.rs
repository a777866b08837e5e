//! The document change feed.
//!
//! Nodes publish document changes as Server-Sent Events on
//! `/api/v0/feed/aggregation/documents`. Each `message` event carries a
//! JSON aggregation document whose `commitId` pins the changed document
//! at its new tip.
//!
//! ## Framing
//!
//! ```text
//! : comment, ignored
//! event: message        (optional, defaults to "message")
//! id: 42                (optional, sticky)
//! data: {"commitId":…}  (joined with '\n' when repeated)
//! <blank line>          dispatch
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use docnet_core::CommitId;
use docnet_watch::{EventSource, SourceError};
use futures::stream::{BoxStream, Stream, StreamExt};
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Result};

/// Path of the aggregation documents feed.
pub const FEED_PATH: &str = "api/v0/feed/aggregation/documents";

const DEFAULT_EVENT: &str = "message";
const BOM: &[u8] = b"\xEF\xBB\xBF";

/// One dispatched Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental Server-Sent Events parser.
///
/// Accepts arbitrary byte chunks; lines may be split across chunks and may
/// end in CRLF, LF or CR.
#[derive(Debug, Default)]
pub struct SseParser {
    line: Vec<u8>,
    pending_cr: bool,
    started: bool,
    data: Vec<String>,
    event_type: Option<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every event it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.started {
            return self.push_bytes(chunk);
        }

        // Hold back until a split BOM can be ruled out.
        self.line.extend_from_slice(chunk);
        if self.line.len() < BOM.len() && BOM.starts_with(&self.line) {
            return Vec::new();
        }
        self.started = true;
        let buffered = std::mem::take(&mut self.line);
        let rest = buffered.strip_prefix(BOM).unwrap_or(&buffered);
        self.push_bytes(rest)
    }

    fn push_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\r' => {
                    self.pending_cr = true;
                    self.end_line(&mut events);
                }
                b'\n' => self.end_line(&mut events),
                _ => self.line.push(byte),
            }
        }
        events
    }

    /// The last `id` field seen.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// The reconnection delay requested by the server, if any.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Forget a partial line and event when the connection is replaced.
    /// The last event id and retry delay carry over.
    pub fn reset_connection(&mut self) {
        self.line.clear();
        self.pending_cr = false;
        self.started = false;
        self.data.clear();
        self.event_type = None;
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();

        if line.is_empty() {
            self.dispatch(events);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event_type = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, events: &mut Vec<SseEvent>) {
        let event_type = self.event_type.take();
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        events.push(SseEvent {
            event: event_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_event_id.clone(),
        });
    }
}

/// Delay before reconnecting when the server never sent `retry`.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Reconnection attempts before a dropped feed is reported as failed.
pub const DEFAULT_MAX_RECONNECTS: u32 = 3;

const LAST_EVENT_ID: &str = "Last-Event-ID";

type Body = BoxStream<'static, std::result::Result<Bytes, String>>;

/// Where an HTTP-backed feed reconnects to.
struct Connection {
    http: reqwest::Client,
    url: Url,
    max_reconnects: u32,
}

/// An [`EventSource`] over a Server-Sent Events response body.
///
/// Yields the data of `message` events. Other event types are skipped.
///
/// A feed opened with [`connect`](Self::connect) reconnects when the body
/// ends or fails, waiting the server's `retry` delay and resuming with
/// `Last-Event-ID`. The drop is reported as a [`SourceError`] once every
/// attempt has failed. A feed over a plain byte stream cannot reconnect,
/// so the end of its stream is reported straight away.
pub struct SseSource {
    connection: Option<Connection>,
    body: Option<Body>,
    parser: SseParser,
    queue: VecDeque<SseEvent>,
}

impl SseSource {
    /// Open a long-lived GET on `url`.
    pub async fn connect(http: &reqwest::Client, url: Url) -> Result<Self> {
        let body = open_stream(http, &url, None).await?;
        Ok(Self {
            connection: Some(Connection {
                http: http.clone(),
                url,
                max_reconnects: DEFAULT_MAX_RECONNECTS,
            }),
            body: Some(body),
            parser: SseParser::new(),
            queue: VecDeque::new(),
        })
    }

    /// Wrap any byte stream, e.g. a canned response in tests.
    pub fn from_byte_stream<S, E>(body: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: ToString,
    {
        Self {
            connection: None,
            body: Some(body.map(|chunk| chunk.map_err(|e| e.to_string())).boxed()),
            parser: SseParser::new(),
            queue: VecDeque::new(),
        }
    }

    /// Set how many times a dropped feed is reopened before failing.
    pub fn with_max_reconnects(mut self, attempts: u32) -> Self {
        if let Some(connection) = self.connection.as_mut() {
            connection.max_reconnects = attempts;
        }
        self
    }

    /// The feed URL, if connected over HTTP.
    pub fn url(&self) -> Option<&Url> {
        self.connection.as_ref().map(|c| &c.url)
    }

    /// The last event id received.
    pub fn last_event_id(&self) -> Option<&str> {
        self.parser.last_event_id()
    }

    /// Reopen the feed after `cause`, or explain why it cannot be.
    async fn reconnect(&mut self, cause: String) -> std::result::Result<(), SourceError> {
        let Some(connection) = self.connection.as_ref() else {
            return Err(SourceError::new(cause));
        };

        let delay = self.parser.retry().unwrap_or(DEFAULT_RECONNECT_DELAY);
        let mut last_error = cause.clone();
        for attempt in 1..=connection.max_reconnects {
            warn!(url = %connection.url, attempt, "event stream dropped ({}), reconnecting", last_error);
            tokio::time::sleep(delay).await;

            match open_stream(&connection.http, &connection.url, self.parser.last_event_id()).await {
                Ok(body) => {
                    self.parser.reset_connection();
                    self.body = Some(body);
                    return Ok(());
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(SourceError::new(format!(
            "{}; reconnect failed after {} attempts: {}",
            cause, connection.max_reconnects, last_error
        )))
    }
}

async fn open_stream(http: &reqwest::Client, url: &Url, last_event_id: Option<&str>) -> Result<Body> {
    debug!(url = %url, last_event_id = ?last_event_id, "opening event stream");
    let mut request = http.get(url.clone()).header(ACCEPT, "text/event-stream");
    if let Some(id) = last_event_id {
        request = request.header(LAST_EVENT_ID, id);
    }
    let response = request.send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response
        .bytes_stream()
        .map(|chunk| chunk.map_err(|e| e.to_string()))
        .boxed())
}

#[async_trait]
impl EventSource for SseSource {
    async fn next_message(&mut self) -> std::result::Result<Option<String>, SourceError> {
        loop {
            while let Some(event) = self.queue.pop_front() {
                if event.event == DEFAULT_EVENT {
                    return Ok(Some(event.data));
                }
                debug!(event = %event.event, "skipping non-message event");
            }

            // No body: closed, or already failed.
            let Some(body) = self.body.as_mut() else {
                return Ok(None);
            };
            let cause = match body.next().await {
                Some(Ok(chunk)) => {
                    let events = self.parser.push(&chunk);
                    self.queue.extend(events);
                    continue;
                }
                Some(Err(e)) => e,
                None => "event stream ended".to_string(),
            };

            self.body = None;
            self.reconnect(cause).await?;
        }
    }

    async fn close(&mut self) {
        self.connection = None;
        if self.body.take().is_some() {
            debug!("event stream closed");
        }
        self.queue.clear();
    }
}

/// Payload of one feed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationDocument {
    pub commit_id: CommitId,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<u8>,
}

/// Decode a feed payload.
pub fn decode_document(raw: &str) -> Result<AggregationDocument> {
    Ok(serde_json::from_str(raw)?)
}

/// Decode a feed payload to the tip it announces.
///
/// The result is the canonical CID string, the same form a document's
/// `tip` renders to.
pub fn decode_tip(raw: &str) -> Result<String> {
    Ok(decode_document(raw)?.commit_id.commit().to_string())
}
