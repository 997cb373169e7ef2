// Container lifecycle event stream
//
// The backend relays Docker container events as `text/event-stream`. Chunks from the
// HTTP body arrive at arbitrary boundaries, so decoding is incremental: bytes are
// buffered until a full line is available and events are dispatched on a blank line.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Actions that change whether a container is running and warrant a status re-fetch.
pub const LIFECYCLE_ACTIONS: [&str; 4] = ["start", "stop", "die", "restart"];

pub fn is_lifecycle_action(action: &str) -> bool {
    LIFECYCLE_ACTIONS.contains(&action)
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Defaults to `message` when the stream names no event type.
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Longest partial line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    /// Set after an oversized line was dropped; bytes are discarded up to its newline.
    skipping: bool,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one body chunk and return every event completed by it. Buffered bytes hold
    /// no newline, so only the new chunk is scanned.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut out = Vec::new();
        let mut chunk = chunk;
        if self.skipping {
            match chunk.iter().position(|b| *b == b'\n') {
                Some(pos) => {
                    self.skipping = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return out,
            }
        }

        let mut search = self.buf.len();
        self.buf.extend_from_slice(chunk);
        let mut start = 0;
        while let Some(offset) = self.buf[search..].iter().position(|b| *b == b'\n') {
            let end = search + offset;
            let mut line = &self.buf[start..end];
            if line.last() == Some(&b'\r') {
                line = &line[..line.len() - 1];
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.process_line(&line) {
                out.push(event);
            }
            start = end + 1;
            search = start;
        }
        self.buf.drain(..start);

        if self.buf.len() > MAX_LINE_BYTES {
            warn!(
                "[PHASE: events] [STEP: decode] Dropping oversized event line ({} bytes buffered)",
                self.buf.len()
            );
            self.buf.clear();
            self.skipping = true;
            self.event = None;
            self.data.clear();
            self.id = None;
        }
        out
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment / keep-alive.
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        let id = self.id.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseEvent {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
            id,
        })
    }
}

/// Payload of an `event: container` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerEvent {
    pub action: String,
    #[serde(default)]
    pub container_name: String,
    #[serde(default)]
    pub container_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
}

impl ContainerEvent {
    pub fn is_lifecycle(&self) -> bool {
        is_lifecycle_action(&self.action)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Connected(String),
    Container(ContainerEvent),
    /// Backend-side stream error (e.g. Docker not available).
    Error(String),
}

fn field_or_raw(data: &str, field: &str) -> String {
    serde_json::from_str::<Value>(data)
        .ok()
        .and_then(|v| v.get(field).and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| data.to_string())
}

/// Interpret a raw event. Unknown event types and undecodable container payloads are
/// logged and dropped.
pub fn classify(event: &SseEvent) -> Option<StreamEvent> {
    match event.event.as_str() {
        "connected" => Some(StreamEvent::Connected(field_or_raw(&event.data, "message"))),
        "error" => Some(StreamEvent::Error(field_or_raw(&event.data, "error"))),
        "container" => match serde_json::from_str::<ContainerEvent>(&event.data) {
            Ok(parsed) => Some(StreamEvent::Container(parsed)),
            Err(e) => {
                warn!(
                    "[PHASE: events] [STEP: decode] Dropping malformed container event: {}",
                    e
                );
                None
            }
        },
        other => {
            debug!("[PHASE: events] [STEP: decode] Ignoring event type '{}'", other);
            None
        }
    }
}
