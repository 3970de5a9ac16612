use axum::response::sse::Event;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trait for getting the SSE event type name
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

/// One unit of output on a relay stream, before it is framed as SSE.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayFrame {
    /// Comment line telling the client the stream is live.
    Ping,
    /// A message received on the status channel, forwarded as is.
    Status(String),
    /// Terminal error signal. Always the last frame of its stream.
    Error(String),
}

impl EventType for RelayFrame {
    fn event_type(&self) -> &'static str {
        match self {
            RelayFrame::Ping => "ping",
            RelayFrame::Status(_) => "status",
            RelayFrame::Error(_) => "error",
        }
    }
}

impl RelayFrame {
    /// Frames this as an axum SSE event.
    ///
    /// Status bodies are not inspected, but forwarding is not byte-exact for line
    /// breaks: SSE treats `\r`, `\n` and `\r\n` alike, so `\r\n` and `\r` reach the
    /// client as `\n`. A multi-line body becomes several `data:` lines that the client
    /// joins back together. Non-UTF-8 bytes were already replaced lossily by the pub/sub backend.
    pub fn into_event(self) -> Event {
        let event_type = self.event_type();
        match self {
            RelayFrame::Ping => Event::default().comment("ping"),
            RelayFrame::Status(body) => Event::default()
                .event(event_type)
                .data(normalize_line_breaks(&body)),
            RelayFrame::Error(message) => Event::default()
                .event(event_type)
                .data(serde_json::json!({ "error": message }).to_string()),
        }
    }
}

fn normalize_line_breaks(body: &str) -> String {
    if body.contains('\r') {
        body.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        body.to_string()
    }
}

/// Lifecycle state of a test run, keyed by the `status` field on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusKind {
    Initializing,
    Queued,
    Running,
    Completed { results: Option<Value> },
    Error { message: Option<String> },
    Aborted,
    NotFound,
    /// Any status string the publisher sends that is not one of the above.
    Other(String),
}

impl StatusKind {
    pub fn as_str(&self) -> &str {
        match self {
            StatusKind::Initializing => "initializing",
            StatusKind::Queued => "queued",
            StatusKind::Running => "running",
            StatusKind::Completed { .. } => "completed",
            StatusKind::Error { .. } => "error",
            StatusKind::Aborted => "aborted",
            StatusKind::NotFound => "not_found",
            StatusKind::Other(status) => status,
        }
    }

    /// True when the test will publish nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusKind::Completed { .. }
                | StatusKind::Error { .. }
                | StatusKind::Aborted
                | StatusKind::NotFound
        )
    }
}

/// A status update published on a test's status channel.
///
/// On the wire this is a flat JSON object (`status`, `progress`, `error`, `results`,
/// `runtime_seconds`). `error` and `results` only exist on the variants they belong
/// to. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "WireStatusEvent", into = "WireStatusEvent")]
pub struct StatusEvent {
    pub kind: StatusKind,
    pub progress: Option<String>,
    pub runtime_seconds: Option<f64>,
}

impl StatusEvent {
    pub fn new(kind: StatusKind) -> Self {
        Self {
            kind,
            progress: None,
            runtime_seconds: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }

    pub fn with_runtime_seconds(mut self, runtime_seconds: f64) -> Self {
        self.runtime_seconds = Some(runtime_seconds);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }
}

#[derive(Serialize, Deserialize)]
struct WireStatusEvent {
    status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    results: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runtime_seconds: Option<f64>,
}

impl From<WireStatusEvent> for StatusEvent {
    fn from(wire: WireStatusEvent) -> Self {
        let kind = match wire.status.as_str() {
            "initializing" => StatusKind::Initializing,
            "queued" => StatusKind::Queued,
            "running" => StatusKind::Running,
            "completed" => StatusKind::Completed {
                results: wire.results,
            },
            "error" => StatusKind::Error {
                message: wire.error,
            },
            "aborted" => StatusKind::Aborted,
            "not_found" => StatusKind::NotFound,
            _ => StatusKind::Other(wire.status),
        };

        StatusEvent {
            kind,
            progress: wire.progress,
            runtime_seconds: wire.runtime_seconds,
        }
    }
}

impl From<StatusEvent> for WireStatusEvent {
    fn from(event: StatusEvent) -> Self {
        let status = event.kind.as_str().to_string();
        let (error, results) = match event.kind {
            StatusKind::Completed { results } => (None, results),
            StatusKind::Error { message } => (message, None),
            _ => (None, None),
        };

        WireStatusEvent {
            status,
            progress: event.progress,
            error,
            results,
            runtime_seconds: event.runtime_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_publisher_payload_with_extra_fields() {
        let payload = json!({
            "test_id": "t1",
            "project_id": "p1",
            "user_id": "u1",
            "status": "completed",
            "progress": "done",
            "error": null,
            "results": {"score": 0.9},
            "started_at": 1700000000.0,
            "completed_at": 1700000042.5,
            "runtime_seconds": 42.5
        });

        let event: StatusEvent = serde_json::from_value(payload).unwrap();

        assert_eq!(
            event.kind,
            StatusKind::Completed {
                results: Some(json!({"score": 0.9}))
            }
        );
        assert_eq!(event.progress.as_deref(), Some("done"));
        assert_eq!(event.runtime_seconds, Some(42.5));
        assert!(event.is_terminal());
    }

    #[test]
    fn error_message_only_lives_on_error_variant() {
        let event: StatusEvent =
            serde_json::from_str(r#"{"status":"running","error":"stale","progress":"50%"}"#)
                .unwrap();
        assert_eq!(event.kind, StatusKind::Running);

        let event: StatusEvent =
            serde_json::from_str(r#"{"status":"error","error":"model timed out"}"#).unwrap();
        assert_eq!(
            event.kind,
            StatusKind::Error {
                message: Some("model timed out".to_string())
            }
        );
    }

    #[test]
    fn unknown_status_falls_back_to_other() {
        let event: StatusEvent = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(event.kind, StatusKind::Other("pending".to_string()));
        assert!(!event.is_terminal());
    }

    #[test]
    fn serializes_flat_and_omits_absent_fields() {
        let event = StatusEvent::new(StatusKind::Running).with_progress("50%");
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"status": "running", "progress": "50%"})
        );

        let event = StatusEvent::new(StatusKind::Error {
            message: Some("boom".to_string()),
        })
        .with_runtime_seconds(3.0);
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"status": "error", "error": "boom", "runtime_seconds": 3.0})
        );
    }

    #[test]
    fn terminal_statuses() {
        assert!(StatusKind::Aborted.is_terminal());
        assert!(StatusKind::NotFound.is_terminal());
        assert!(!StatusKind::Queued.is_terminal());
        assert!(!StatusKind::Initializing.is_terminal());
    }

    #[test]
    fn frame_event_types() {
        assert_eq!(RelayFrame::Ping.event_type(), "ping");
        assert_eq!(RelayFrame::Status(String::new()).event_type(), "status");
        assert_eq!(RelayFrame::Error(String::new()).event_type(), "error");
    }

    #[test]
    fn carriage_returns_become_line_feeds() {
        assert_eq!(normalize_line_breaks("a\r\nb\rc\nd"), "a\nb\nc\nd");
        assert_eq!(normalize_line_breaks("{not json"), "{not json");
    }
}
