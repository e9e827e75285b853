use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::WorkerKey;

/// The envelope carried over the [`super::EventHub`] broadcast channel: a
/// host-observability mirror of whatever a running `GraphAutoma` does
/// through `ctx.post_event`/`interact_with_human`, plus scheduler-level
/// diagnostics that aren't tied to a particular worker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Event {
    /// Mirrors a `ctx.post_event`/`ctx.request_feedback*` call.
    Posted(PostedEvent),
    /// A scheduler-level observation not tied to any one worker (step
    /// boundaries, topology mutations, suspensions).
    Diagnostic(DiagnosticEvent),
}

impl Event {
    pub fn posted(worker_key: impl Into<WorkerKey>, event_type: impl Into<String>, data: Value) -> Self {
        Event::Posted(PostedEvent {
            worker_key: worker_key.into(),
            event_type: event_type.into(),
            data,
            timestamp: Utc::now(),
        })
    }

    pub fn diagnostic(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Event::Diagnostic(DiagnosticEvent {
            scope: scope.into(),
            message: message.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn scope_label(&self) -> &str {
        match self {
            Event::Posted(posted) => posted.event_type.as_str(),
            Event::Diagnostic(diag) => diag.scope.as_str(),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Event::Posted(posted) => format!("[{}] {}", posted.worker_key, posted.event_type),
            Event::Diagnostic(diag) => diag.message.clone(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::Posted(posted) => posted.timestamp,
            Event::Diagnostic(diag) => diag.timestamp,
        }
    }

    /// Convert event to structured JSON value with a normalized schema,
    /// the shape every [`super::EventSink`] ultimately writes out.
    pub fn to_json_value(&self) -> Value {
        use serde_json::json;
        let (event_type, metadata) = match self {
            Event::Posted(posted) => {
                let mut meta = serde_json::Map::new();
                meta.insert("worker_key".into(), json!(posted.worker_key));
                meta.insert("event_type".into(), json!(posted.event_type));
                meta.insert("data".into(), posted.data.clone());
                ("posted", Value::Object(meta))
            }
            Event::Diagnostic(_) => ("diagnostic", Value::Object(serde_json::Map::new())),
        };
        json!({
            "type": event_type,
            "scope": self.scope_label(),
            "message": self.message(),
            "timestamp": self.timestamp().to_rfc3339(),
            "metadata": metadata,
        })
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Posted(posted) => {
                write!(f, "[{}@{}] {}", posted.worker_key, posted.event_type, posted.data)
            }
            Event::Diagnostic(diag) => write!(f, "{}", diag.message),
        }
    }
}

/// A mirrored observation of `ctx.post_event`/`ctx.request_feedback*`,
/// published for host-side streaming consumers independently of the
/// synchronous `EventHandler` dispatch a running graph also does.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostedEvent {
    pub worker_key: WorkerKey,
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DiagnosticEvent {
    pub scope: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl DiagnosticEvent {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
