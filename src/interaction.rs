//! Human-interaction and event-bubbling primitives.

use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A named, uniquely identified pause request carrying an event payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub interaction_id: String,
    pub event: InteractionEvent,
}

/// The `{type, data}` payload carried by an [`Interaction`] or posted via
/// [`crate::worker::WorkerContext::post_event`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl InteractionEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// The host's reply to an [`Interaction`], keyed by its `interaction_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    pub interaction_id: String,
    pub data: Value,
}

impl Interaction {
    pub fn fresh(event: InteractionEvent) -> Self {
        Self {
            interaction_id: Uuid::new_v4().to_string(),
            event,
        }
    }
}

/// A stored `(interaction, feedback)` pair in `ongoing_interactions`. The
/// feedback is `None` until the host resumes the run with a matching
/// [`Feedback`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionAndFeedback {
    pub interaction: Interaction,
    pub feedback: Option<Feedback>,
}

/// Raised at the root graph when a step collects one or more pending
/// interactions. Not an error in the ordinary sense — the
/// host is expected to store `snapshot` and resume later with feedback —
/// but it rides inside [`crate::errors::AutomaError`] so `run` keeps a
/// single `Result` return type.
#[derive(Debug, Clone)]
pub struct InteractionException {
    pub interactions: Vec<Interaction>,
    pub snapshot: Snapshot,
}

impl std::fmt::Display for InteractionException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "graph suspended with {} pending interaction(s)",
            self.interactions.len()
        )
    }
}

impl std::error::Error for InteractionException {}

/// Host-supplied replies passed back into `run` on resume: either a single
/// feedback or a batch.
#[derive(Debug, Clone, Default)]
pub struct FeedbackBatch {
    pub feedbacks: Vec<Feedback>,
}

impl FeedbackBatch {
    pub fn single(feedback: Feedback) -> Self {
        Self {
            feedbacks: vec![feedback],
        }
    }

    pub fn many(feedbacks: Vec<Feedback>) -> Self {
        Self { feedbacks }
    }

    pub fn is_empty(&self) -> bool {
        self.feedbacks.is_empty()
    }
}
