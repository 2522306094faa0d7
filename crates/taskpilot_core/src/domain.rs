//! crates/taskpilot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport format.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// The assistant owner's profile, loaded once at startup and read-only for
/// the lifetime of the pipeline.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub display_name: String,
    pub email: String,
    /// Free-text operating instructions ("keep replies short", etc.).
    pub instructions: String,
    /// Free-text description of what the owner's job involves.
    pub work_scope: String,
}

/// A single chat notification fetched from the message source.
/// Ephemeral; built fresh each poll cycle and never persisted.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub sender_name: String,
    pub sender_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A task as proposed by the classifier. Carries no sender linkage;
/// that is attached when the draft is promoted to a [`Task`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskDraft {
    pub task_name: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub priority: i32,
}

/// A unit of work accepted for persistence. Immutable once created; this
/// pipeline has no update or delete path.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub task_name: String,
    pub description: String,
    pub due_date: NaiveDate,
    pub priority: i32,
    /// Identifier of the chat counterpart the task originated from.
    pub related_id: String,
}

impl Task {
    /// Promotes a classifier draft to a persistable task by attaching the
    /// sender identifier of the triggering message.
    pub fn from_draft(draft: TaskDraft, related_id: String) -> Self {
        Self {
            task_name: draft.task_name,
            description: draft.description,
            due_date: draft.due_date,
            priority: draft.priority,
            related_id,
        }
    }
}

/// The classifier's structured output.
///
/// When `task_created` is false the embedded draft is not meaningful and must
/// never be persisted. When it is true but the draft is missing, the reply is
/// malformed and the message is skipped.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationReply {
    pub task_created: bool,
    /// Natural-language summary spoken to the user regardless of outcome.
    pub message: String,
    #[serde(default)]
    pub task: Option<TaskDraft>,
}

/// Timestamp of the last fully processed poll cycle.
///
/// Monotonically non-decreasing; advanced only after a cycle completes, so a
/// crash mid-cycle re-delivers that cycle's messages instead of losing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Returns a watermark advanced to `at`, clamped so the value never
    /// moves backwards.
    pub fn advance_to(self, at: DateTime<Utc>) -> Self {
        Self(self.0.max(at))
    }
}
