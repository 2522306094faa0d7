//! crates/taskpilot_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{ClassificationReply, InboundMessage, Task, UserProfile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    /// A lookup that must yield exactly one row yielded several.
    #[error("Ambiguous result: {0}")]
    Ambiguous(String),
    /// A transient transport failure; the operation is safe to retry on the
    /// next scheduled attempt.
    #[error("Retryable transport error: {0}")]
    Retryable(String),
    /// A structured model response that does not match the expected shape.
    #[error("Response failed schema validation: {0}")]
    Schema(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Fetches new one-to-one chat messages from the messaging platform.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Returns messages authored by someone other than the assistant's own
    /// identity whose timestamp is strictly greater than `since`, ordered
    /// oldest first. A transport failure surfaces as [`PortError::Retryable`];
    /// the caller decides whether to advance its watermark.
    async fn poll(&self, since: DateTime<Utc>) -> PortResult<Vec<InboundMessage>>;
}

/// CRUD against the backend store for profile data and tasks.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    /// Returns exactly one profile for the authenticated identity, or
    /// [`PortError::NotFound`] / [`PortError::Ambiguous`] when zero or
    /// several rows exist. Either is a fatal misconfiguration.
    async fn get_profile(&self, user_id: Uuid) -> PortResult<UserProfile>;

    /// Returns the tasks already recorded for the given chat counterpart.
    async fn get_tasks_for_sender(&self, user_id: Uuid, related_id: &str) -> PortResult<Vec<Task>>;

    /// Appends a task. No transaction semantics; a partial failure is
    /// surfaced as an error and the caller moves on.
    async fn post_task(&self, user_id: Uuid, task: &Task) -> PortResult<()>;
}

/// Asks a language model whether a message implies an actionable work task.
#[async_trait]
pub trait ClassifierService: Send + Sync {
    /// One fresh model session per message. The reply is validated against
    /// the fixed structured schema; a mismatch is [`PortError::Schema`] and
    /// is fatal for that message only.
    async fn classify(
        &self,
        profile: &UserProfile,
        message: &InboundMessage,
        known_tasks: &[Task],
    ) -> PortResult<ClassificationReply>;
}

/// A binary gate on proposed tasks, primed once per pipeline lifetime.
#[async_trait]
pub trait ValidatorService: Send + Sync {
    /// True iff the model accepts the task as a well-defined, deliverable-
    /// bearing work item. Malformed or empty responses count as rejection.
    async fn validate(&self, task_name: &str, description: &str) -> PortResult<bool>;
}

/// Converts text to audio and plays it, returning after playback completes.
#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn speak(&self, text: &str) -> PortResult<()>;
}

/// Persistence for the poll watermark, a single externally readable timestamp.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// The last persisted watermark, or `None` on a first run.
    async fn load(&self) -> PortResult<Option<DateTime<Utc>>>;

    /// Overwrites the persisted watermark.
    async fn store(&self, at: DateTime<Utc>) -> PortResult<()>;
}
