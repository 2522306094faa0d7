//! crates/taskpilot_core/src/pipeline.rs
//!
//! The notification pipeline: polls the message source, classifies each new
//! message, gates proposed tasks through the validator, persists accepted
//! tasks, and narrates every summary. All expected failure modes degrade to
//! "skip and continue"; only process termination stops the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::domain::{InboundMessage, Task, UserProfile, Watermark};
use crate::ports::{
    ClassifierService, DatabaseService, MessageSource, PortError, PortResult, SpeechService,
    ValidatorService, WatermarkStore,
};

/// Messages shorter than this are skipped before any remote call. A
/// precision/recall trade-off: anything shorter rarely carries task intent.
pub const MIN_MESSAGE_CHARS: usize = 20;

/// How far back the first poll reaches when no watermark has been persisted.
const FIRST_RUN_LOOKBACK_WEEKS: i64 = 2;

/// Pacing for the poll loop: a long sleep between cycles and a short one
/// between messages within a cycle, so the inference and speech services are
/// not burst-called.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTiming {
    pub poll_interval: Duration,
    pub message_delay: Duration,
}

/// Terminal state of a single processed message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Body below the minimum length; no remote call was made.
    SkippedShort,
    /// Classifier proposed no task; only the summary was spoken.
    SummaryOnly,
    /// Draft matched a task already known for this sender.
    DuplicateDiscarded,
    /// Validator rejected the draft; nothing persisted.
    Rejected,
    /// Task accepted and persisted.
    Persisted,
    /// A remote call failed; the message was skipped.
    Failed,
}

/// The concrete services behind each port, created once at startup and
/// handed to the pipeline.
#[derive(Clone)]
pub struct PipelineServices {
    pub source: Arc<dyn MessageSource>,
    pub db: Arc<dyn DatabaseService>,
    pub classifier: Arc<dyn ClassifierService>,
    pub validator: Arc<dyn ValidatorService>,
    pub speech: Arc<dyn SpeechService>,
    pub watermarks: Arc<dyn WatermarkStore>,
}

/// Orchestrates the ports. Owns the profile for the session's lifetime and
/// the in-memory watermark for the duration of each cycle.
pub struct NotificationPipeline {
    profile: UserProfile,
    services: PipelineServices,
    timing: PipelineTiming,
}

impl NotificationPipeline {
    pub fn new(profile: UserProfile, services: PipelineServices, timing: PipelineTiming) -> Self {
        Self {
            profile,
            services,
            timing,
        }
    }

    /// Runs poll cycles until the process is terminated.
    pub async fn run(&self) -> PortResult<()> {
        let mut watermark = match self.services.watermarks.load().await? {
            Some(at) => Watermark::new(at),
            None => {
                let start = Utc::now() - chrono::Duration::weeks(FIRST_RUN_LOOKBACK_WEEKS);
                info!("No stored watermark; starting from {}", start);
                Watermark::new(start)
            }
        };

        loop {
            watermark = self.run_cycle(watermark).await;
            tokio::time::sleep(self.timing.poll_interval).await;
        }
    }

    /// Executes one poll cycle and returns the watermark to use for the next.
    ///
    /// The watermark advances to the cycle's start time only after every
    /// message in the cycle has been handled; a failed poll leaves it
    /// untouched so the next cycle retries the same window.
    pub async fn run_cycle(&self, watermark: Watermark) -> Watermark {
        let cycle_start = Utc::now();

        let messages = match self.services.source.poll(watermark.as_datetime()).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Poll failed, will retry on the next interval: {e}");
                return watermark;
            }
        };

        if messages.is_empty() {
            debug!("No new messages since last check.");
        } else {
            info!("{} new message(s) since last check.", messages.len());
        }

        for message in &messages {
            let outcome = self.process_message(message).await;
            debug!(
                "Message from {} at {} finished as {:?}",
                message.sender_name, message.created_at, outcome
            );
            tokio::time::sleep(self.timing.message_delay).await;
        }

        let advanced = watermark.advance_to(cycle_start);
        if let Err(e) = self.services.watermarks.store(advanced.as_datetime()).await {
            warn!("Failed to persist watermark, messages may be re-delivered: {e}");
        }
        advanced
    }

    /// Runs a single message through the skip/classify/validate/persist chain.
    /// Never propagates an error; every failure is logged and mapped to an
    /// outcome so the cycle continues with the next message.
    pub async fn process_message(&self, message: &InboundMessage) -> MessageOutcome {
        if message.text.chars().count() < MIN_MESSAGE_CHARS {
            debug!("Message from {} too short to process.", message.sender_name);
            return MessageOutcome::SkippedShort;
        }

        let known_tasks = match self
            .services
            .db
            .get_tasks_for_sender(self.profile.user_id, &message.sender_id)
            .await
        {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("Could not fetch tasks for {}: {e}", message.sender_id);
                return MessageOutcome::Failed;
            }
        };

        let reply = match self
            .services
            .classifier
            .classify(&self.profile, message, &known_tasks)
            .await
        {
            Ok(reply) => reply,
            Err(PortError::Schema(e)) => {
                error!("Classifier reply failed validation, skipping message: {e}");
                return MessageOutcome::Failed;
            }
            Err(e) => {
                warn!("Classification failed, skipping message: {e}");
                return MessageOutcome::Failed;
            }
        };

        // The summary is narrated whether or not a task came out of it.
        if let Err(e) = self.services.speech.speak(&reply.message).await {
            warn!("Speech playback failed: {e}");
        }

        if !reply.task_created {
            info!("No task proposed for the message from {}.", message.sender_name);
            return MessageOutcome::SummaryOnly;
        }

        let Some(draft) = reply.task else {
            error!("Classifier reported a task but sent no task payload; skipping.");
            return MessageOutcome::Failed;
        };

        if is_known_task(&known_tasks, &draft.task_name) {
            info!(
                "Draft '{}' matches a task already recorded for {}; discarding.",
                draft.task_name, message.sender_id
            );
            return MessageOutcome::DuplicateDiscarded;
        }

        // Validator errors count as rejection: better to under-create tasks
        // than to record spurious ones.
        let accepted = match self
            .services
            .validator
            .validate(&draft.task_name, &draft.description)
            .await
        {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Validation call failed, treating as rejection: {e}");
                false
            }
        };

        if !accepted {
            info!("Task '{}' was rejected by the validation model.", draft.task_name);
            return MessageOutcome::Rejected;
        }

        let task = Task::from_draft(draft, message.sender_id.clone());
        match self.services.db.post_task(self.profile.user_id, &task).await {
            Ok(()) => {
                info!("Task created: '{}'", task.task_name);
                MessageOutcome::Persisted
            }
            Err(e) => {
                warn!("Failed to persist task '{}': {e}", task.task_name);
                MessageOutcome::Failed
            }
        }
    }
}

fn is_known_task(known: &[Task], name: &str) -> bool {
    known
        .iter()
        .any(|task| task.task_name.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClassificationReply, TaskDraft};
    use async_trait::async_trait;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn profile() -> UserProfile {
        UserProfile {
            user_id: Uuid::new_v4(),
            display_name: "Alexis".to_string(),
            email: "alexis@example.com".to_string(),
            instructions: "Keep it brief.".to_string(),
            work_scope: "Client reporting and analytics.".to_string(),
        }
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage {
            sender_name: "John".to_string(),
            sender_id: "12345".to_string(),
            text: text.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap(),
        }
    }

    fn draft(name: &str) -> TaskDraft {
        TaskDraft {
            task_name: name.to_string(),
            description: "Do the thing that was asked.".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 5, 19).unwrap(),
            priority: 2,
        }
    }

    fn task_reply(name: &str) -> ClassificationReply {
        ClassificationReply {
            task_created: true,
            message: format!("John asked you to {name}."),
            task: Some(draft(name)),
        }
    }

    fn summary_reply() -> ClassificationReply {
        ClassificationReply {
            task_created: false,
            message: "John sent a status update, nothing to do.".to_string(),
            task: None,
        }
    }

    //-------------------------------------------------------------------------------------
    // Mock ports
    //-------------------------------------------------------------------------------------

    struct StaticSource(Vec<InboundMessage>);

    #[async_trait]
    impl MessageSource for StaticSource {
        async fn poll(&self, _since: DateTime<Utc>) -> PortResult<Vec<InboundMessage>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl MessageSource for FailingSource {
        async fn poll(&self, _since: DateTime<Utc>) -> PortResult<Vec<InboundMessage>> {
            Err(PortError::Retryable("503 Service Unavailable".to_string()))
        }
    }

    #[derive(Default)]
    struct MockDb {
        known: Vec<Task>,
        posted: Mutex<Vec<Task>>,
        fail_post: bool,
    }

    #[async_trait]
    impl DatabaseService for MockDb {
        async fn get_profile(&self, _user_id: Uuid) -> PortResult<UserProfile> {
            unimplemented!("not used by the pipeline")
        }

        async fn get_tasks_for_sender(
            &self,
            _user_id: Uuid,
            _related_id: &str,
        ) -> PortResult<Vec<Task>> {
            Ok(self.known.clone())
        }

        async fn post_task(&self, _user_id: Uuid, task: &Task) -> PortResult<()> {
            if self.fail_post {
                return Err(PortError::Unexpected("insert failed".to_string()));
            }
            self.posted.lock().unwrap().push(task.clone());
            Ok(())
        }
    }

    struct MockClassifier {
        replies: Mutex<VecDeque<PortResult<ClassificationReply>>>,
        calls: Mutex<usize>,
    }

    impl MockClassifier {
        fn new(replies: Vec<PortResult<ClassificationReply>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ClassifierService for MockClassifier {
        async fn classify(
            &self,
            _profile: &UserProfile,
            _message: &InboundMessage,
            _known_tasks: &[Task],
        ) -> PortResult<ClassificationReply> {
            *self.calls.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .expect("classifier called more times than replies were queued")
        }
    }

    struct MockValidator {
        accept: bool,
        fail: bool,
        calls: Mutex<usize>,
    }

    impl MockValidator {
        fn accepting() -> Self {
            Self { accept: true, fail: false, calls: Mutex::new(0) }
        }

        fn rejecting() -> Self {
            Self { accept: false, fail: false, calls: Mutex::new(0) }
        }

        fn failing() -> Self {
            Self { accept: false, fail: true, calls: Mutex::new(0) }
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ValidatorService for MockValidator {
        async fn validate(&self, _task_name: &str, _description: &str) -> PortResult<bool> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                return Err(PortError::Retryable("timeout".to_string()));
            }
            Ok(self.accept)
        }
    }

    #[derive(Default)]
    struct MockSpeech {
        spoken: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechService for MockSpeech {
        async fn speak(&self, text: &str) -> PortResult<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockWatermarks {
        stored: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait]
    impl WatermarkStore for MockWatermarks {
        async fn load(&self) -> PortResult<Option<DateTime<Utc>>> {
            Ok(self.stored.lock().unwrap().last().copied())
        }

        async fn store(&self, at: DateTime<Utc>) -> PortResult<()> {
            self.stored.lock().unwrap().push(at);
            Ok(())
        }
    }

    //-------------------------------------------------------------------------------------
    // Harness
    //-------------------------------------------------------------------------------------

    struct Harness {
        pipeline: NotificationPipeline,
        db: Arc<MockDb>,
        classifier: Arc<MockClassifier>,
        validator: Arc<MockValidator>,
        speech: Arc<MockSpeech>,
        watermarks: Arc<MockWatermarks>,
    }

    fn harness(
        messages: Vec<InboundMessage>,
        db: MockDb,
        classifier: MockClassifier,
        validator: MockValidator,
    ) -> Harness {
        harness_with_source(Arc::new(StaticSource(messages)), db, classifier, validator)
    }

    fn harness_with_source(
        source: Arc<dyn MessageSource>,
        db: MockDb,
        classifier: MockClassifier,
        validator: MockValidator,
    ) -> Harness {
        let db = Arc::new(db);
        let classifier = Arc::new(classifier);
        let validator = Arc::new(validator);
        let speech = Arc::new(MockSpeech::default());
        let watermarks = Arc::new(MockWatermarks::default());

        let pipeline = NotificationPipeline::new(
            profile(),
            PipelineServices {
                source,
                db: db.clone(),
                classifier: classifier.clone(),
                validator: validator.clone(),
                speech: speech.clone(),
                watermarks: watermarks.clone(),
            },
            PipelineTiming {
                poll_interval: Duration::from_secs(0),
                message_delay: Duration::from_secs(0),
            },
        );

        Harness { pipeline, db, classifier, validator, speech, watermarks }
    }

    const LONG_TEXT: &str = "Please send the Q3 report by tomorrow"; // 37 chars

    //-------------------------------------------------------------------------------------
    // Per-message properties
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn short_message_never_reaches_the_classifier() {
        let h = harness(
            vec![],
            MockDb::default(),
            MockClassifier::new(vec![]),
            MockValidator::accepting(),
        );

        let outcome = h.pipeline.process_message(&message("Hey you!")).await;

        assert_eq!(outcome, MessageOutcome::SkippedShort);
        assert_eq!(h.classifier.call_count(), 0);
        assert!(h.speech.spoken.lock().unwrap().is_empty());
        assert!(h.db.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_task_reply_speaks_summary_and_persists_nothing() {
        let h = harness(
            vec![],
            MockDb::default(),
            MockClassifier::new(vec![Ok(summary_reply())]),
            MockValidator::accepting(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;

        assert_eq!(outcome, MessageOutcome::SummaryOnly);
        assert_eq!(h.speech.spoken.lock().unwrap().len(), 1);
        assert_eq!(h.validator.call_count(), 0);
        assert!(h.db.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn accepted_task_is_persisted_once_with_the_sender_id() {
        let h = harness(
            vec![],
            MockDb::default(),
            MockClassifier::new(vec![Ok(task_reply("Send the Q3 report"))]),
            MockValidator::accepting(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;

        assert_eq!(outcome, MessageOutcome::Persisted);
        let posted = h.db.posted.lock().unwrap();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].related_id, "12345");
        assert_eq!(posted[0].task_name, "Send the Q3 report");
    }

    #[tokio::test]
    async fn rejected_task_is_discarded() {
        let h = harness(
            vec![],
            MockDb::default(),
            MockClassifier::new(vec![Ok(task_reply("Buy snacks"))]),
            MockValidator::rejecting(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;

        assert_eq!(outcome, MessageOutcome::Rejected);
        assert!(h.db.posted.lock().unwrap().is_empty());
        // The summary is still narrated.
        assert_eq!(h.speech.spoken.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn validator_failure_fails_closed() {
        let h = harness(
            vec![],
            MockDb::default(),
            MockClassifier::new(vec![Ok(task_reply("Send the Q3 report"))]),
            MockValidator::failing(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;

        assert_eq!(outcome, MessageOutcome::Rejected);
        assert!(h.db.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn draft_matching_a_known_task_is_discarded_before_validation() {
        let known = Task {
            task_name: "Send the Q3 report".to_string(),
            description: "Already tracked.".to_string(),
            due_date: NaiveDate::from_ymd_opt(2025, 5, 19).unwrap(),
            priority: 1,
            related_id: "12345".to_string(),
        };
        let h = harness(
            vec![],
            MockDb { known: vec![known], ..MockDb::default() },
            MockClassifier::new(vec![Ok(task_reply("SEND THE Q3 REPORT"))]),
            MockValidator::accepting(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;

        assert_eq!(outcome, MessageOutcome::DuplicateDiscarded);
        assert_eq!(h.validator.call_count(), 0);
        assert!(h.db.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn task_created_without_payload_is_treated_as_malformed() {
        let reply = ClassificationReply {
            task_created: true,
            message: "John asked for something.".to_string(),
            task: None,
        };
        let h = harness(
            vec![],
            MockDb::default(),
            MockClassifier::new(vec![Ok(reply)]),
            MockValidator::accepting(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;

        assert_eq!(outcome, MessageOutcome::Failed);
        assert!(h.db.posted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_is_contained() {
        let h = harness(
            vec![],
            MockDb { fail_post: true, ..MockDb::default() },
            MockClassifier::new(vec![Ok(task_reply("Send the Q3 report"))]),
            MockValidator::accepting(),
        );

        let outcome = h.pipeline.process_message(&message(LONG_TEXT)).await;
        assert_eq!(outcome, MessageOutcome::Failed);
    }

    //-------------------------------------------------------------------------------------
    // Cycle-level properties
    //-------------------------------------------------------------------------------------

    #[tokio::test]
    async fn three_message_cycle_speaks_twice_and_persists_once() {
        let messages = vec![
            message("Hey you!"), // 8 chars, skipped before any remote call
            message(LONG_TEXT),  // task proposed and accepted
            message("Thanks for the update yesterday, no rush"), // summary only
        ];
        let h = harness(
            messages,
            MockDb::default(),
            MockClassifier::new(vec![
                Ok(task_reply("Send the Q3 report")),
                Ok(summary_reply()),
            ]),
            MockValidator::accepting(),
        );

        let before = Watermark::new(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        h.pipeline.run_cycle(before).await;

        assert_eq!(h.classifier.call_count(), 2);
        assert_eq!(h.speech.spoken.lock().unwrap().len(), 2);
        assert_eq!(h.db.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn watermark_advances_only_after_a_completed_cycle() {
        let h = harness(
            vec![message(LONG_TEXT)],
            MockDb::default(),
            MockClassifier::new(vec![Ok(summary_reply())]),
            MockValidator::accepting(),
        );

        let before = Watermark::new(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        let after = h.pipeline.run_cycle(before).await;

        assert!(after.as_datetime() > before.as_datetime());
        let stored = h.watermarks.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], after.as_datetime());
    }

    #[tokio::test]
    async fn failed_poll_leaves_the_watermark_untouched() {
        let h = harness_with_source(
            Arc::new(FailingSource),
            MockDb::default(),
            MockClassifier::new(vec![]),
            MockValidator::accepting(),
        );

        let before = Watermark::new(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        let after = h.pipeline.run_cycle(before).await;

        assert_eq!(after, before);
        assert!(h.watermarks.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn classifier_failure_skips_the_message_but_not_the_cycle() {
        let messages = vec![message(LONG_TEXT), message(LONG_TEXT)];
        let h = harness(
            messages,
            MockDb::default(),
            MockClassifier::new(vec![
                Err(PortError::Schema("missing field `message`".to_string())),
                Ok(summary_reply()),
            ]),
            MockValidator::accepting(),
        );

        let before = Watermark::new(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap());
        h.pipeline.run_cycle(before).await;

        // The second message was still classified and narrated, and the
        // completed cycle persisted its watermark.
        assert_eq!(h.classifier.call_count(), 2);
        assert_eq!(h.speech.spoken.lock().unwrap().len(), 1);
        assert_eq!(h.watermarks.stored.lock().unwrap().len(), 1);
    }
}
