pub mod domain;
pub mod pipeline;
pub mod ports;

pub use domain::{ClassificationReply, InboundMessage, Task, TaskDraft, UserProfile, Watermark};
pub use pipeline::{
    MessageOutcome, NotificationPipeline, PipelineServices, PipelineTiming, MIN_MESSAGE_CHARS,
};
pub use ports::{
    ClassifierService, DatabaseService, MessageSource, PortError, PortResult, SpeechService,
    ValidatorService, WatermarkStore,
};
