pub mod chat;
pub mod classifier;
pub mod db;
pub mod speech;
pub mod validator;
pub mod watermark;

pub use chat::GraphChatAdapter;
pub use classifier::OpenAiClassifierAdapter;
pub use db::DbAdapter;
pub use speech::OpenAiSpeechAdapter;
pub use validator::OpenAiValidatorAdapter;
pub use watermark::FileWatermarkStore;
