//! services/agent/src/bin/agent.rs

use agent_lib::{
    adapters::{
        DbAdapter, FileWatermarkStore, GraphChatAdapter, OpenAiClassifierAdapter,
        OpenAiSpeechAdapter, OpenAiValidatorAdapter,
    },
    config::Config,
    error::AgentError,
};
use async_openai::{
    config::OpenAIConfig,
    types::{SpeechModel, Voice},
    Client,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use taskpilot_core::ports::{DatabaseService, PortError};
use taskpilot_core::{NotificationPipeline, PipelineServices, PipelineTiming};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AgentError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting agent...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(config.openai_api_key.clone());
    let openai_client = Client::with_config(openai_config);

    let classifier_adapter = Arc::new(OpenAiClassifierAdapter::new(
        openai_client.clone(),
        config.classifier_model.clone(),
    ));
    let validator_adapter = Arc::new(OpenAiValidatorAdapter::new(
        openai_client.clone(),
        config.validator_model.clone(),
    ));

    let tts_voice = match config.tts_voice.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => {
            return Err(AgentError::Internal(format!(
                "Invalid TTS voice specified in config: '{}'",
                config.tts_voice
            )))
        }
    };
    let speech_adapter = Arc::new(OpenAiSpeechAdapter::new(
        openai_client.clone(),
        SpeechModel::Tts1,
        tts_voice,
    ));

    info!("Resolving chat identity...");
    let chat_adapter = Arc::new(
        GraphChatAdapter::connect(
            config.graph_base_url.clone(),
            config.graph_access_token.clone(),
        )
        .await?,
    );

    let watermark_store = Arc::new(FileWatermarkStore::new(config.watermark_path.clone()));

    // --- 4. Load the Owner Profile ---
    // Exactly one profile row must exist for the configured identity; anything
    // else is a fatal misconfiguration and the poll loop is never entered.
    let profile = match db_adapter.get_profile(config.user_id).await {
        Ok(profile) => profile,
        Err(e @ (PortError::NotFound(_) | PortError::Ambiguous(_))) => {
            error!("Cannot start: {e}");
            return Err(AgentError::Port(e));
        }
        Err(e) => return Err(AgentError::Port(e)),
    };
    info!("Assistant session initialized for {}.", profile.display_name);

    // --- 5. Build and Run the Pipeline ---
    let pipeline = NotificationPipeline::new(
        profile,
        PipelineServices {
            source: chat_adapter,
            db: db_adapter,
            classifier: classifier_adapter,
            validator: validator_adapter,
            speech: speech_adapter,
            watermarks: watermark_store,
        },
        PipelineTiming {
            poll_interval: config.poll_interval,
            message_delay: config.message_delay,
        },
    );

    info!(
        "Entering poll loop (every {:?}, {:?} between messages).",
        config.poll_interval, config.message_delay
    );
    pipeline.run().await?;

    Ok(())
}
