//! services/agent/src/adapters/validator.rs
//!
//! This module contains the adapter for the task-validation LLM.
//! It implements the `ValidatorService` port from the `core` crate: a single
//! long-lived gate, primed once, that answers strictly yes or no.

const PRIMING_INSTRUCTIONS: &str = r#"You'll be provided with messages, and I want you to reply with only "yes" if the contents of my message can be interpreted as a work related task.
If they're not, just reply "no". The tasks are supposed to be ticked off, so only tasks clearly defined with deliverables should be considered valid.
Okay?"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use taskpilot_core::ports::{PortError, PortResult, ValidatorService};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ValidatorService` using an OpenAI-compatible LLM.
///
/// The upstream chat API keeps no server-side session, so the priming
/// instructions are replayed with every call; the gate itself is constructed
/// once per pipeline lifetime.
#[derive(Clone)]
pub struct OpenAiValidatorAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiValidatorAdapter {
    /// Creates a new `OpenAiValidatorAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// The acceptance rule: the trimmed, case-folded response must be exactly
/// "yes". Anything else, malformed and empty responses included, rejects.
fn is_affirmative(response: &str) -> bool {
    response.trim().eq_ignore_ascii_case("yes")
}

//=========================================================================================
// `ValidatorService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ValidatorService for OpenAiValidatorAdapter {
    async fn validate(&self, task_name: &str, description: &str) -> PortResult<bool> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(PRIMING_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("{task_name} \n\n{description}"))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // A response with no text counts as rejection, not as an error.
        let answer = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        debug!("Validator answered '{}' for task '{}'", answer.trim(), task_name);
        Ok(is_affirmative(&answer))
    }
}
