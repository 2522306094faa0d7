//! services/agent/src/adapters/speech.rs
//!
//! This module contains the adapter for speech output.
//! It implements the `SpeechService` port from the `core` crate: synthesize
//! the text with the OpenAI TTS API, then play it on the default audio
//! device, returning only once playback has drained so narrations never
//! overlap.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use std::io::Cursor;
use taskpilot_core::ports::{PortError, PortResult, SpeechService};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechService` port using the OpenAI TTS API
/// and local audio playback.
#[derive(Clone)]
pub struct OpenAiSpeechAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiSpeechAdapter {
    /// Creates a new `OpenAiSpeechAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }
}

/// Decodes the synthesized audio and blocks until the sink has played it out.
/// Runs on a blocking thread; the audio device handle must not cross await
/// points.
fn play_blocking(audio: Vec<u8>) -> Result<(), String> {
    let (_stream, handle) = rodio::OutputStream::try_default().map_err(|e| e.to_string())?;
    let sink = rodio::Sink::try_new(&handle).map_err(|e| e.to_string())?;
    let source = rodio::Decoder::new(Cursor::new(audio)).map_err(|e| e.to_string())?;
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

//=========================================================================================
// `SpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechService for OpenAiSpeechAdapter {
    async fn speak(&self, text: &str) -> PortResult<()> {
        debug!("Narrating: {}", text);

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            ..Default::default()
        };

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let audio = response.bytes.to_vec();
        tokio::task::spawn_blocking(move || play_blocking(audio))
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .map_err(PortError::Unexpected)?;

        Ok(())
    }
}
