//! `audio/transcriptions` and `audio/speech`.

use super::transport::{FileUpload, AUDIO_SPEECH, AUDIO_TRANSCRIPTIONS};
use super::CablyClient;
use crate::error::Result;
use crate::types::{SpeechResponse, Transcription};
use serde::Serialize;
use tracing::debug;

/// Text-to-speech request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeechRequest {
    pub model: String,
    pub voice: String,
    pub input: String,
}

impl SpeechRequest {
    pub fn new(
        model: impl Into<String>,
        voice: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            voice: voice.into(),
            input: input.into(),
        }
    }
}

impl CablyClient {
    /// Transcribe an audio file. The model goes in a form field next to the
    /// uploaded file.
    pub async fn transcribe(&self, model: &str, file: FileUpload) -> Result<Transcription> {
        debug!("Transcribing '{}' with model: {}", file.file_name, model);
        let fields = vec![("model".to_string(), model.to_string())];
        let body = self
            .transport()
            .post_multipart(AUDIO_TRANSCRIPTIONS, fields, file)
            .await?;
        Transcription::from_json(&body)
    }

    /// Synthesize speech; the response is the raw audio payload.
    pub async fn speech(&self, request: &SpeechRequest) -> Result<SpeechResponse> {
        debug!("Speech with model: {} voice: {}", request.model, request.voice);
        let payload = serde_json::to_value(request)?;
        let audio = self.transport().post_bytes(AUDIO_SPEECH, &payload).await?;
        Ok(SpeechResponse { audio })
    }
}
