//! Configuration schema for `config.toml`.

use serde::{Deserialize, Serialize};

/// Models known to support tool calling on the CablyAI backend.
pub const DEFAULT_TOOL_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4-turbo",
    "gpt-3.5-turbo",
    "claude-3-5-sonnet",
    "claude-3-haiku",
];

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API key sent as a bearer token. `CABLYAI_API_KEY` overrides it.
    pub api_key: String,

    /// API base URL; endpoint paths are appended to it.
    pub base_url: String,

    /// Timeout for backend requests, in seconds.
    pub request_timeout_secs: u64,

    /// Timeout for the built-in `fetch` and `search` tools, in seconds.
    pub fetch_timeout_secs: u64,

    /// Models allowed to run the tool-augmented completion loop.
    pub tool_models: Vec<String>,

    /// Maximum backend requests per completion loop run.
    pub max_tool_iterations: u32,

    /// Default chat model.
    pub chat_model: String,

    /// Default image generation model.
    pub image_model: String,

    /// Default transcription model.
    pub transcription_model: String,

    /// Default text-to-speech model and voice.
    pub speech_model: String,
    pub speech_voice: String,

    /// Default moderation model.
    pub moderation_model: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://cablyai.com/v1".into(),
            request_timeout_secs: 60,
            fetch_timeout_secs: 5,
            tool_models: DEFAULT_TOOL_MODELS.iter().map(|m| m.to_string()).collect(),
            max_tool_iterations: 10,
            chat_model: "gpt-4o".into(),
            image_model: "flux-realism".into(),
            transcription_model: "whisper-1".into(),
            speech_model: "tts-1".into(),
            speech_voice: "alloy".into(),
            moderation_model: "text-moderation-latest".into(),
            log_level: "info".into(),
        }
    }
}
