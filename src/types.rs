//! Shared types: conversation messages and typed views over API responses.
//!
//! Response models are built from raw JSON with `from_json` constructors that
//! check the keys the rest of the crate relies on. A missing key is an
//! [`Error::MalformedResponse`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(Error::malformed(format!("unknown message role '{other}'"))),
        }
    }
}

/// A tool call request from the model, in canonical form.
///
/// `arguments` is kept as the JSON-encoded text the backend sent; it is only
/// parsed when the tool is invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// A chat message in a conversation.
///
/// Tool-role messages carry `tool_call_id` and `name`; assistant messages that
/// request tool calls may have no content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// The result of executing the tool call `tool_call_id` named `name`.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    /// True when the message carries non-blank text.
    pub fn has_text(&self) -> bool {
        self.content
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
    }

    /// Parse a message object as returned inside a chat choice.
    pub fn from_json(value: &Value) -> Result<Self> {
        let role: Role = str_field(value, "role", "message")?.parse()?;

        let tool_calls = match value.get("tool_calls") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(calls)) => calls
                .iter()
                .map(tool_call_from_json)
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::malformed("'tool_calls' is not an array")),
        };

        // Backends may omit `content` entirely on a pure tool-call turn.
        let content = match value.get("content") {
            Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None if !tool_calls.is_empty() => None,
            None => return Err(Error::malformed("missing 'content' in message")),
        };

        Ok(Self {
            role,
            content,
            tool_calls,
            tool_call_id: value
                .get("tool_call_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            name: value.get("name").and_then(Value::as_str).map(str::to_string),
        })
    }
}

/// Wire shape: `{id, type, function: {name, arguments}}`.
fn tool_call_from_json(value: &Value) -> Result<ToolCall> {
    let function = field(value, "function", "tool call")?;
    let arguments = match field(function, "arguments", "tool call function")? {
        Value::String(s) => s.clone(),
        // Some backends inline the arguments object instead of encoding it.
        other => other.to_string(),
    };
    Ok(ToolCall {
        id: str_field(value, "id", "tool call")?.to_string(),
        name: str_field(function, "name", "tool call function")?.to_string(),
        arguments,
    })
}

// ---------------------------------------------------------------------------
// Chat completions
// ---------------------------------------------------------------------------

/// Why the backend stopped generating for a choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    FunctionCall,
    /// The backend sent `null`.
    Unspecified,
    Other(String),
}

impl FinishReason {
    fn from_json(value: &Value) -> Self {
        match value.as_str() {
            None => Self::Unspecified,
            Some("stop") => Self::Stop,
            Some("length") => Self::Length,
            Some("tool_calls") => Self::ToolCalls,
            Some("content_filter") => Self::ContentFilter,
            Some("function_call") => Self::FunctionCall,
            Some(other) => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::ToolCalls => write!(f, "tool_calls"),
            Self::ContentFilter => write!(f, "content_filter"),
            Self::FunctionCall => write!(f, "function_call"),
            Self::Unspecified => write!(f, "unspecified"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// One candidate completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: FinishReason,
}

impl Choice {
    pub fn from_json(value: &Value) -> Result<Self> {
        let index = field(value, "index", "choice")?
            .as_u64()
            .ok_or_else(|| Error::malformed("choice 'index' is not an integer"))?;
        let index = u32::try_from(index)
            .map_err(|_| Error::malformed(format!("choice 'index' {index} is out of range")))?;
        Ok(Self {
            index,
            message: Message::from_json(field(value, "message", "choice")?)?,
            finish_reason: FinishReason::from_json(field(value, "finish_reason", "choice")?),
        })
    }
}

/// Token usage from a completion call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// Parsed `chat/completions` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub id: Option<String>,
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    pub usage: Option<TokenUsage>,
}

impl CompletionResult {
    pub fn from_json(value: &Value) -> Result<Self> {
        let choices = array_field(value, "choices", "completion")?
            .iter()
            .map(Choice::from_json)
            .collect::<Result<Vec<_>>>()?;
        let usage = match value.get("usage") {
            None | Some(Value::Null) => None,
            Some(u) => Some(serde_json::from_value(u.clone())?),
        };
        Ok(Self {
            id: value.get("id").and_then(Value::as_str).map(str::to_string),
            model: value.get("model").and_then(Value::as_str).map(str::to_string),
            choices,
            usage,
        })
    }

    /// Text of the first choice, if it has any.
    pub fn text(&self) -> Option<&str> {
        self.choices.first()?.message.content.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageGeneration {
    pub data: Vec<ImageData>,
}

impl ImageGeneration {
    pub fn from_json(value: &Value) -> Result<Self> {
        let data = array_field(value, "data", "image generation")?
            .iter()
            .map(|item| {
                Ok(ImageData {
                    url: str_field(item, "url", "image data")?.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { data })
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(|d| d.url.as_str())
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
}

impl Transcription {
    pub fn from_json(value: &Value) -> Result<Self> {
        Ok(Self {
            text: str_field(value, "text", "transcription")?.to_string(),
        })
    }
}

/// Raw audio returned by `audio/speech`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechResponse {
    pub audio: Vec<u8>,
}

impl SpeechResponse {
    /// Write the audio payload to `path`, replacing any existing file.
    pub async fn stream_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.audio).await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Moderations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub flagged: bool,
    pub categories: Map<String, Value>,
    pub category_scores: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationResponse {
    pub results: Vec<ModerationResult>,
    /// The full response body, for fields not modelled here.
    pub raw: Value,
}

impl ModerationResponse {
    pub fn from_json(value: &Value) -> Result<Self> {
        let results = array_field(value, "results", "moderation")?
            .iter()
            .map(|r| {
                let flagged = field(r, "flagged", "moderation result")?
                    .as_bool()
                    .ok_or_else(|| Error::malformed("'flagged' is not a boolean"))?;
                let object = |key: &str| {
                    r.get(key)
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default()
                };
                Ok(ModerationResult {
                    flagged,
                    categories: object("categories"),
                    category_scores: object("category_scores"),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            results,
            raw: value.clone(),
        })
    }

    pub fn flagged(&self) -> bool {
        self.results.iter().any(|r| r.flagged)
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn field<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a Value> {
    value
        .get(key)
        .ok_or_else(|| Error::malformed(format!("missing '{key}' in {context}")))
}

fn str_field<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a str> {
    field(value, key, context)?
        .as_str()
        .ok_or_else(|| Error::malformed(format!("'{key}' in {context} is not a string")))
}

fn array_field<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a Vec<Value>> {
    field(value, key, context)?
        .as_array()
        .ok_or_else(|| Error::malformed(format!("'{key}' in {context} is not an array")))
}
