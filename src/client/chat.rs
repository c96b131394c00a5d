//! `chat/completions`: request payloads in the OpenAI-compatible format.

use super::transport::CHAT_COMPLETIONS;
use super::CablyClient;
use crate::error::Result;
use crate::tools::ToolSpec;
use crate::types::{CompletionResult, Message};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// A single chat completion request, without the tool loop.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

// -- Wire types ---------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    model: &'a str,
    messages: Vec<MessagePayload<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolPayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    role: &'static str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallPayload<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ToolPayload<'a> {
    r#type: &'static str,
    function: FunctionPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionPayload<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Serialize)]
struct ToolCallPayload<'a> {
    id: &'a str,
    r#type: &'static str,
    function: FunctionCallPayload<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionCallPayload<'a> {
    name: &'a str,
    arguments: &'a str,
}

impl<'a> From<&'a Message> for MessagePayload<'a> {
    fn from(m: &'a Message) -> Self {
        Self {
            role: m.role.as_str(),
            content: m.content.as_deref(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| ToolCallPayload {
                    id: &tc.id,
                    r#type: "function",
                    function: FunctionCallPayload {
                        name: &tc.name,
                        arguments: &tc.arguments,
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.as_deref(),
            name: m.name.as_deref(),
        }
    }
}

impl<'a> From<&'a ToolSpec> for ToolPayload<'a> {
    fn from(t: &'a ToolSpec) -> Self {
        Self {
            r#type: "function",
            function: FunctionPayload {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        }
    }
}

/// Build the JSON body for `chat/completions`.
pub(crate) fn chat_payload<'a>(
    model: &str,
    messages: &[Message],
    tools: impl IntoIterator<Item = &'a ToolSpec>,
    max_tokens: Option<u32>,
    temperature: Option<f64>,
) -> Result<Value> {
    let payload = ChatPayload {
        model,
        messages: messages.iter().map(MessagePayload::from).collect(),
        tools: tools.into_iter().map(ToolPayload::from).collect(),
        max_tokens,
        temperature,
    };
    Ok(serde_json::to_value(&payload)?)
}

impl CablyClient {
    /// Create a completion for `request`. Tool calls in the response are
    /// returned as-is; use [`CablyClient::tool_loop`] to execute them.
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<CompletionResult> {
        debug!("Chat completion with model: {}", request.model);
        let payload = chat_payload(
            &request.model,
            &request.messages,
            &request.tools,
            request.max_tokens,
            request.temperature,
        )?;
        let body = self.transport().post_json(CHAT_COMPLETIONS, &payload).await?;
        CompletionResult::from_json(&body)
    }
}
