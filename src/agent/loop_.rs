//! Tool-augmented completion loop: Request → Dispatch → Request → Done.
//!
//! Each iteration:
//! 1. Sends the conversation and the advertised tool schema
//! 2. Appends the first choice's message as an assistant message
//! 3. Runs its tool calls in order, appending one tool message per call
//! 4. Stops once the assistant message has non-blank text
//!
//! The conversation is only ever appended to, and every message the loop
//! produces is appended before any error is returned.

use super::Conversation;
use crate::client::chat::chat_payload;
use crate::client::transport::{Transport, CHAT_COMPLETIONS};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::tools::{ToolOutput, ToolRegistry, ToolSelection};
use crate::types::{CompletionResult, Message, Role, ToolCall};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Phases of a loop run, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on the backend.
    AwaitingResponse,
    /// Executing the tool calls of the latest response.
    Dispatching,
    /// The latest assistant message has text.
    Done,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingResponse => write!(f, "awaiting_response"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Knobs for a [`ToolLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOptions {
    /// Models allowed to use tool calling.
    pub allowed_models: Vec<String>,
    /// Maximum backend requests per run.
    pub max_iterations: u32,
    /// Tools to advertise.
    pub tools: ToolSelection,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl LoopOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            allowed_models: config.tool_models.clone(),
            max_iterations: config.max_tool_iterations,
            tools: ToolSelection::All,
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_allowed_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_models = models.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tools(mut self, tools: ToolSelection) -> Self {
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

/// Drives model calls and tool execution until the model answers in text.
///
/// Holds no per-conversation state, so one loop can serve many concurrent
/// conversations.
#[derive(Clone)]
pub struct ToolLoop {
    transport: Arc<dyn Transport>,
    registry: Arc<ToolRegistry>,
    options: LoopOptions,
}

impl fmt::Debug for ToolLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolLoop")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ToolLoop {
    pub fn new(
        transport: Arc<dyn Transport>,
        registry: Arc<ToolRegistry>,
        options: LoopOptions,
    ) -> Self {
        Self {
            transport,
            registry,
            options,
        }
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn supports_model(&self, model: &str) -> bool {
        self.options.allowed_models.iter().any(|m| m == model)
    }

    /// Run until the model produces a textual answer.
    pub async fn run(&self, model: &str, conversation: &mut Conversation) -> Result<CompletionResult> {
        self.run_with_cancel(model, conversation, &CancellationToken::new())
            .await
    }

    /// Like [`ToolLoop::run`], returning [`Error::Cancelled`] if `cancel`
    /// fires while waiting on the backend.
    pub async fn run_with_cancel(
        &self,
        model: &str,
        conversation: &mut Conversation,
        cancel: &CancellationToken,
    ) -> Result<CompletionResult> {
        if !self.supports_model(model) {
            warn!("Model '{}' is not allow-listed for tool calling", model);
            return Err(Error::UnsupportedModel {
                model: model.to_string(),
            });
        }

        let tools = self.registry.schema_for(&self.options.tools);
        let max_iterations = self.options.max_iterations;
        let mut last: Option<CompletionResult> = None;

        info!(
            "Starting tool loop with model {} ({} tools, max {} iterations)",
            model,
            tools.len(),
            max_iterations
        );

        for iteration in 1..=max_iterations {
            debug!("[Iteration {}] {}", iteration, LoopState::AwaitingResponse);

            let payload = chat_payload(
                model,
                conversation.messages(),
                tools.iter().copied(),
                self.options.max_tokens,
                self.options.temperature,
            )?;

            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("[Iteration {}] Cancelled", iteration);
                    return Err(Error::Cancelled);
                }
                resp = self.transport.post_json(CHAT_COMPLETIONS, &payload) => resp?,
            };
            let result = CompletionResult::from_json(&body)?;

            if result.choices.is_empty() {
                warn!("[Iteration {}] Response has no choices; stopping", iteration);
                return Ok(last.unwrap_or(result));
            }

            let mut message = result.choices[0].message.clone();
            message.role = Role::Assistant;
            let done = message.has_text();
            let calls = message.tool_calls.clone();
            conversation.push(message);

            if !calls.is_empty() {
                debug!(
                    "[Iteration {}] {} ({} tool calls)",
                    iteration,
                    LoopState::Dispatching,
                    calls.len()
                );
                for call in &calls {
                    let output = self.dispatch(iteration, call).await;
                    conversation.push(Message::tool(&call.id, &call.name, output.text));
                }
            }

            if done {
                debug!("[Iteration {}] {}", iteration, LoopState::Done);
                return Ok(result);
            }

            if calls.is_empty() {
                warn!("[Iteration {}] Empty response without tool calls", iteration);
            }
            last = Some(result);
        }

        warn!("Tool loop gave up after {} iterations", max_iterations);
        Err(Error::LoopExceeded {
            iterations: max_iterations,
        })
    }

    /// Run one tool call. Never fails: problems become the tool's text.
    async fn dispatch(&self, iteration: u32, call: &ToolCall) -> ToolOutput {
        info!("[Iteration {}] Tool: {}({})", iteration, call.name, call.arguments);

        if !self.options.tools.allows(&call.name) {
            let err = Error::UnknownTool {
                name: call.name.clone(),
            };
            warn!("[Iteration {}] Tool error: {}", iteration, err);
            return ToolOutput::failure(format!("Error: {}", err));
        }

        match self.registry.invoke(&call.name, &call.arguments).await {
            Ok(output) => {
                info!(
                    "[Iteration {}] Tool result: {} chars",
                    iteration,
                    output.text.len()
                );
                output
            }
            Err(err) => {
                warn!("[Iteration {}] Tool error: {}", iteration, err);
                ToolOutput::failure(format!("Error: {}", err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::transport::FileUpload;
    use crate::tools::{FunctionBinding, ToolSpec};
    use async_trait::async_trait;
    use serde_json::{json, Map, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned chat responses and records every request.
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<Value>>>,
        repeat: Option<Value>,
        requests: Mutex<Vec<Value>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                ..Self::default()
            })
        }

        fn with_results(responses: Vec<Result<Value>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            })
        }

        fn repeating(response: Value) -> Arc<Self> {
            Arc::new(Self {
                repeat: Some(response),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, i: usize) -> Value {
            self.requests.lock().unwrap()[i].clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
            assert_eq!(endpoint, CHAT_COMPLETIONS);
            self.requests.lock().unwrap().push(payload.clone());
            match self.responses.lock().unwrap().pop_front() {
                Some(next) => next,
                None => self.repeat.clone().ok_or(Error::Transport {
                    status: 500,
                    body: "script exhausted".into(),
                }),
            }
        }

        async fn post_multipart(
            &self,
            _endpoint: &str,
            _fields: Vec<(String, String)>,
            _file: FileUpload,
        ) -> Result<Value> {
            unreachable!("the loop only posts JSON")
        }

        async fn post_bytes(&self, _endpoint: &str, _payload: &Value) -> Result<Vec<u8>> {
            unreachable!("the loop only posts JSON")
        }
    }

    fn reply(content: Option<&str>, tool_calls: Value) -> Value {
        let finish = if tool_calls.as_array().is_some_and(|c| !c.is_empty()) {
            "tool_calls"
        } else {
            "stop"
        };
        json!({
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content, "tool_calls": tool_calls},
                "finish_reason": finish
            }]
        })
    }

    fn text(content: &str) -> Value {
        reply(Some(content), json!([]))
    }

    fn call(id: &str, name: &str, arguments: Value) -> Value {
        json!({
            "id": id,
            "type": "function",
            "function": {"name": name, "arguments": arguments.to_string()}
        })
    }

    /// Registry whose tools append their name to `log` when called.
    fn recording_registry(log: Arc<Mutex<Vec<String>>>) -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        for name in ["search", "fetch"] {
            let log = log.clone();
            let param = if name == "search" { "query" } else { "url" };
            registry
                .register(
                    ToolSpec::new(
                        name,
                        format!("{name} tool"),
                        json!({
                            "type": "object",
                            "properties": {param: {"type": "string"}},
                            "required": [param]
                        }),
                    ),
                    Arc::new(FunctionBinding::new(move |args: Map<String, Value>| {
                        log.lock().unwrap().push(name.to_string());
                        Ok(format!("{name} ok: {}", args[param]))
                    })),
                )
                .unwrap();
        }
        Arc::new(registry)
    }

    fn tool_loop(transport: Arc<ScriptedTransport>, registry: Arc<ToolRegistry>) -> ToolLoop {
        let options = LoopOptions::default()
            .with_allowed_models(["gpt-4o"])
            .with_max_iterations(5);
        ToolLoop::new(transport, registry, options)
    }

    fn roles(conversation: &Conversation) -> Vec<Role> {
        conversation.messages().iter().map(|m| m.role).collect()
    }

    #[test]
    fn allow_list_comes_from_options_only() {
        let config = ClientConfig {
            tool_models: vec!["my-model".into()],
            ..ClientConfig::default()
        };
        let transport = ScriptedTransport::new(vec![]);
        let registry = Arc::new(ToolRegistry::new());

        let from_config = ToolLoop::new(
            transport.clone(),
            registry.clone(),
            LoopOptions::from_config(&config),
        );
        assert!(from_config.supports_model("my-model"));
        assert!(!from_config.supports_model("gpt-4o"));

        let overridden = ToolLoop::new(
            transport,
            registry,
            LoopOptions::from_config(&config).with_allowed_models(["gpt-4o"]),
        );
        assert!(overridden.supports_model("gpt-4o"));
        assert!(!overridden.supports_model("my-model"));
    }

    #[tokio::test]
    async fn unsupported_model_sends_nothing() {
        let transport = ScriptedTransport::new(vec![text("hi")]);
        let tl = tool_loop(transport.clone(), Arc::new(ToolRegistry::new()));
        let mut conversation = Conversation::from(vec![Message::user("hello")]);

        let err = tl.run("llama-2", &mut conversation).await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedModel { model } if model == "llama-2"));
        assert_eq!(transport.calls(), 0);
        assert_eq!(conversation.len(), 1);
    }

    #[tokio::test]
    async fn retries_until_text_arrives() {
        let transport = ScriptedTransport::new(vec![
            reply(None, json!([])),
            text("   "),
            text("The answer is 42."),
        ]);
        let tl = tool_loop(transport.clone(), Arc::new(ToolRegistry::new()));
        let mut conversation = Conversation::from(vec![Message::user("question")]);

        let result = tl.run("gpt-4o", &mut conversation).await.unwrap();

        assert_eq!(transport.calls(), 3);
        assert_eq!(result.text(), Some("The answer is 42."));
        assert_eq!(
            roles(&conversation),
            [Role::User, Role::Assistant, Role::Assistant, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_iterations() {
        let transport = ScriptedTransport::repeating(reply(None, json!([])));
        let tl = tool_loop(transport.clone(), Arc::new(ToolRegistry::new()));
        let mut conversation = Conversation::from(vec![Message::user("question")]);

        let err = tl.run("gpt-4o", &mut conversation).await.unwrap_err();

        assert!(matches!(err, Error::LoopExceeded { iterations: 5 }));
        assert_eq!(transport.calls(), 5);
        assert_eq!(conversation.len(), 6);
    }

    #[tokio::test]
    async fn executes_tool_calls_in_order() {
        let transport = ScriptedTransport::new(vec![
            reply(
                None,
                json!([
                    call("call_1", "search", json!({"query": "rust"})),
                    call("call_2", "fetch", json!({"url": "https://www.rust-lang.org/"})),
                ]),
            ),
            text("Rust is a systems language."),
        ]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let tl = tool_loop(transport.clone(), recording_registry(log.clone()));
        let mut conversation = Conversation::from(vec![Message::user("what is rust?")]);

        let result = tl.run("gpt-4o", &mut conversation).await.unwrap();

        assert_eq!(result.text(), Some("Rust is a systems language."));
        assert_eq!(*log.lock().unwrap(), ["search", "fetch"]);
        assert_eq!(
            roles(&conversation),
            [Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
        );

        let messages = conversation.messages();
        assert_eq!(messages[1].tool_calls.len(), 2);
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[2].name.as_deref(), Some("search"));
        assert_eq!(messages[2].content.as_deref(), Some("search ok: \"rust\""));
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_2"));

        // The second request carries the whole history plus the tool schema.
        let second = transport.request(1);
        assert_eq!(second["messages"].as_array().unwrap().len(), 4);
        assert_eq!(second["messages"][1]["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(second["messages"][3]["role"], "tool");
        assert_eq!(second["tools"].as_array().unwrap().len(), 2);
        assert_eq!(second["tools"][0]["function"]["name"], "search");
    }

    #[tokio::test]
    async fn tool_failures_become_messages() {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolSpec::new("explode", "always fails", json!({"type": "object"})),
                Arc::new(FunctionBinding::new(|_| Err(anyhow::anyhow!("boom")))),
            )
            .unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let fetch_registry = recording_registry(log.clone());

        // Failing binding.
        let transport = ScriptedTransport::new(vec![
            reply(None, json!([call("c1", "explode", json!({}))])),
            text("sorry"),
        ]);
        let tl = tool_loop(transport.clone(), Arc::new(registry));
        let mut conversation = Conversation::from(vec![Message::user("go")]);
        tl.run("gpt-4o", &mut conversation).await.unwrap();
        assert_eq!(conversation.messages()[2].content.as_deref(), Some("Error: boom"));
        assert_eq!(transport.calls(), 2);

        // Missing parameter, malformed arguments and an unknown tool.
        let transport = ScriptedTransport::new(vec![
            reply(
                None,
                json!([
                    call("c1", "fetch", json!({"index": [0, 2]})),
                    {"id": "c2", "type": "function", "function": {"name": "search", "arguments": "{not json"}},
                    call("c3", "launch_missiles", json!({})),
                ]),
            ),
            text("done"),
        ]);
        let tl = tool_loop(transport.clone(), fetch_registry);
        let mut conversation = Conversation::from(vec![Message::user("go")]);
        tl.run("gpt-4o", &mut conversation).await.unwrap();

        let contents: Vec<&str> = conversation.messages()[2..5]
            .iter()
            .map(|m| m.content.as_deref().unwrap())
            .collect();
        assert_eq!(
            contents[0],
            "Error: missing required parameter 'url' for tool 'fetch'"
        );
        assert!(contents[1].starts_with("Error: malformed arguments for tool 'search'"));
        assert_eq!(contents[2], "Error: unknown tool: launch_missiles");
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn text_with_tool_calls_finishes_after_dispatch() {
        let transport = ScriptedTransport::new(vec![reply(
            Some("Looking that up."),
            json!([call("c1", "search", json!({"query": "q"}))]),
        )]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let tl = tool_loop(transport.clone(), recording_registry(log.clone()));
        let mut conversation = Conversation::new();
        conversation.push_user("q?");

        let result = tl.run("gpt-4o", &mut conversation).await.unwrap();

        assert_eq!(transport.calls(), 1);
        assert_eq!(result.text(), Some("Looking that up."));
        assert_eq!(roles(&conversation), [Role::User, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn empty_choices_return_partial_result() {
        let transport = ScriptedTransport::new(vec![
            reply(None, json!([call("c1", "search", json!({"query": "q"}))])),
            json!({"choices": []}),
        ]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let tl = tool_loop(transport.clone(), recording_registry(log));
        let mut conversation = Conversation::from(vec![Message::user("q?")]);

        let result = tl.run("gpt-4o", &mut conversation).await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(result.choices.len(), 1);
        assert_eq!(result.choices[0].message.tool_calls[0].id, "c1");
        assert_eq!(roles(&conversation), [Role::User, Role::Assistant, Role::Tool]);

        // With nothing earlier to fall back on, the empty result itself comes back.
        let transport = ScriptedTransport::new(vec![json!({"choices": []})]);
        let tl = tool_loop(transport, Arc::new(ToolRegistry::new()));
        let result = tl.run("gpt-4o", &mut Conversation::new()).await.unwrap();
        assert!(result.choices.is_empty());
    }

    #[tokio::test]
    async fn transport_errors_propagate_after_appending() {
        let transport = ScriptedTransport::with_results(vec![
            Ok(reply(None, json!([call("c1", "search", json!({"query": "q"}))]))),
            Err(Error::Transport {
                status: 503,
                body: "overloaded".into(),
            }),
        ]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let tl = tool_loop(transport, recording_registry(log));
        let mut conversation = Conversation::from(vec![Message::user("q?")]);

        let err = tl.run("gpt-4o", &mut conversation).await.unwrap_err();

        assert_eq!(err.status(), Some(503));
        assert_eq!(roles(&conversation), [Role::User, Role::Assistant, Role::Tool]);
    }

    #[tokio::test]
    async fn malformed_response_propagates() {
        let transport = ScriptedTransport::new(vec![json!({"object": "chat.completion"})]);
        let tl = tool_loop(transport, Arc::new(ToolRegistry::new()));

        let err = tl.run("gpt-4o", &mut Conversation::new()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn selection_limits_schema_and_calls() {
        let transport = ScriptedTransport::new(vec![
            reply(None, json!([call("c1", "fetch", json!({"url": "https://x"}))])),
            text("ok"),
        ]);
        let log = Arc::new(Mutex::new(Vec::new()));
        let options = LoopOptions::default()
            .with_allowed_models(["gpt-4o"])
            .with_tools(ToolSelection::Only(vec!["search".into()]))
            .with_max_tokens(128)
            .with_temperature(0.2);
        let tl = ToolLoop::new(transport.clone(), recording_registry(log.clone()), options);
        let mut conversation = Conversation::from(vec![Message::user("q?")]);

        tl.run("gpt-4o", &mut conversation).await.unwrap();

        let first = transport.request(0);
        assert_eq!(first["tools"].as_array().unwrap().len(), 1);
        assert_eq!(first["max_tokens"], 128);
        assert_eq!(first["temperature"], 0.2);
        assert_eq!(
            conversation.messages()[2].content.as_deref(),
            Some("Error: unknown tool: fetch")
        );
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_request() {
        let transport = ScriptedTransport::new(vec![text("never")]);
        let tl = tool_loop(transport.clone(), Arc::new(ToolRegistry::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tl
            .run_with_cancel("gpt-4o", &mut Conversation::new(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_runs_share_the_registry() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let mut registry = ToolRegistry::new();
        registry
            .register(
                ToolSpec::new("tick", "count", json!({"type": "object"})),
                Arc::new(FunctionBinding::new(move |_| {
                    Ok(c.fetch_add(1, Ordering::SeqCst).to_string())
                })),
            )
            .unwrap();
        let registry = Arc::new(registry);

        let script = || {
            ScriptedTransport::new(vec![
                reply(None, json!([call("t", "tick", json!({}))])),
                text("done"),
            ])
        };
        let a = tool_loop(script(), registry.clone());
        let b = tool_loop(script(), registry.clone());
        let (mut ca, mut cb) = (Conversation::new(), Conversation::new());

        let (ra, rb) = tokio::join!(a.run("gpt-4o", &mut ca), b.run("gpt-4o", &mut cb));

        assert_eq!(ra.unwrap().text(), Some("done"));
        assert_eq!(rb.unwrap().text(), Some("done"));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(ca.len(), 3);
        assert_eq!(cb.len(), 3);
    }
}
