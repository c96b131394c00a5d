//! Tool registry: which tools the model may call, and how to run them.
//!
//! A registry is built once, then shared read-only (typically behind an
//! `Arc`) by any number of concurrent completion loops.

use super::traits::{Tool, ToolBinding, ToolOutput, ToolSpec};
use crate::error::{Error, Result};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which registered tools to advertise for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ToolSelection {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

impl ToolSelection {
    pub fn allows(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.iter().any(|n| n == name),
            Self::Except(names) => !names.iter().any(|n| n == name),
        }
    }
}

struct Entry {
    spec: ToolSpec,
    binding: Arc<dyn ToolBinding>,
}

/// Ordered set of tools keyed by name.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool under `spec.name`.
    pub fn register(&mut self, spec: ToolSpec, binding: Arc<dyn ToolBinding>) -> Result<()> {
        if self.entry(&spec.name).is_some() {
            return Err(Error::DuplicateTool { name: spec.name });
        }
        debug!("Registered tool '{}'", spec.name);
        self.entries.push(Entry { spec, binding });
        Ok(())
    }

    /// Register a tool that carries its own spec.
    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let spec = tool.spec();
        self.register(spec, Arc::new(tool))
    }

    /// Specs to advertise for a request, in registration order.
    pub fn schema_for(&self, selection: &ToolSelection) -> Vec<&ToolSpec> {
        self.entries
            .iter()
            .map(|e| &e.spec)
            .filter(|s| selection.allows(&s.name))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.entry(name).map(|e| &e.spec)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.spec.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.spec.name == name)
    }

    /// Run the tool `name` with JSON-encoded `arguments`.
    ///
    /// Argument problems are returned as errors and the binding is not called.
    /// Once the binding runs, its failures (including panics) come back as a
    /// failed [`ToolOutput`] reading `"Error: <message>"`.
    pub async fn invoke(&self, name: &str, arguments: &str) -> Result<ToolOutput> {
        let entry = self.entry(name).ok_or_else(|| Error::UnknownTool {
            name: name.to_string(),
        })?;

        let args = parse_arguments(name, arguments)?;
        if let Some(missing) = entry.spec.required.iter().find(|p| !args.contains_key(*p)) {
            return Err(Error::MissingRequiredParameter {
                tool: name.to_string(),
                param: missing.clone(),
            });
        }

        let binding = entry.binding.clone();
        let handle = tokio::spawn(async move { binding.call(args).await });
        let output = match handle.await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => ToolOutput::failure(format!("Error: {}", e)),
            Err(join) if join.is_panic() => {
                let payload = join.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool panicked".to_string());
                ToolOutput::failure(format!("Error: {}", message))
            }
            Err(join) => ToolOutput::failure(format!("Error: {}", join)),
        };

        if !output.success {
            warn!("Tool '{}' failed: {}", name, output.text);
        }
        Ok(output)
    }
}

/// Parse tool arguments; a blank string is an empty object.
fn parse_arguments(tool: &str, arguments: &str) -> Result<Map<String, Value>> {
    if arguments.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::MalformedArguments {
            tool: tool.to_string(),
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
        }),
        Err(e) => Err(Error::MalformedArguments {
            tool: tool.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
