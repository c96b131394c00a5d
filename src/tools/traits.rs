//! Tool declaration and binding traits.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Definition of a tool advertised to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments object.
    pub parameters: Value,
    /// Argument names that must be present before the tool is called.
    pub required: BTreeSet<String>,
}

impl ToolSpec {
    /// Build a spec, taking the required set from the schema's `required` list.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        let required = parameters
            .get("required")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            required,
        }
    }
}

/// Text produced by a tool, tagged with whether the tool succeeded.
///
/// Tools never return structured results; the text is what lands in the
/// tool-role message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub text: String,
    pub success: bool,
}

impl ToolOutput {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: false,
        }
    }
}

/// The executable half of a tool.
///
/// An `Err` (or a panic) is caught by the registry and reported in-band as
/// `"Error: <message>"`.
#[async_trait]
pub trait ToolBinding: Send + Sync {
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<ToolOutput>;
}

/// A binding that knows its own spec.
pub trait Tool: ToolBinding {
    fn spec(&self) -> ToolSpec;
}

/// Adapts a synchronous closure returning text into a [`ToolBinding`].
pub struct FunctionBinding<F>(F);

impl<F> FunctionBinding<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<String> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ToolBinding for FunctionBinding<F>
where
    F: Fn(Map<String, Value>) -> anyhow::Result<String> + Send + Sync,
{
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<ToolOutput> {
        (self.0)(args).map(ToolOutput::success)
    }
}

/// Fetch a string argument, failing with a readable message.
pub(crate) fn str_arg<'a>(args: &'a Map<String, Value>, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("'{}' must be a string", key))
}
