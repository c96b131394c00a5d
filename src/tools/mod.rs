pub mod fetch;
pub mod registry;
pub mod search;
pub mod traits;

pub use fetch::{FetchTool, HtmlBlocks, TextExtractor};
pub use registry::{ToolRegistry, ToolSelection};
pub use search::{DuckDuckGo, SearchBackend, SearchTool};
pub use traits::{FunctionBinding, Tool, ToolBinding, ToolOutput, ToolSpec};

use crate::config::ClientConfig;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Registry holding the built-in `search` and `fetch` tools.
pub fn builtin_registry(config: &ClientConfig) -> Result<ToolRegistry> {
    let timeout = Duration::from_secs(config.fetch_timeout_secs);
    let mut registry = ToolRegistry::new();
    registry.register_tool(SearchTool::new(Arc::new(DuckDuckGo::new(timeout)?)))?;
    registry.register_tool(FetchTool::new(timeout)?)?;
    Ok(registry)
}
