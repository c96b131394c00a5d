//! Error taxonomy for the client and the tool-augmented completion loop.
//!
//! Transport and response-shape errors propagate to the caller. Tool
//! invocation errors are surfaced by [`ToolRegistry::invoke`] but the
//! completion loop turns them into tool-role messages instead of failing.
//!
//! [`ToolRegistry::invoke`]: crate::tools::ToolRegistry::invoke

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Non-2xx HTTP response from the backend.
    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// Connection-level failure (DNS, TLS, timeout, reset).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend answered, but not with the shape we expected.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The model is not on the tool-calling allow-list. No request was sent.
    #[error("model '{model}' is not allow-listed for tool calling")]
    UnsupportedModel { model: String },

    #[error("tool '{name}' is already registered")]
    DuplicateTool { name: String },

    #[error("unknown tool: {name}")]
    UnknownTool { name: String },

    /// Tool arguments were not valid JSON, or not a JSON object.
    #[error("malformed arguments for tool '{tool}': {reason}")]
    MalformedArguments { tool: String, reason: String },

    #[error("missing required parameter '{param}' for tool '{tool}'")]
    MissingRequiredParameter { tool: String, param: String },

    /// The loop issued `iterations` requests without reaching a textual answer.
    #[error("completion loop exceeded {iterations} iterations without a final answer")]
    LoopExceeded { iterations: u32 },

    #[error("completion loop cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A request or HTTP client could not be set up locally. Nothing was sent.
    #[error("client setup error: {0}")]
    Setup(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse(reason.into())
    }

    pub(crate) fn setup(reason: impl std::fmt::Display) -> Self {
        Self::Setup(reason.to_string())
    }

    /// HTTP status for [`Error::Transport`], if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedResponse(e.to_string())
    }
}
