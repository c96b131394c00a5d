//! CablyAI API client.

pub mod audio;
pub mod chat;
pub mod images;
pub mod moderations;
pub mod transport;

pub use audio::SpeechRequest;
pub use chat::ChatRequest;
pub use images::ImageRequest;
pub use transport::{FileUpload, HttpTransport, Transport};

use crate::agent::{LoopOptions, ToolLoop};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::tools::ToolRegistry;
use std::sync::Arc;

/// Entry point for every endpoint. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct CablyClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for CablyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CablyClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl CablyClient {
    /// Client against the default endpoint with `api_key`.
    pub fn new(api_key: &str) -> Result<Self> {
        Self::from_config(ClientConfig {
            api_key: api_key.to_string(),
            ..ClientConfig::default()
        })
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Client over a caller-supplied transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// A tool-augmented completion loop over this client's transport, with
    /// the allow-list and iteration cap taken from the config.
    pub fn tool_loop(&self, registry: Arc<ToolRegistry>) -> ToolLoop {
        ToolLoop::new(
            self.transport.clone(),
            registry,
            LoopOptions::from_config(&self.config),
        )
    }
}
