//! `images/generations`.

use super::transport::IMAGES_GENERATIONS;
use super::CablyClient;
use crate::error::Result;
use crate::types::ImageGeneration;
use serde::Serialize;
use tracing::debug;

/// Image generation request. Defaults: one 1024x1024 image as a URL from
/// `flux-realism`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub response_format: String,
    pub model: String,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            n: 1,
            size: "1024x1024".into(),
            response_format: "url".into(),
            model: "flux-realism".into(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_count(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

impl CablyClient {
    /// Generate images for a prompt.
    pub async fn generate_images(&self, request: &ImageRequest) -> Result<ImageGeneration> {
        debug!("Image generation with model: {} (n={})", request.model, request.n);
        let payload = serde_json::to_value(request)?;
        let body = self.transport().post_json(IMAGES_GENERATIONS, &payload).await?;
        ImageGeneration::from_json(&body)
    }
}
