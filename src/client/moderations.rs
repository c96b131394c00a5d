//! `moderations`.

use super::transport::MODERATIONS;
use super::CablyClient;
use crate::error::Result;
use crate::types::ModerationResponse;
use serde_json::{json, Value};
use tracing::debug;

impl CablyClient {
    /// Classify `input`, a string or an array of strings.
    pub async fn moderate(&self, model: &str, input: impl Into<Value>) -> Result<ModerationResponse> {
        debug!("Moderation with model: {}", model);
        let payload = json!({ "model": model, "input": input.into() });
        let body = self.transport().post_json(MODERATIONS, &payload).await?;
        ModerationResponse::from_json(&body)
    }
}
