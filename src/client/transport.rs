//! Authenticated HTTP transport to the CablyAI backend.
//!
//! One POST per call, bearer-authenticated, never retried. JSON endpoints
//! return the decoded body; `audio/speech` returns raw bytes.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const CHAT_COMPLETIONS: &str = "chat/completions";
pub const IMAGES_GENERATIONS: &str = "images/generations";
pub const AUDIO_TRANSCRIPTIONS: &str = "audio/transcriptions";
pub const AUDIO_SPEECH: &str = "audio/speech";
pub const MODERATIONS: &str = "moderations";

/// A file sent as the `file` part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

impl FileUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read a file from disk, naming the part after the file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Ok(Self::new(file_name, bytes))
    }
}

/// Backend transport. Implemented over HTTP by [`HttpTransport`]; tests
/// substitute scripted implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON payload and decode the JSON response.
    async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value>;

    /// POST form fields plus one file part and decode the JSON response.
    async fn post_multipart(
        &self,
        endpoint: &str,
        fields: Vec<(String, String)>,
        file: FileUpload,
    ) -> Result<Value>;

    /// POST a JSON payload and return the raw response body.
    async fn post_bytes(&self, endpoint: &str, payload: &Value) -> Result<Vec<u8>>;
}

/// Transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given per-request timeout.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::setup)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Turn a non-2xx response into [`Error::Transport`].
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Transport {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode(resp: reqwest::Response) -> Result<Value> {
        let body = Self::check(resp).await?.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| Error::malformed(format!("response is not JSON: {e}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value> {
        debug!("POST {}", endpoint);
        let resp = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_multipart(
        &self,
        endpoint: &str,
        fields: Vec<(String, String)>,
        file: FileUpload,
    ) -> Result<Value> {
        debug!("POST {} (multipart, {} bytes)", endpoint, file.bytes.len());

        let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(mime) = file.mime_type {
            part = part
                .mime_str(&mime)
                .map_err(|e| Error::setup(format!("invalid mime type '{mime}': {e}")))?;
        }
        let form = fields
            .into_iter()
            .fold(reqwest::multipart::Form::new(), |form, (k, v)| form.text(k, v))
            .part("file", part);

        let resp = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_bytes(&self, endpoint: &str, payload: &Value) -> Result<Vec<u8>> {
        debug!("POST {} (binary response)", endpoint);
        let resp = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        let bytes = Self::check(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
