//! `search` tool: web search returning a list of result URLs.

use super::traits::{str_arg, Tool, ToolBinding, ToolOutput, ToolSpec};
use crate::error::{Error, Result};
use anyhow::{bail, Context};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DUCKDUCKGO_HTML: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 10;
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) cablyai/0.1";

/// A web search capability returning result URLs in rank order.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<String>>;
}

/// Scrapes DuckDuckGo's HTML endpoint.
#[derive(Debug, Clone)]
pub struct DuckDuckGo {
    endpoint: String,
    http: reqwest::Client,
}

impl DuckDuckGo {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(Error::setup)?;
        Ok(Self {
            endpoint: DUCKDUCKGO_HTML.to_string(),
            http,
        })
    }

    /// Point at a different results page (used by tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGo {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<String>> {
        let resp = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .context("search request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("search returned HTTP {}", status.as_u16());
        }

        let body = resp.text().await.context("failed to read search results")?;
        Ok(result_links(&body))
    }
}

/// Pull result URLs out of a DuckDuckGo results page.
fn result_links(html: &str) -> Vec<String> {
    let Ok(selector) = Selector::parse("a.result__a") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut links: Vec<String> = Vec::new();
    for href in document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
    {
        if let Some(url) = resolve_redirect(href) {
            if !links.contains(&url) {
                links.push(url);
            }
        }
        if links.len() == MAX_RESULTS {
            break;
        }
    }
    links
}

/// Result anchors go through `//duckduckgo.com/l/?uddg=<target>`; unwrap it.
fn resolve_redirect(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };
    let parsed = url::Url::parse(&absolute).ok()?;

    if let Some((_, target)) = parsed.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }
    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}

/// The built-in `search` tool.
pub struct SearchTool {
    backend: Arc<dyn SearchBackend>,
}

impl SearchTool {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ToolBinding for SearchTool {
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let query = str_arg(&args, "query")?;
        debug!("search: {}", query);

        Ok(match self.backend.search(query).await {
            Ok(urls) if urls.is_empty() => ToolOutput::success("No results found."),
            Ok(urls) => ToolOutput::success(urls.join("\n")),
            Err(e) => ToolOutput::failure(format!("Search failed: {:#}", e)),
        })
    }
}

impl Tool for SearchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "search",
            "Search the web and return a list of result URLs.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query"
                    }
                },
                "required": ["query"]
            }),
        )
    }
}
