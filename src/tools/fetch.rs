//! `fetch` tool: download a page and return a window of its text blocks.

use super::traits::{str_arg, Tool, ToolBinding, ToolOutput, ToolSpec};
use crate::error::{Error, Result};
use anyhow::bail;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Returned verbatim for any non-200 response.
pub const FETCH_FAILED: &str = "Failed to retrieve the webpage.";

/// Default `[start, end)` block window.
pub const DEFAULT_WINDOW: (i64, i64) = (0, 7);

/// Default timeout for page downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p";

/// Splits an HTML document into text blocks, in document order.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, html: &str) -> Vec<String>;
}

/// Heading and paragraph text. Runs of whitespace inside a block, including
/// the newlines and indentation of the source markup, become single spaces.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlBlocks;

impl TextExtractor for HtmlBlocks {
    fn extract(&self, html: &str) -> Vec<String> {
        let Ok(selector) = Selector::parse(BLOCK_SELECTOR) else {
            return Vec::new();
        };
        Html::parse_document(html)
            .select(&selector)
            .map(|el| el.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
            .collect()
    }
}

/// The built-in `fetch` tool.
pub struct FetchTool {
    http: reqwest::Client,
    extractor: Arc<dyn TextExtractor>,
}

impl FetchTool {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self::with_extractor(
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(Error::setup)?,
            Arc::new(HtmlBlocks),
        ))
    }

    pub fn with_extractor(http: reqwest::Client, extractor: Arc<dyn TextExtractor>) -> Self {
        Self { http, extractor }
    }

    async fn download(&self, url: &str) -> std::result::Result<String, String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Failed to retrieve the webpage: {}", e))?;
        if resp.status() != reqwest::StatusCode::OK {
            debug!("fetch {} -> HTTP {}", url, resp.status().as_u16());
            return Err(FETCH_FAILED.to_string());
        }
        resp.text()
            .await
            .map_err(|e| format!("Failed to read the webpage: {}", e))
    }
}

#[async_trait]
impl ToolBinding for FetchTool {
    async fn call(&self, args: Map<String, Value>) -> anyhow::Result<ToolOutput> {
        let url = str_arg(&args, "url")?;
        let (start, end) = window_arg(&args)?;
        debug!("fetch: {} [{}, {})", url, start, end);

        let body = match self.download(url).await {
            Ok(body) => body,
            Err(message) => return Ok(ToolOutput::failure(message)),
        };

        let blocks = self.extractor.extract(&body);
        let (lo, hi) = slice_bounds(blocks.len(), start, end);
        Ok(ToolOutput::success(format!(
            "Chunks {} - {}:\n{}",
            start,
            end,
            blocks[lo..hi].join(" ")
        )))
    }
}

impl Tool for FetchTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "fetch",
            "Fetch a web page and return the text of its headings and paragraphs. \
             Use `index` to page through the text blocks.",
            json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL to fetch"
                    },
                    "index": {
                        "type": "array",
                        "items": {"type": "integer"},
                        "minItems": 2,
                        "maxItems": 2,
                        "default": [DEFAULT_WINDOW.0, DEFAULT_WINDOW.1],
                        "description": "Half-open [start, end) range of text blocks to return"
                    }
                },
                "required": ["url"]
            }),
        )
    }
}

/// Read the optional `index` pair.
fn window_arg(args: &Map<String, Value>) -> anyhow::Result<(i64, i64)> {
    match args.get("index") {
        None | Some(Value::Null) => Ok(DEFAULT_WINDOW),
        Some(Value::Array(pair)) => match pair.as_slice() {
            [a, b] => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => Ok((a, b)),
                _ => bail!("'index' must be a pair of integers"),
            },
            _ => bail!("'index' must be a pair of integers"),
        },
        Some(_) => bail!("'index' must be a pair of integers"),
    }
}

/// Clamp a `[start, end)` window to `len`, counting negative bounds from the end.
fn slice_bounds(len: usize, start: i64, end: i64) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        let len = len as i64;
        let i = if i < 0 { i + len } else { i };
        i.clamp(0, len) as usize
    };
    let (lo, hi) = (clamp(start), clamp(end));
    (lo, hi.max(lo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ten_paragraphs() -> String {
        let body: String = (0..10).map(|i| format!("<p>Paragraph {i}</p>")).collect();
        format!("<html><head><title>t</title></head><body>{body}</body></html>")
    }

    fn args(url: String, index: Option<Value>) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("url".into(), Value::String(url));
        if let Some(index) = index {
            args.insert("index".into(), index);
        }
        args
    }

    async fn serve(status: u16, body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(status).set_body_raw(body.into_bytes(), "text/html"),
            )
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn extracts_headings_and_paragraphs_in_order() {
        let html = r#"
            <html><body>
              <nav>skip me</nav>
              <h1>Title</h1>
              <p>First   paragraph
                 with <b>bold</b> text.</p>
              <div>not a block</div>
              <h3>Section</h3>
            </body></html>
        "#;
        assert_eq!(
            HtmlBlocks.extract(html),
            vec!["Title", "First paragraph with bold text.", "Section"]
        );
    }

    #[test]
    fn window_is_clamped() {
        assert_eq!(slice_bounds(10, 2, 5), (2, 5));
        assert_eq!(slice_bounds(3, 0, 7), (0, 3));
        assert_eq!(slice_bounds(3, 5, 9), (3, 3));
        assert_eq!(slice_bounds(10, 6, 2), (6, 6));
        assert_eq!(slice_bounds(10, -3, 10), (7, 10));
    }

    #[tokio::test]
    async fn returns_requested_window() {
        let server = serve(200, ten_paragraphs()).await;
        let tool = FetchTool::new(DEFAULT_TIMEOUT).unwrap();

        let output = tool
            .call(args(format!("{}/page", server.uri()), Some(json!([2, 5]))))
            .await
            .unwrap();

        assert!(output.success);
        assert_eq!(output.text, "Chunks 2 - 5:\nParagraph 2 Paragraph 3 Paragraph 4");
    }

    #[tokio::test]
    async fn default_window_tolerates_short_pages() {
        let server = serve(200, "<p>only</p><h2>two</h2>".to_string()).await;
        let tool = FetchTool::new(DEFAULT_TIMEOUT).unwrap();

        let output = tool
            .call(args(format!("{}/page", server.uri()), None))
            .await
            .unwrap();

        assert_eq!(output.text, "Chunks 0 - 7:\nonly two");
    }

    #[tokio::test]
    async fn not_found_returns_literal_failure() {
        let server = serve(404, "missing".to_string()).await;
        let tool = FetchTool::new(DEFAULT_TIMEOUT).unwrap();

        let output = tool
            .call(args(format!("{}/page", server.uri()), None))
            .await
            .unwrap();

        assert_eq!(output, ToolOutput::failure(FETCH_FAILED));
    }

    #[tokio::test]
    async fn unreachable_host_is_text() {
        let tool = FetchTool::new(Duration::from_secs(1)).unwrap();
        let output = tool
            .call(args("http://127.0.0.1:9/".to_string(), None))
            .await
            .unwrap();

        assert!(!output.success);
        assert!(output.text.starts_with("Failed to retrieve the webpage"));
    }

    #[tokio::test]
    async fn slow_page_times_out_as_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(ten_paragraphs().into_bytes(), "text/html")
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;
        let tool = FetchTool::new(Duration::from_secs(1)).unwrap();

        let output = tool
            .call(args(format!("{}/page", server.uri()), None))
            .await
            .unwrap();

        assert!(!output.success);
        assert!(
            output.text.starts_with("Failed to retrieve the webpage:"),
            "{}",
            output.text
        );
    }

    #[tokio::test]
    async fn bad_index_is_an_error() {
        let tool = FetchTool::new(DEFAULT_TIMEOUT).unwrap();
        let err = tool
            .call(args("https://example.com".to_string(), Some(json!([1]))))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "'index' must be a pair of integers");
    }
}
