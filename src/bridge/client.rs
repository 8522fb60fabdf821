//! HTTP client for the browser bridge
//!
//! The bridge is a small HTTP server relaying commands to a browser extension:
//! - `POST /command` with `{"action", "params"}`, answered with
//!   `{"success", "result", "error"}`
//! - `GET /health`
//!
//! Requests answered with 500, 502 or 503, and requests that cannot connect,
//! are retried with a growing backoff (1 s, then 2 s).

use crate::config::BridgeSettings;
use crate::crawler::{ReadyState, RenderError, RenderResult, Renderer, TabAllocator};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Statuses worth another attempt
const RETRY_STATUSES: [StatusCode; 3] = [
    StatusCode::INTERNAL_SERVER_ERROR,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
];

/// Documents at least this long are read back in chunks
const HTML_CHUNK_THRESHOLD: u64 = 800_000;
const HTML_CHUNK_SIZE: u64 = 500_000;

const READY_STATE_SCRIPT: &str = "document.readyState";
const HTML_SCRIPT: &str = "document.documentElement.outerHTML";
const HTML_LENGTH_SCRIPT: &str = "document.documentElement.outerHTML.length";
const LINKS_SCRIPT: &str = "[...document.querySelectorAll('a[href]')].map(a => a.href)";

#[derive(Debug, Deserialize)]
struct CommandResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Connection to the bridge server
#[derive(Debug, Clone)]
pub struct BridgeClient {
    http: Client,
    base_url: String,
    attempts: u32,
    backoff: Duration,
}

impl BridgeClient {
    /// Builds a client from bridge settings
    ///
    /// # Returns
    ///
    /// * `Ok(BridgeClient)` - Ready to send commands
    /// * `Err(RenderError)` - The HTTP client could not be built
    pub fn new(settings: &BridgeSettings) -> RenderResult<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RenderError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: settings.url.trim_end_matches('/').to_string(),
            attempts: settings.retries.max(1),
            backoff: Duration::from_secs(1),
        })
    }

    /// Replaces the base retry backoff (1 s by default)
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the bridge answers `GET /health`
    pub async fn health(&self) -> RenderResult<Value> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RenderError::Transport(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(RenderError::Transport(format!(
                "{} answered {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))
    }

    /// Sends one command and returns its `result`
    ///
    /// # Arguments
    ///
    /// * `action` - Command name (`new_tab`, `navigate`, `evaluate`, ...)
    /// * `params` - Command parameters as a JSON object
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The `result` field of a successful answer
    /// * `Err(RenderError::Command)` - The bridge reported a failure
    /// * `Err(RenderError)` - Transport or decoding failure
    pub async fn send_command(&self, action: &str, params: Value) -> RenderResult<Value> {
        let body = json!({ "action": action, "params": params });
        let response = self.post_with_retry(&body).await?;

        let answer: CommandResponse = response
            .json()
            .await
            .map_err(|e| RenderError::Protocol(format!("{}: {}", action, e)))?;

        if answer.success {
            Ok(answer.result)
        } else {
            Err(RenderError::Command {
                action: action.to_string(),
                message: answer.error.unwrap_or_else(|| "Unknown error".to_string()),
            })
        }
    }

    /// Evaluates a script in a tab and returns its value
    pub async fn evaluate(&self, tab_id: i64, expression: &str) -> RenderResult<Value> {
        let result = self
            .send_command(
                "evaluate",
                json!({ "tabId": tab_id, "expression": expression }),
            )
            .await?;

        Ok(evaluation_value(result))
    }

    async fn post_with_retry(&self, body: &Value) -> RenderResult<reqwest::Response> {
        let url = format!("{}/command", self.base_url);

        for attempt in 0..self.attempts {
            let last = attempt + 1 == self.attempts;

            match self.http.post(&url).json(body).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if !last && RETRY_STATUSES.contains(&response.status()) => {
                    tracing::debug!("Bridge answered {}, retrying", response.status());
                }
                Ok(response) => {
                    return Err(RenderError::Transport(format!(
                        "{} answered {}",
                        url,
                        response.status()
                    )))
                }
                Err(e) if !last && (e.is_connect() || e.is_timeout()) => {
                    tracing::debug!("Bridge request failed, retrying: {}", e);
                }
                Err(e) => return Err(RenderError::Transport(format!("{}: {}", url, e))),
            }

            tokio::time::sleep(self.backoff * (attempt + 1)).await;
        }

        Err(RenderError::Transport(format!("{}: no attempt made", url)))
    }
}

/// Unwraps the `value` of an evaluation result
///
/// Objects without a `value` field evaluate to null; anything else is
/// returned as is.
fn evaluation_value(result: Value) -> Value {
    match result {
        Value::Object(mut map) => map.remove("value").unwrap_or(Value::Null),
        other => other,
    }
}

/// Reads a tab id that the bridge may send as a number or a string
fn parse_tab_id(result: &Value) -> Option<i64> {
    match result.get("tabId")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn expect_string(value: Value, what: &str) -> RenderResult<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(RenderError::Protocol(format!(
            "{}: expected a string, got {}",
            what, other
        ))),
    }
}

/// One bridge tab driven as a `Renderer`
#[derive(Debug)]
pub struct BridgeRenderer {
    client: BridgeClient,
    tab_id: i64,
}

impl BridgeRenderer {
    pub fn new(client: BridgeClient, tab_id: i64) -> Self {
        Self { client, tab_id }
    }

    pub fn tab_id(&self) -> i64 {
        self.tab_id
    }

    /// Reads a large document in slices through a page-side variable
    async fn chunked_html(&self) -> RenderResult<String> {
        self.client
            .evaluate(self.tab_id, "void(window._html = document.documentElement.outerHTML)")
            .await?;

        let total = self
            .client
            .evaluate(self.tab_id, "window._html.length")
            .await?
            .as_u64()
            .ok_or_else(|| RenderError::Protocol("document length is not a number".to_string()))?;

        let mut html = String::with_capacity(total as usize);
        let mut offset = 0;
        while offset < total {
            let script = format!(
                "window._html.substring({}, {})",
                offset,
                offset + HTML_CHUNK_SIZE
            );
            let chunk = self.client.evaluate(self.tab_id, &script).await?;
            html.push_str(&expect_string(chunk, "document chunk")?);
            offset += HTML_CHUNK_SIZE;
        }

        if let Err(e) = self.client.evaluate(self.tab_id, "delete window._html").await {
            tracing::debug!("Could not clear page-side copy: {}", e);
        }

        Ok(html)
    }
}

#[async_trait]
impl Renderer for BridgeRenderer {
    async fn navigate(&mut self, url: &str) -> RenderResult<()> {
        self.client
            .send_command("navigate", json!({ "tabId": self.tab_id, "url": url }))
            .await?;
        Ok(())
    }

    async fn ready_state(&mut self) -> RenderResult<ReadyState> {
        let value = self.client.evaluate(self.tab_id, READY_STATE_SCRIPT).await?;
        Ok(ReadyState::from_value(value.as_str().unwrap_or_default()))
    }

    async fn html(&mut self) -> RenderResult<String> {
        let length = self
            .client
            .evaluate(self.tab_id, HTML_LENGTH_SCRIPT)
            .await?
            .as_u64()
            .unwrap_or(0);

        if length >= HTML_CHUNK_THRESHOLD {
            return self.chunked_html().await;
        }

        let value = self.client.evaluate(self.tab_id, HTML_SCRIPT).await?;
        expect_string(value, "document")
    }

    async fn links(&mut self) -> RenderResult<Vec<String>> {
        match self.client.evaluate(self.tab_id, LINKS_SCRIPT).await? {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect()),
            Value::Null => Ok(Vec::new()),
            other => Err(RenderError::Protocol(format!(
                "anchor list: expected an array, got {}",
                other
            ))),
        }
    }
}

/// Opens one bridge tab per domain and closes it on release
#[derive(Debug)]
pub struct BridgeTabAllocator {
    client: BridgeClient,
    agent_id: Option<String>,
    tabs: Mutex<HashMap<String, i64>>,
}

impl BridgeTabAllocator {
    /// Creates an allocator; `agent_id` only labels the tabs in logs
    pub fn new(client: BridgeClient, agent_id: Option<String>) -> Self {
        Self {
            client,
            agent_id,
            tabs: Mutex::new(HashMap::new()),
        }
    }

    fn agent_label(&self) -> &str {
        self.agent_id.as_deref().unwrap_or("-")
    }

    /// Number of tabs currently held
    pub fn open_tabs(&self) -> usize {
        self.tabs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl TabAllocator for BridgeTabAllocator {
    async fn allocate(&self, domain: &str) -> RenderResult<Box<dyn Renderer>> {
        let allocation_error = |message: String| RenderError::Allocation {
            domain: domain.to_string(),
            message,
        };

        let result = self
            .client
            .send_command("new_tab", json!({ "url": "about:blank" }))
            .await
            .map_err(|e| allocation_error(e.to_string()))?;

        let tab_id = parse_tab_id(&result)
            .ok_or_else(|| allocation_error(format!("no tab id in {}", result)))?;

        tracing::info!("Agent {}: tab {} opened for {}", self.agent_label(), tab_id, domain);
        self.tabs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(domain.to_string(), tab_id);

        Ok(Box::new(BridgeRenderer::new(self.client.clone(), tab_id)))
    }

    async fn release(&self, domain: &str, renderer: Box<dyn Renderer>) {
        drop(renderer);

        let tab_id = self
            .tabs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(domain);

        let Some(tab_id) = tab_id else {
            return;
        };

        match self
            .client
            .send_command("close_tab", json!({ "tabId": tab_id }))
            .await
        {
            Ok(_) => tracing::debug!("Agent {}: tab {} closed", self.agent_label(), tab_id),
            Err(e) => tracing::warn!("Could not close tab {} of {}: {}", tab_id, domain, e),
        }
    }
}
