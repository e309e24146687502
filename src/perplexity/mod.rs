pub mod types;

use reqwest::Url;
use serde_json::Value;
use std::fmt::Display;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{IntoMcpError, McpError, McpResult};
use crate::proxy::HttpClients;

pub use types::{CompletionRequest, CompletionResponse, CompletionResult, Message, Model};

const COMPLETIONS_PATH: &str = "/chat/completions";

/// Thin client for the Perplexity chat-completions endpoint.
pub struct PerplexityClient {
    http: HttpClients,
    endpoint: String,
    api_key: String,
}

impl PerplexityClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = HttpClients::new(config.proxy.clone(), &config.connection)?;
        let endpoint = format!(
            "{}{}",
            config.perplexity.base_url.trim_end_matches('/'),
            COMPLETIONS_PATH
        );

        Ok(Self {
            http,
            endpoint,
            api_key: config.perplexity.api_key.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn http(&self) -> &HttpClients {
        &self.http
    }

    /// Send a single completion request. No retries.
    pub async fn chat_completion(&self, request: &CompletionRequest) -> McpResult<CompletionResult> {
        let url = Url::parse(&self.endpoint).map_err(|e| {
            McpError::RequestSetup(format!("invalid endpoint '{}': {}", self.endpoint, e))
        })?;
        let host = url.host_str().ok_or_else(|| {
            McpError::RequestSetup(format!("endpoint '{}' has no host", self.endpoint))
        })?;
        let client = self.http.client_for(host)?;

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );

        let response = client
            .post(url.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Api {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: error_body(response.text().await),
            });
        }

        let body: CompletionResponse = response
            .json()
            .await
            .mcp_context("Failed to decode Perplexity API response")?;

        CompletionResult::try_from(body)
    }
}

/// Body text for an `Api` error. A body that cannot be read is logged and
/// described in place so the status still reaches the caller.
fn error_body<E: Display>(body: Result<String, E>) -> String {
    match body {
        Ok(body) => compact_body(body),
        Err(e) => {
            warn!("Failed to read error response body: {}", e);
            format!("<failed to read response body: {}>", e)
        }
    }
}

/// JSON error bodies are re-serialized compactly; anything else passes through.
fn compact_body(body: String) -> String {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) => value.to_string(),
        Err(_) => body,
    }
}
