//! Reasoner backed by the Anthropic Messages API.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::Reasoner;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Reasoner calling the Anthropic Messages API directly.
#[derive(Debug, Clone)]
pub struct AnthropicApiReasoner {
    api_url: String,
    api_key: String,
    model: String,
    http_client: reqwest::Client,
}

impl AnthropicApiReasoner {
    /// Create a client for `api_url` authenticated with `api_key`.
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> DomainResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            api_url: api_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            http_client,
        })
    }
}

/// Join the text blocks of a Messages API response.
fn extract_text(body: &serde_json::Value) -> String {
    body["content"]
        .as_array()
        .map(|blocks| {
            blocks
                .iter()
                .filter(|block| block["type"].as_str() == Some("text"))
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

#[async_trait]
impl Reasoner for AnthropicApiReasoner {
    fn name(&self) -> &'static str {
        "anthropic-api"
    }

    async fn complete(&self, prompt: &str) -> DomainResult<String> {
        let request_body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}]
        });

        let response = self
            .http_client
            .post(&self.api_url)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| DomainError::Reasoning(format!("API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::Reasoning(format!("Anthropic API error {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DomainError::Reasoning(format!("failed to parse API response: {e}")))?;

        let text = extract_text(&body);
        if text.trim().is_empty() {
            return Err(DomainError::Reasoning("API returned no text content".to_string()));
        }
        Ok(text)
    }
}
