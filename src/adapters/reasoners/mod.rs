//! Reasoning service adapters.

pub mod anthropic_api;
pub mod claude_cli;
pub mod scripted;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ReasoningConfig;
use crate::domain::ports::Reasoner;
use crate::services::RetryPolicy;

pub use anthropic_api::AnthropicApiReasoner;
pub use claude_cli::ClaudeCliReasoner;
pub use scripted::{DisabledReasoner, ScriptedReasoner};

/// Names accepted for `reasoning.backend`.
pub const AVAILABLE_BACKENDS: &[&str] = &["claude-cli", "anthropic-api", "none"];

/// Wraps a reasoner with a retry policy.
pub struct RetryingReasoner {
    inner: Arc<dyn Reasoner>,
    policy: RetryPolicy,
}

impl RetryingReasoner {
    pub fn new(inner: Arc<dyn Reasoner>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Reasoner for RetryingReasoner {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn complete(&self, prompt: &str) -> DomainResult<String> {
        self.policy.execute(|| self.inner.complete(prompt)).await
    }
}

/// Build the configured reasoner, retries included.
pub fn create_reasoner(config: &ReasoningConfig) -> DomainResult<Arc<dyn Reasoner>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let inner: Arc<dyn Reasoner> = match config.backend.as_str() {
        "claude-cli" => Arc::new(ClaudeCliReasoner::new(
            config.claude_path.clone(),
            Some(config.model.clone()),
            timeout,
        )),
        "anthropic-api" => {
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .ok_or_else(|| {
                    DomainError::ValidationFailed(
                        "anthropic-api backend needs reasoning.api_key or ANTHROPIC_API_KEY".to_string(),
                    )
                })?;
            Arc::new(AnthropicApiReasoner::new(
                config.api_url.clone(),
                api_key,
                config.model.clone(),
                timeout,
            )?)
        }
        "none" => return Ok(Arc::new(DisabledReasoner)),
        other => {
            return Err(DomainError::ValidationFailed(format!(
                "unknown reasoning backend '{other}' (expected one of: {})",
                AVAILABLE_BACKENDS.join(", ")
            )))
        }
    };
    Ok(Arc::new(RetryingReasoner::new(inner, RetryPolicy::from(config))))
}
