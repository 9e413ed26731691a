//! Reasoners that never call a model.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::Reasoner;

/// The `none` backend: every call fails, so callers take their fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledReasoner;

#[async_trait]
impl Reasoner for DisabledReasoner {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn complete(&self, _prompt: &str) -> DomainResult<String> {
        Err(DomainError::Reasoning("reasoning backend is disabled".to_string()))
    }
}

/// Replays queued responses in order and records every prompt.
///
/// Once the queue is empty every call fails.
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    responses: Mutex<VecDeque<DomainResult<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedReasoner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful response.
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.push(Ok(response.into()));
        self
    }

    /// Queue a failed call.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push(Err(DomainError::Reasoning(message.into())));
        self
    }

    fn push(&self, response: DomainResult<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(response);
        }
    }

    /// Prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> DomainResult<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front())
            .unwrap_or_else(|| Err(DomainError::Reasoning("no scripted response left".to_string())))
    }
}
