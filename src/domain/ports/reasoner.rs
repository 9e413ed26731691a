//! Reasoning service port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// A single-shot call to an external language model.
#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return the model's text response to `prompt`.
    async fn complete(&self, prompt: &str) -> DomainResult<String>;
}
