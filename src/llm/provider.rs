use async_trait::async_trait;

use super::types::CompletionRequest;
use crate::core::errors::Result;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "ollama", "gemini", "openrouter").
    fn name(&self) -> &str;

    /// Text completion. Implementations must enforce a hard deadline
    /// and fail with `ProviderTimeout` rather than hanging the caller.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}
