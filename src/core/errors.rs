use thiserror::Error;

/// Error taxonomy for the knowledge core.
///
/// Transient classes (`EmbeddingUnavailable`, `ProviderTimeout`,
/// `SearchUnavailable`) are eligible for one bounded retry before being
/// surfaced as `RetrievalFailed`. `ContentAcquisition` and
/// `PlaceholderContent` advance the summarization fallback chain rather
/// than aborting it.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),
    #[error("provider '{provider}' timed out after {seconds}s")]
    ProviderTimeout { provider: String, seconds: u64 },
    #[error("vector search unavailable: {0}")]
    SearchUnavailable(String),
    #[error("retrieval failed: {0}")]
    RetrievalFailed(String),
    #[error("content acquisition failed: {0}")]
    ContentAcquisition(String),
    #[error("placeholder content detected")]
    PlaceholderContent,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        CoreError::Internal(err.to_string())
    }

    /// Whether one bounded retry with backoff is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::EmbeddingUnavailable(_)
                | CoreError::ProviderTimeout { .. }
                | CoreError::SearchUnavailable(_)
        )
    }

    /// Plain-language message suitable for end users. Raw error chains
    /// stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(msg) => msg.clone(),
            CoreError::EmbeddingUnavailable(_)
            | CoreError::SearchUnavailable(_)
            | CoreError::RetrievalFailed(_) => {
                "The knowledge service could not complete your request. Please try again shortly."
                    .to_string()
            }
            CoreError::ProviderTimeout { .. } => {
                "The answer took too long to generate. Please try again.".to_string()
            }
            CoreError::ContentAcquisition(_) | CoreError::PlaceholderContent => {
                "The article content could not be retrieved.".to_string()
            }
            CoreError::NotFound(msg) => format!("Not found: {}", msg),
            CoreError::Internal(_) => "An unexpected error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
