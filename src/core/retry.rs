use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::core::errors::{CoreError, Result};

/// Run an operation, retrying once with jittered backoff if the first
/// attempt fails with a transient error. Non-transient errors are
/// returned immediately; a second failure is surfaced as-is for the
/// caller to classify.
pub async fn retry_transient_once<T, F, Fut>(base_delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(err) if err.is_transient() => {
            let jitter_ms = rand::rng().random_range(0..=base_delay.as_millis() as u64);
            let delay = base_delay + Duration::from_millis(jitter_ms);
            tracing::debug!("transient failure, retrying in {:?}: {}", delay, err);
            tokio::time::sleep(delay).await;
            op().await
        }
        Err(err) => Err(err),
    }
}

/// Classify an exhausted transient failure as `RetrievalFailed`.
pub fn exhausted(err: CoreError) -> CoreError {
    if err.is_transient() {
        CoreError::RetrievalFailed(err.to_string())
    } else {
        err
    }
}
