//! Bounded retry for upstream calls.

use std::time::Duration;

use tracing::warn;

use crate::error::{MlError, MlResult};

/// Delay before the first retry; doubles per attempt.
const BASE_DELAY_MS: u64 = 500;

/// Run `op` up to `max_retries + 1` times, retrying only transient errors.
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: &str, op: F) -> MlResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = MlResult<T>>,
{
    let mut last_error = None;

    for attempt in 0..=max_retries {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = Duration::from_millis(BASE_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt)));
                warn!(
                    operation,
                    attempt = attempt + 1,
                    "Upstream request failed, retrying in {:?}: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| MlError::RequestFailed("retry loop exhausted".to_string())))
}
