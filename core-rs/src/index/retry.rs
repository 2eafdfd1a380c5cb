//! Retry with linear backoff for transient index failures

use crate::errors::Result;
use std::future::Future;
use std::time::Duration;

/// Delay unit between attempts (attempt n waits n * BASE_DELAY_MS)
const BASE_DELAY_MS: u64 = 250;

/// Run `f` up to `retries + 1` times. Only transient errors are retried.
pub(crate) async fn with_retries<T, F, Fut>(retries: u32, what: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < retries => {
                attempt += 1;
                let delay = Duration::from_millis(BASE_DELAY_MS * attempt as u64);
                tracing::warn!(attempt, retries, "{} failed, retrying in {:?}: {}", what, delay, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
