//! Bounded retry for transient storage failures.

use std::future::Future;
use std::time::Duration;

use idforge_core::{Error, Result};

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY_MS: u64 = 50;

/// Run an operation, retrying up to three times with exponential backoff
/// when the failure is classified as retryable (`Unavailable`).
///
/// Concurrency conflicts are never retried here: the caller holds the stale
/// write model, so only an end-to-end reload can make the retry meaningful.
pub async fn with_backoff<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last: Option<Error> = None;
    for attempt in 0..MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(
                    error = %err,
                    attempt = attempt + 1,
                    "transient event store failure, backing off"
                );
                tokio::time::sleep(delay).await;
                last = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last.unwrap_or_else(|| Error::internal("EVSTORE-rt01", "retry loop exhausted")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_unavailable_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::unavailable("EVSTORE-t01", "connection reset"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn conflict_surfaces_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::concurrency_conflict("EVSTORE-t02", "stale version")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
