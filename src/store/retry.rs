//! Bounded retry with exponential backoff for database writes

use std::future::Future;
use std::time::Duration;

use tracing::{error, warn};

use super::StoreResult;

/// Attempts per operation
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubled for each later one
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Runs `op` until it succeeds or `attempts` are used up
///
/// # Arguments
///
/// * `label` - Operation name used in log lines
/// * `attempts` - Maximum number of tries (at least one is made)
/// * `base` - First backoff delay
/// * `op` - Produces a fresh future for every attempt
///
/// # Returns
///
/// The first success, or the last error once all attempts failed
pub async fn with_retry<T, F, Fut>(
    label: &str,
    attempts: u32,
    base: Duration,
    mut op: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let attempts = attempts.max(1);
    let mut delay = base;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                error!("{} failed after {} attempts: {}", label, attempts, e);
                return Err(e);
            }
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {}", label, attempt, attempts, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);

        let result = with_retry("write", 3, Duration::from_millis(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Task("locked".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);

        let result: StoreResult<()> = with_retry("write", 3, Duration::from_millis(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Task("locked".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
