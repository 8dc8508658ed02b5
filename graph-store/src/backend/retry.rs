//! Retry on SQLite lock contention
//!
//! Exponential backoff from 10ms doubling up to 1000ms, until `max_wait_ms` has
//! elapsed. Only "database is locked" errors are retried; anything else fails
//! immediately.

use graph_common::{Error, Result};
use std::time::{Duration, Instant};

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => db_err.to_string().contains("database is locked"),
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or the
/// retry budget is spent
pub(crate) async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Store operation succeeded after significant retry period (>2s)"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed_ms,
                            "Store operation succeeded after retry"
                        );
                    }
                }
                return Ok(result);
            }
            Err(err) => {
                if !is_lock_error(&err) {
                    return Err(err);
                }

                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        "Store operation failed: max retry time exceeded"
                    );
                    return Err(Error::Internal(format!(
                        "Database locked after {} attempts ({} ms elapsed, max {} ms)",
                        attempt,
                        elapsed.as_millis(),
                        max_wait_ms
                    )));
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis(),
                    backoff_ms,
                    "Database locked, will retry after backoff"
                );

                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(1000);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn locked() -> Error {
        Error::Database(sqlx::Error::Protocol("database is locked".to_string()))
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 5000, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_lock_errors_until_success() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(locked())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_wait() {
        let result = retry_on_lock("test_op", 30, || async { Err::<i32, Error>(locked()) }).await;
        assert!(matches!(result, Err(Error::Internal(msg)) if msg.contains("Database locked")));
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result = retry_on_lock("test_op", 5000, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, Error>(Error::Internal("other error".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
