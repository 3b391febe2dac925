//! Retry for transient SQLite lock contention
//!
//! WAL mode allows concurrent readers, but writers still serialize. Under a
//! burst of submissions and worker transitions a write can observe
//! "database is locked" after `busy_timeout` expires; those errors are
//! retried with exponential backoff inside a total wait budget.

use plancheck_common::time::millis_to_duration;
use std::future::Future;
use std::time::Instant;

use crate::error::AnalysisError;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// Errors that can report transient lock contention
pub trait LockContention {
    fn is_lock_contention(&self) -> bool;
}

impl LockContention for plancheck_common::Error {
    fn is_lock_contention(&self) -> bool {
        self.is_database_locked()
    }
}

impl LockContention for AnalysisError {
    fn is_lock_contention(&self) -> bool {
        match self {
            AnalysisError::Storage(inner) => inner.is_database_locked(),
            _ => false,
        }
    }
}

/// Run `operation`, retrying lock errors until `max_wait_ms` elapses
///
/// Backoff starts at 10ms and doubles up to 1s. Any other error is returned
/// immediately; when the budget runs out the last lock error is returned.
pub async fn retry_on_lock<F, Fut, T, E>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: LockContention + std::fmt::Display,
{
    let start_time = Instant::now();
    let max_duration = millis_to_duration(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    let elapsed_ms = start_time.elapsed().as_millis();
                    if elapsed_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database write succeeded after long lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms,
                            "Database write succeeded after retry"
                        );
                    }
                }
                return Ok(value);
            }
            Err(err) if !err.is_lock_contention() => return Err(err),
            Err(err) => {
                let elapsed = start_time.elapsed();
                if elapsed >= max_duration {
                    tracing::error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis(),
                        max_wait_ms,
                        error = %err,
                        "Database still locked, giving up"
                    );
                    return Err(err);
                }

                let sleep_ms = backoff_ms
                    .min(MAX_BACKOFF_MS)
                    .min(max_duration.saturating_sub(elapsed).as_millis() as u64)
                    .max(1);

                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    backoff_ms = sleep_ms,
                    "Database locked, retrying"
                );

                tokio::time::sleep(millis_to_duration(sleep_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}
