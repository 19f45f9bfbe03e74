use std::fmt::Display;
use std::future::Future;

/// Immediately re-invokes `operation` (no backoff delay) until it succeeds or
/// `max_attempts` is exhausted, returning the final failure. The whole
/// operation is retried, not just its last step, and no distinction is made
/// between error kinds.
pub async fn retry_notify<T, E, F, Fut>(max_attempts: u32, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts => {
                warn!(attempt, max_attempts, "notification attempt failed, retrying: {error}");
                attempt += 1;
            },
            Err(error) => return Err(error),
        }
    }
}
