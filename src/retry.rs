use std::future::Future;
use thiserror::Error;
use tokio::time::{Duration, sleep};

#[derive(Debug, Error)]
#[error("gave up after {attempts} attempts: {last_error}")]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last_error: E,
}

/// Run `op` until it succeeds or `max_attempts` calls have failed, sleeping
/// `delay` between attempts. `op` receives the 1-based attempt number.
///
/// `max_attempts` of zero is treated as one.
pub async fn with_retry<T, E, F, Fut>(
    mut op: F,
    max_attempts: u32,
    delay: Duration,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                return Err(RetryExhausted {
                    attempts: attempt,
                    last_error: err,
                });
            }
            Err(_) => {
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
