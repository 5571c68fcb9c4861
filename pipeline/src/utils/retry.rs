use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub async fn sleep_with_jitter(base_ms: u64, jitter_ms: u64) {
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=jitter_ms)
    };
    tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
}

/// Runs `operation` up to `attempts` times, doubling the delay between
/// attempts. Stops early on errors that are not retryable.
pub async fn retry_with_backoff<T, F, Fut>(
    attempts: u32,
    base_delay_ms: u64,
    operation: F,
) -> common::Result<T>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = common::Result<T>>,
{
    let mut delay = base_delay_ms;
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                if attempt >= attempts || !e.is_retryable() {
                    return Err(e);
                }

                warn!(attempt, error = %e, delay_ms = delay, "Attempt failed, retrying");
                attempt += 1;
                sleep_with_jitter(delay, delay / 2).await;
                delay = delay.saturating_mul(2);
            }
        }
    }
}
