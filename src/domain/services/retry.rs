use crate::error::AppError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

const INITIAL_BACKOFF_MS: u64 = 50;
const MAX_BACKOFF_MS: u64 = 2_000;

/// Delay before retry number `attempt` (0-based): exponential, capped, with full jitter
/// over the upper half of the window.
pub fn backoff_delay(attempt: u32) -> Duration {
    let ceiling = INITIAL_BACKOFF_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(MAX_BACKOFF_MS);
    let floor = ceiling / 2;
    let jittered = rand::thread_rng().gen_range(floor..=ceiling);
    Duration::from_millis(jittered)
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or exhausts `max_retries`.
pub async fn with_backoff<T, F, Fut>(label: &str, max_retries: u32, mut op: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                if retries >= max_retries {
                    error!("{} failed after {} retries: {}", label, retries, e);
                    return Err(AppError::Unavailable(format!("{} is temporarily unavailable", label)));
                }
                let delay = backoff_delay(retries);
                warn!("{} transient error ({}). Retrying in {}ms...", label, e, delay.as_millis());
                sleep(delay).await;
                retries += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
