//! Bounded retry for single bulk statements

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Run `attempt` up to `attempts` times (at least once), returning the first
/// success or the last error. The closure receives the 1-based attempt number.
pub async fn with_retries<T, E, F, Fut>(operation: &str, attempts: u32, mut attempt: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let attempts = attempts.max(1);
    let mut number = 1;

    loop {
        match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(e) if number < attempts => {
                warn!(operation, attempt = number, max_attempts = attempts, error = %e, "Attempt failed, retrying");
                number += 1;
            },
            Err(e) => return Err(e),
        }
    }
}
