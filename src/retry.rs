use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use crate::errors::{Result, UploadError};

/// Run `operation` once per schedule entry, sleeping the entry's delay
/// before the attempt. A zero delay means try immediately.
///
/// Non-retryable errors short-circuit; otherwise the last error is
/// returned once the schedule is exhausted.
pub async fn retry_with_schedule<F, Fut, T>(delays: &[Duration], mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for delay in delays {
        if !delay.is_zero() {
            sleep(*delay).await;
        }

        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if !error.is_retryable() {
                    return Err(error);
                }
                last_error = Some(error);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| UploadError::Config("empty retry schedule".to_string())))
}
