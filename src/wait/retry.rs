use std::future::Future;
use std::time::Duration;

/// Retry a fallible async operation with exponential backoff, as long as
/// `retryable` accepts the error.
pub async fn with_retry<F, Fut, T, E, R>(
    max_retries: u32,
    base_delay: Duration,
    operation_name: &str,
    retryable: R,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                attempt += 1;
                if attempt > max_retries || !retryable(&e) {
                    if attempt > 1 {
                        tracing::error!(
                            operation = operation_name,
                            attempts = attempt,
                            "All retry attempts exhausted"
                        );
                    }
                    return Err(e);
                }

                let delay = base_delay * 2u32.pow(attempt - 1);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
