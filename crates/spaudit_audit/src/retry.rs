//! Exponential backoff with jitter for transient SharePoint client errors.
//! Never retries a non-`Transient` failure — those are either permanent or
//! already a cancellation and retrying them would just waste the budget.

use rand::Rng;
use spaudit_domain::{EngineError, ErrorKind};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.kind() == ErrorKind::Transient && attempt < max_retries => {
                let delay = backoff_delay(base_delay, attempt);
                debug!(attempt, ?delay, %err, "retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
    let jitter_fraction: f64 = rand::thread_rng().gen_range(0.5..1.5);
    exp.mul_f64(jitter_fraction).min(base.saturating_mul(16))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_limit() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counted = attempts.clone();
        let result: Result<(), EngineError> = retry_with_backoff(3, Duration::from_millis(1), move || {
            let counted = counted.clone();
            async move {
                let n = counted.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(EngineError::Transient("flaky".into()))
                } else {
                    Ok(())
                }
            }
        })
        .await;
        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_non_transient_errors() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counted = attempts.clone();
        let result: Result<(), EngineError> = retry_with_backoff(5, Duration::from_millis(1), move || {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(EngineError::ValidationError("bad input".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
