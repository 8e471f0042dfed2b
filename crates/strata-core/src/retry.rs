//! Fixed-delay retry of fallible async actions.

use crate::error::{DaoError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(5))
    }
}

/// Run `action` until it succeeds, `give_up` accepts its error, or the
/// attempts are exhausted. The last error is returned.
pub async fn retry<T, F, Fut, G>(
    description: &str,
    policy: RetryPolicy,
    give_up: G,
    mut action: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    G: Fn(&DaoError) -> bool,
{
    let mut attempt = 1;
    loop {
        match action().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= policy.attempts || give_up(&e) => return Err(e),
            Err(e) => {
                warn!(
                    attempt,
                    attempts = policy.attempts,
                    error = %e,
                    "{description} failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKey;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry("probe", RetryPolicy::new(5, Duration::ZERO), |_| false, move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(DaoError::technical(ErrorKey::GraphUnreachable, format!("try {n}")))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausted_returns_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> =
            retry("probe", RetryPolicy::new(3, Duration::ZERO), |_| false, move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Err(DaoError::technical(ErrorKey::GraphUnreachable, format!("try {n}")))
            })
            .await;
        assert_eq!(result.unwrap_err().message(), "try 3");
    }

    #[test]
    fn test_retry_gives_up() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = tokio_test::block_on(retry(
            "probe",
            RetryPolicy::new(5, Duration::ZERO),
            |e| e.key() == ErrorKey::InvalidParameter,
            move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(DaoError::invalid_parameter("bad"))
            },
        ));
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_at_least_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
    }
}
