//! Bounded retry for session creation.

use std::future::Future;

use tracing::warn;

use crate::error::{Result, StreamError};

/// Retries an operation on HTTP 500/503/404, the statuses the session API
/// returns while a backend node is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made after the first one.
    pub retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { retries: 3 }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32) -> Self {
        Self { retries }
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or the
    /// retry budget is spent.
    ///
    /// Every failure is wrapped in [`StreamError::Negotiation`] tagged with
    /// `label` and the number of attempts made.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient_http() && attempt <= self.retries => {
                    warn!(
                        "{label}: {e}. Retrying ({attempt}/{retries})...",
                        retries = self.retries
                    );
                }
                Err(e) => {
                    return Err(StreamError::Negotiation {
                        format_id: label.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn http(status: u16) -> StreamError {
        StreamError::Http {
            status,
            url: "https://api.example/sessions".into(),
        }
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::new(3)
            .run("fmt", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(http(503))
                } else {
                    Ok("ok")
                }
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::new(2)
            .run("fmt", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(http(500))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            StreamError::Negotiation {
                format_id,
                attempts,
                ..
            } => {
                assert_eq!(format_id, "fmt");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_forbidden_not_retried() {
        let calls = AtomicU32::new(0);
        let err = RetryPolicy::new(3)
            .run("fmt", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(http(403))
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let calls = AtomicU32::new(0);
        let result = RetryPolicy::new(0)
            .run("fmt", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(http(404))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
