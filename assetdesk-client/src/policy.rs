//! Per-request deadlines and cancellation.

use crate::config::ClientConfig;
use assetdesk_core::{DeskResult, NetworkError};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Deadline and cancellation scope applied to every remote call.
///
/// Cloning shares the token, so cancelling any clone cancels all calls
/// running under the policy.
#[derive(Debug, Clone)]
pub struct RequestPolicy {
    timeout: Duration,
    cancel: CancellationToken,
}

impl RequestPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.request_timeout())
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Same deadline, with a token cancelled whenever this one is.
    pub fn child(&self) -> Self {
        Self {
            timeout: self.timeout,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `call` against `endpoint` under the deadline.
    ///
    /// A call that was already cancelled is never polled.
    pub async fn run<T, F>(&self, endpoint: &str, call: F) -> DeskResult<T>
    where
        F: Future<Output = DeskResult<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(NetworkError::Cancelled {
                endpoint: endpoint.to_string(),
            }
            .into());
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                tracing::debug!(endpoint, "Request cancelled");
                Err(NetworkError::Cancelled {
                    endpoint: endpoint.to_string(),
                }
                .into())
            }
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => {
                    let timeout_ms = self.timeout.as_millis() as u64;
                    tracing::warn!(endpoint, timeout_ms, "Request timed out");
                    Err(NetworkError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout_ms,
                    }
                    .into())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetdesk_core::DeskError;

    #[tokio::test]
    async fn test_run_passes_result_through() {
        let policy = RequestPolicy::new(Duration::from_secs(1));
        let value = policy.run("tickets", async { Ok::<_, DeskError>(7) }).await;
        assert_eq!(value.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_times_out() {
        let policy = RequestPolicy::new(Duration::from_millis(50));
        let result = policy
            .run("tickets", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, DeskError>(())
            })
            .await;
        assert!(matches!(
            result,
            Err(DeskError::Network(NetworkError::Timeout { timeout_ms: 50, .. }))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_never_polls() {
        let policy = RequestPolicy::new(Duration::from_secs(1));
        policy.cancel();
        let mut polled = false;
        let result: DeskResult<()> = policy
            .run("relations", async {
                polled = true;
                Ok(())
            })
            .await;
        assert!(!polled);
        assert!(matches!(
            result,
            Err(DeskError::Network(NetworkError::Cancelled { .. }))
        ));
    }

    #[tokio::test]
    async fn test_child_follows_parent_cancellation() {
        let parent = RequestPolicy::new(Duration::from_secs(1));
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
