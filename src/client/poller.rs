// client/poller.rs
//
// Discovers the outcome of an in-flight payment by polling the status
// endpoint; the STK webhook lands on the backend, never on the client. One
// loop per attempt, cancelled when the checkout is dismissed or retried.
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::PaymentsApi;
use crate::models::payment::PaymentView;

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Head start for the payer to find their phone and key in the PIN
    /// before the first status check.
    pub grace_delay: Duration,
    pub interval: Duration,
    /// Used instead of `interval` after a transport error.
    pub error_backoff: Duration,
    /// Give-up budget; exhausting it yields [`PollOutcome::TimedOut`].
    pub max_polls: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        PollConfig {
            grace_delay: Duration::from_secs(10),
            interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(15),
            max_polls: 12,
        }
    }
}

#[derive(Debug)]
pub enum PollOutcome {
    /// The backend reported a terminal status.
    Resolved(PaymentView),
    /// Poll budget exhausted with the payment still in flight. The backend
    /// record is reconciled by the expiry sweep; the client treats the
    /// attempt as expired.
    TimedOut,
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("polling cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StatusPoller {
    api: PaymentsApi,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(api: PaymentsApi, config: PollConfig) -> Self {
        StatusPoller { api, config }
    }

    pub async fn wait_for_outcome(
        &self,
        payment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, PollError> {
        self.sleep_unless_cancelled(self.config.grace_delay, cancel)
            .await?;

        let mut polls = 0u32;
        loop {
            let view = tokio::select! {
                _ = cancel.cancelled() => return Err(PollError::Cancelled),
                result = self.api.status(payment_id) => result,
            };
            polls += 1;

            let delay = match view {
                Ok(view) if view.status.is_terminal() => {
                    debug!("Payment {} resolved: {}", payment_id, view.status);
                    return Ok(PollOutcome::Resolved(view));
                }
                Ok(view) => {
                    debug!("Payment {} still {}", payment_id, view.status);
                    self.config.interval
                }
                Err(e) => {
                    // treated as transient; retry on the longer interval
                    warn!("Status poll for {} failed: {}", payment_id, e);
                    self.config.error_backoff
                }
            };

            if polls >= self.config.max_polls {
                warn!(
                    "Giving up on payment {} after {} polls",
                    payment_id, polls
                );
                return Ok(PollOutcome::TimedOut);
            }

            self.sleep_unless_cancelled(delay, cancel).await?;
        }
    }

    async fn sleep_unless_cancelled(
        &self,
        duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), PollError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(PollError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testutil::{spawn, ScriptedStatus};
    use crate::models::payment::PaymentStatus;
    use std::sync::atomic::Ordering;

    fn fast_config(max_polls: u32) -> PollConfig {
        PollConfig {
            grace_delay: Duration::from_millis(5),
            interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(10),
            max_polls,
        }
    }

    #[tokio::test]
    async fn resolves_when_status_turns_terminal() {
        let (addr, api) = spawn(vec![
            ScriptedStatus::Status("processing"),
            ScriptedStatus::Status("processing"),
            ScriptedStatus::Status("completed"),
        ])
        .await;

        let poller = StatusPoller::new(
            PaymentsApi::new(format!("http://{}", addr), "token"),
            fast_config(12),
        );
        let cancel = CancellationToken::new();

        let outcome = poller
            .wait_for_outcome("665f1c0d8a4e5b0001a1b2c3", &cancel)
            .await
            .unwrap();

        match outcome {
            PollOutcome::Resolved(view) => {
                assert_eq!(view.status, PaymentStatus::Completed);
                assert_eq!(view.receipt_number.as_deref(), Some("QGH123"));
            }
            PollOutcome::TimedOut => panic!("expected resolution"),
        }
        assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn times_out_after_poll_budget() {
        let (addr, api) = spawn(vec![ScriptedStatus::Status("processing")]).await;

        let poller = StatusPoller::new(
            PaymentsApi::new(format!("http://{}", addr), "token"),
            fast_config(3),
        );
        let cancel = CancellationToken::new();

        let outcome = poller
            .wait_for_outcome("665f1c0d8a4e5b0001a1b2c3", &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, PollOutcome::TimedOut));
        assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_from_transient_server_errors() {
        let (addr, _api) = spawn(vec![
            ScriptedStatus::ServerError,
            ScriptedStatus::Status("completed"),
        ])
        .await;

        let poller = StatusPoller::new(
            PaymentsApi::new(format!("http://{}", addr), "token"),
            fast_config(12),
        );
        let cancel = CancellationToken::new();

        let outcome = poller
            .wait_for_outcome("665f1c0d8a4e5b0001a1b2c3", &cancel)
            .await
            .unwrap();

        assert!(matches!(outcome, PollOutcome::Resolved(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_the_loop() {
        let (addr, api) = spawn(vec![ScriptedStatus::Status("processing")]).await;

        let poller = StatusPoller::new(
            PaymentsApi::new(format!("http://{}", addr), "token"),
            PollConfig {
                grace_delay: Duration::from_millis(5),
                interval: Duration::from_secs(60),
                error_backoff: Duration::from_secs(60),
                max_polls: 100,
            },
        );
        let cancel = CancellationToken::new();

        let handle = {
            let poller = poller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                poller
                    .wait_for_outcome("665f1c0d8a4e5b0001a1b2c3", &cancel)
                    .await
            })
        };

        // let the first poll land, then cancel mid-interval
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PollError::Cancelled)));
        assert!(api.polls.load(Ordering::SeqCst) <= 1);
    }
}
