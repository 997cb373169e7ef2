// Bounded confirmation of a started service
//
// After a start request the backend needs a while to report the container as running.
// We poll a fixed number of times and report one of three outcomes instead of silently
// assuming success.

use log::{debug, info, warn};
use std::future::Future;
use tokio::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;

/// What a single status check observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCheck {
    Running,
    /// Not running yet; try again.
    Pending,
    /// Hard failure (auth, explicit service error). Stops polling.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// Attempts exhausted without a confirmation.
    Assumed,
    Failed(String),
}

impl ConfirmOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ConfirmOutcome::Failed(_))
    }
}

enum Unconfirmed {
    Pending,
    Failed(String),
}

/// Check up to `attempts` times, `interval` apart. The first check runs immediately.
pub async fn confirm_running<F, Fut>(
    label: &str,
    mut check: F,
    attempts: u32,
    interval: Duration,
) -> ConfirmOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StatusCheck>,
{
    let attempts = attempts.max(1);
    let strategy = FixedInterval::new(interval).take(attempts as usize - 1);
    let mut attempt_no = 0u32;

    let action = || {
        attempt_no += 1;
        let n = attempt_no;
        let fut = check();
        async move {
            match fut.await {
                StatusCheck::Running => Ok(()),
                StatusCheck::Pending => {
                    debug!(
                        "[PHASE: services] [STEP: confirm] {} not running yet (attempt {}/{})",
                        label, n, attempts
                    );
                    Err(Unconfirmed::Pending)
                }
                StatusCheck::Failed(msg) => Err(Unconfirmed::Failed(msg)),
            }
        }
    };

    match RetryIf::start(strategy, action, |e: &Unconfirmed| {
        matches!(e, Unconfirmed::Pending)
    })
    .await
    {
        Ok(()) => {
            info!("[PHASE: services] [STEP: confirm] {} is running", label);
            ConfirmOutcome::Confirmed
        }
        Err(Unconfirmed::Pending) => {
            info!(
                "[PHASE: services] [STEP: confirm] {} not confirmed after {} attempts; assuming it is still starting",
                label, attempts
            );
            ConfirmOutcome::Assumed
        }
        Err(Unconfirmed::Failed(msg)) => {
            warn!(
                "[PHASE: services] [STEP: confirm] {} failed to start: {}",
                label, msg
            );
            ConfirmOutcome::Failed(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn confirms_once_service_reports_running() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome = confirm_running(
            "chronicle",
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n >= 3 {
                        StatusCheck::Running
                    } else {
                        StatusCheck::Pending
                    }
                }
            },
            10,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(outcome, ConfirmOutcome::Confirmed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_are_assumed() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome = confirm_running(
            "mem0",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { StatusCheck::Pending }
            },
            4,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(outcome, ConfirmOutcome::Assumed);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn hard_failure_stops_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome = confirm_running(
            "speaker",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { StatusCheck::Failed("Authentication required".to_string()) }
            },
            10,
            Duration::from_millis(1),
        )
        .await;
        assert!(outcome.is_failed());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_attempts_still_checks_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let outcome = confirm_running(
            "tailscale",
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { StatusCheck::Running }
            },
            0,
            Duration::from_millis(1),
        )
        .await;
        assert_eq!(outcome, ConfirmOutcome::Confirmed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
