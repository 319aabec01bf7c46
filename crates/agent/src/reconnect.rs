//! Capped linear-backoff reconnection.
//!
//! After a failed connect or an ended session the agent waits
//! `base_delay * min(attempt, 5)` and tries again. Once `max_attempts`
//! consecutive attempts have failed it stops for good. A connection that
//! was established resets the counter.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Multiplier ceiling for the backoff.
const MAX_DELAY_STEPS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnection attempt `attempt` (1-based), or `None`
    /// once the ceiling has been passed.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.base_delay * attempt.min(MAX_DELAY_STEPS))
    }
}

/// Why [`reconnect_loop`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Cancelled,
    /// Every allowed attempt failed.
    GaveUp { attempts: u32 },
}

/// Drive `connect` until cancelled or the policy gives up.
///
/// `connect` should establish a connection and serve it until it ends:
/// `Ok(())` means a connection was made (and has since closed), `Err`
/// means connecting failed.
pub async fn reconnect_loop<F, Fut, E>(
    policy: &ReconnectPolicy,
    cancel: &CancellationToken,
    mut connect: F,
) -> LoopExit
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut attempts = 0u32;

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return LoopExit::Cancelled,
            outcome = connect() => outcome,
        };
        if cancel.is_cancelled() {
            return LoopExit::Cancelled;
        }

        match outcome {
            Ok(()) => {
                attempts = 0;
                tracing::warn!("Bridge session ended, reconnecting");
            }
            Err(e) => {
                tracing::warn!(attempt = attempts, error = %e, "Bridge connection failed");
            }
        }

        attempts += 1;
        let Some(delay) = policy.delay_for(attempts) else {
            tracing::error!(
                attempts = policy.max_attempts,
                "Giving up on the bridge after too many failed attempts",
            );
            return LoopExit::GaveUp {
                attempts: policy.max_attempts,
            };
        };

        tracing::info!(attempt = attempts, delay_ms = delay.as_millis() as u64, "Reconnecting to bridge");
        tokio::select! {
            _ = cancel.cancelled() => return LoopExit::Cancelled,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use tokio::time::Instant;

    use super::*;

    #[test]
    fn delay_grows_linearly_then_flattens() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (1..=10)
            .map(|n| policy.delay_for(n).unwrap().as_secs())
            .collect();

        assert_eq!(delays, vec![2, 4, 6, 8, 10, 10, 10, 10, 10, 10]);
    }

    #[test]
    fn no_delay_past_the_ceiling() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay_for(11).is_none());
        assert!(policy.delay_for(0).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn attempts_never_exceed_the_ceiling() {
        let policy = ReconnectPolicy::default();
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let exit = reconnect_loop(&policy, &cancel, || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection refused")
            }
        })
        .await;

        assert_eq!(exit, LoopExit::GaveUp { attempts: 10 });
        // The initial connect plus ten reconnection attempts.
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        // 2 + 4 + 6 + 8 + 10 * 6
        assert!(started.elapsed() >= Duration::from_secs(80));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_connection_resets_the_counter() {
        let policy = ReconnectPolicy {
            base_delay: Duration::from_secs(1),
            max_attempts: 3,
        };
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let exit = reconnect_loop(&policy, &cancel, || {
            let calls = Arc::clone(&calls);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n == 3 {
                    Ok(())
                } else {
                    Err("connection refused")
                }
            }
        })
        .await;

        assert_eq!(exit, LoopExit::GaveUp { attempts: 3 });
        // Two failures and one session, then a fresh budget of three.
        assert_eq!(calls.load(Ordering::SeqCst), 3 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_loop_while_waiting() {
        let policy = ReconnectPolicy::default();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let exit = reconnect_loop(&policy, &cancel, || async { Err::<(), _>("connection refused") }).await;
        assert_eq!(exit, LoopExit::Cancelled);
    }

    #[tokio::test]
    async fn already_cancelled_token_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let exit = reconnect_loop(&ReconnectPolicy::default(), &cancel, || async {
            Ok::<(), &str>(())
        })
        .await;
        assert_eq!(exit, LoopExit::Cancelled);
    }
}
