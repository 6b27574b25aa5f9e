//! Admission and graceful shutdown of streaming calls.
//!
//! Every streaming call holds an [`InflightGuard`] for as long as it runs.
//! Shutdown happens in phases:
//!
//! 1. Refuse new streaming calls.
//! 2. Wait up to the drain timeout for in-flight calls to finish.
//! 3. Cancel the shared [`CancellationToken`], which every suspended
//!    component watches, so stragglers unwind promptly.

use crate::server::telemetry::{decrement_streams_inflight, increment_streams_inflight};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use starfriends_core::{Error, Result};
use std::sync::Arc;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct Lifecycle {
    token: CancellationToken,
    accepting: AtomicBool,
    inflight: AtomicUsize,
    drain_timeout: Duration,
}

impl Lifecycle {
    pub fn new(drain_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            token: CancellationToken::new(),
            accepting: AtomicBool::new(true),
            inflight: AtomicUsize::new(0),
            drain_timeout,
        })
    }

    /// Token cancelled once draining is over.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of streaming calls currently running.
    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Admits one streaming call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn begin(self: &Arc<Self>) -> Result<InflightGuard> {
        // Count first so a concurrent shutdown never drains past us.
        self.inflight.fetch_add(1, Ordering::AcqRel);
        if !self.accepting.load(Ordering::Acquire) {
            self.inflight.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ServiceShutdown);
        }

        increment_streams_inflight();
        Ok(InflightGuard {
            lifecycle: Arc::clone(self),
        })
    }

    /// Refuses new calls, drains in-flight ones, then cancels the rest.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new calls ===
        tracing::info!("Refusing new streaming calls");
        self.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for in-flight calls to drain ===
        tracing::info!(active = self.inflight(), "Draining in-flight streams");
        let drained = timeout(self.drain_timeout, async {
            while self.inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight streams drained"),
            Err(_) => tracing::warn!(
                active = self.inflight(),
                "Graceful drain timed out, cancelling remaining streams"
            ),
        }

        // === Phase 2: Cancel whatever is left ===
        self.token.cancel();
    }
}

/// Marks one running streaming call. Dropping it ends the call's lease.
pub struct InflightGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.lifecycle.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_streams_inflight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test]
    async fn refuses_calls_after_shutdown() {
        let lifecycle = Lifecycle::new(Duration::ZERO);
        lifecycle.shutdown().await;

        assert!(matches!(lifecycle.begin(), Err(Error::ServiceShutdown)));
        assert_eq!(lifecycle.inflight(), 0);
        assert!(lifecycle.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_inflight_calls_before_cancelling() {
        let lifecycle = Lifecycle::new(Duration::from_secs(3));
        let guard = lifecycle.begin().unwrap();
        assert_eq!(lifecycle.inflight(), 1);

        let token = lifecycle.token().clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(500)).await;
            assert!(!token.is_cancelled());
            drop(guard);
        });

        let start = Instant::now();
        lifecycle.shutdown().await;

        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(lifecycle.inflight(), 0);
        assert!(lifecycle.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancels_stragglers_after_the_drain_timeout() {
        let lifecycle = Lifecycle::new(Duration::from_secs(3));
        let _guard = lifecycle.begin().unwrap();
        let start = Instant::now();

        lifecycle.shutdown().await;

        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(lifecycle.token().is_cancelled());
        assert_eq!(lifecycle.inflight(), 1);
    }
}
