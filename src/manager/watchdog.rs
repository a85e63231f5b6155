//! Liveness monitoring for the reconciliation loop
//!
//! The scheduler touches a [`LivenessClock`] whenever a pass starts or the
//! cursor advances. The [`Watchdog`] owns nothing else: it polls the clock
//! and, when progress stopped for longer than the threshold, asks a
//! [`PassRestarter`] for a fresh pass.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

use crate::metrics;

// ============================================================================
// Liveness Clock
// ============================================================================

/// Time of the last observed scheduler progress
///
/// Cloning shares the same underlying timestamp.
#[derive(Debug, Clone)]
pub struct LivenessClock {
    last_progress_ms: Arc<AtomicI64>,
}

impl LivenessClock {
    /// Create a clock that was touched just now
    pub fn new() -> Self {
        Self {
            last_progress_ms: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
        }
    }

    /// Record progress now
    pub fn touch(&self) {
        self.touch_at(Utc::now());
    }

    /// Record progress at an explicit time
    pub fn touch_at(&self, at: DateTime<Utc>) {
        self.last_progress_ms
            .store(at.timestamp_millis(), Ordering::SeqCst);
    }

    /// Time of the last recorded progress
    pub fn last_progress(&self) -> DateTime<Utc> {
        let ms = self.last_progress_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }

    /// Time elapsed between the last progress and `now`
    pub fn elapsed_since(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_progress()
    }
}

impl Default for LivenessClock {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Watchdog
// ============================================================================

/// Hook the watchdog uses to force a new pass
#[async_trait]
pub trait PassRestarter: Send + Sync {
    /// Abandon the current pass and start a new one
    async fn restart_pass(&self) -> anyhow::Result<()>;
}

/// Restarts the loop when it stops making progress
#[derive(Debug, Clone)]
pub struct Watchdog {
    clock: LivenessClock,
    threshold: chrono::Duration,
    poll_interval: Duration,
}

impl Watchdog {
    pub fn new(clock: LivenessClock, threshold: chrono::Duration, poll_interval: Duration) -> Self {
        Self {
            clock,
            threshold,
            poll_interval,
        }
    }

    /// Check whether progress stopped for longer than the threshold
    pub fn is_stalled(&self, now: DateTime<Utc>) -> bool {
        self.clock.elapsed_since(now) > self.threshold
    }

    /// Run a single check; returns true when a restart was requested
    pub async fn check_once(&self, restarter: &dyn PassRestarter) -> bool {
        let now = Utc::now();
        if !self.is_stalled(now) {
            return false;
        }

        tracing::info!(
            last_progress = %self.clock.last_progress(),
            stalled_secs = self.clock.elapsed_since(now).num_seconds(),
            "Invite manager seems to have stopped, restarting"
        );
        metrics::record_watchdog_restart();

        if let Err(e) = restarter.restart_pass().await {
            tracing::error!(error = %e, "Watchdog failed to restart the pass");
        }
        true
    }

    /// Spawn the polling task
    pub fn spawn(
        self,
        restarter: Arc<dyn PassRestarter>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.check_once(restarter.as_ref()).await;
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Watchdog shutting down");
                        break;
                    }
                }
            }
        })
    }
}
