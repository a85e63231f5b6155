//! Reconciliation scheduler
//!
//! Drives the pass cursor one server at a time. Every pass gets a new
//! generation number; a pass task whose generation is no longer current
//! exits at its next step, which is how restarts abandon an old pass without
//! cancelling it.
//!
//! # State machine
//!
//! | From | Event | To |
//! |------|-------|----|
//! | any | `Start` | `PassRunning` |
//! | `PassRunning` | `Advance` | `PassRunning` |
//! | `PassRunning` | `PassFinished` | `PassDone` |
//! | `PassDone` | `QuietElapsed` | `PassRunning` |
//! | any | `Stop` | `Idle` |

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

use super::cursor::PassCursor;
use super::reconciler::ServerReconciler;
use super::watchdog::{LivenessClock, PassRestarter, Watchdog};
use crate::config::ManagerConfig;
use crate::error::KeeperErrorTrait;
use crate::metrics;
use crate::models::Group;
use crate::storage::SharedServerRepository;

// ============================================================================
// State Machine
// ============================================================================

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Idle,
    PassRunning,
    PassDone,
}

/// Scheduler events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Start,
    Advance,
    PassFinished,
    QuietElapsed,
    Stop,
}

impl LoopState {
    /// Transition table; `None` marks an invalid transition
    pub fn next(self, event: LoopEvent) -> Option<LoopState> {
        use LoopEvent::*;
        use LoopState::*;

        match (self, event) {
            (_, Start) => Some(PassRunning),
            (_, Stop) => Some(Idle),
            (PassRunning, Advance) => Some(PassRunning),
            (PassRunning, PassFinished) => Some(PassDone),
            (PassDone, QuietElapsed) => Some(PassRunning),
            _ => None,
        }
    }
}

/// Events delivered to the scheduler from outside the pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// The bot joined a server
    Created(Group),
}

/// Result of one scheduler step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// The pass is no longer current; its task should exit
    Abandoned,
    /// The cursor moved past the last server
    Finished,
    /// A server was visited; wait this long before the next step
    Paced(Duration),
}

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Serialize)]
pub struct LoopStatus {
    pub state: LoopState,
    pub generation: u64,
    pub position: usize,
    pub size: usize,
    pub last_progress: DateTime<Utc>,
}

struct PassState {
    state: LoopState,
    generation: u64,
    cursor: PassCursor,
}

impl PassState {
    fn apply(&mut self, event: LoopEvent) {
        match self.state.next(event) {
            Some(next) => self.state = next,
            None => tracing::warn!(
                state = ?self.state,
                event = ?event,
                "Ignoring invalid scheduler transition"
            ),
        }
    }
}

// ============================================================================
// Scheduler
// ============================================================================

/// Walks all servers forever, one at a time
pub struct ReconciliationScheduler {
    me: Weak<Self>,
    servers: SharedServerRepository,
    reconciler: Arc<ServerReconciler>,
    config: ManagerConfig,
    clock: LivenessClock,
    generation: AtomicU64,
    pass: Mutex<PassState>,
}

impl ReconciliationScheduler {
    pub fn new(
        servers: SharedServerRepository,
        reconciler: Arc<ServerReconciler>,
        config: ManagerConfig,
        clock: LivenessClock,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            servers,
            reconciler,
            config,
            clock,
            generation: AtomicU64::new(0),
            pass: Mutex::new(PassState {
                state: LoopState::Idle,
                generation: 0,
                cursor: PassCursor::new(Vec::new()),
            }),
        })
    }

    /// Shared liveness clock
    pub fn clock(&self) -> &LivenessClock {
        &self.clock
    }

    /// Current pass generation
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Current state
    pub async fn state(&self) -> LoopState {
        self.pass.lock().await.state
    }

    /// Snapshot for status reporting
    pub async fn status(&self) -> LoopStatus {
        let pass = self.pass.lock().await;
        LoopStatus {
            state: pass.state,
            generation: pass.generation,
            position: pass.cursor.position(),
            size: pass.cursor.size(),
            last_progress: self.clock.last_progress(),
        }
    }

    /// Load and shuffle all servers into a fresh cursor
    ///
    /// Any pass still running is abandoned at its next step.
    pub async fn begin_pass(&self) -> Result<u64> {
        let mut servers = self
            .servers
            .find_all()
            .context("Failed to load servers for a new pass")?;

        let mut pass = self.pass.lock().await;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let mut rng = match self.config.shuffle_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed.wrapping_add(generation)),
            None => ChaCha8Rng::from_entropy(),
        };
        servers.shuffle(&mut rng);

        let size = servers.len();
        pass.cursor = PassCursor::new(servers);
        pass.generation = generation;
        pass.apply(LoopEvent::Start);
        self.clock.touch();
        drop(pass);

        metrics::record_pass_started(size);
        tracing::info!(generation, servers = size, "Starting reconciliation pass");
        Ok(generation)
    }

    /// Advance the pass and reconcile the server under the cursor
    pub async fn step(&self, generation: u64) -> StepResult {
        let (record, position, size) = {
            let mut pass = self.pass.lock().await;
            if pass.generation != generation || pass.state != LoopState::PassRunning {
                return StepResult::Abandoned;
            }

            self.clock.touch();
            pass.cursor.advance();
            pass.apply(LoopEvent::Advance);

            if pass.cursor.at_end() {
                pass.apply(LoopEvent::PassFinished);
                tracing::info!(generation, servers = pass.cursor.size(), "Reconciliation pass finished");
                return StepResult::Finished;
            }

            match pass.cursor.current() {
                Some(record) => (record.clone(), pass.cursor.position(), pass.cursor.size()),
                None => return StepResult::Finished,
            }
        };

        metrics::record_pass_position(position);
        tracing::debug!(
            "[{}/{}] {} updating invite",
            position,
            size.saturating_sub(1),
            record.identifier
        );

        let _timer = metrics::start_visit_timer();
        let delay = match self.reconciler.reconcile(&record).await {
            Ok(outcome) => {
                metrics::record_visit(outcome.as_str());
                tracing::debug!(server_id = %record.identifier, outcome = outcome.as_str(), "Server reconciled");
                if outcome.is_skipped() {
                    self.config.fast_retry()
                } else {
                    self.config.standard_wait()
                }
            }
            Err(e) if e.is_storage() => {
                metrics::record_visit("error");
                tracing::error!(server_id = %record.identifier, error = %e, "Failed to persist server");
                self.config.standard_wait()
            }
            Err(e) => {
                metrics::record_visit("error");
                tracing::warn!(
                    server_id = %record.identifier,
                    category = e.category().as_str(),
                    error = %e,
                    "Failed to reconcile server"
                );
                self.config.fast_retry()
            }
        };

        StepResult::Paced(delay)
    }

    /// Start a new pass and drive it in a background task
    pub async fn start(&self) -> Result<u64> {
        let Some(me) = self.me.upgrade() else {
            anyhow::bail!("Scheduler is shutting down");
        };

        let generation = self.begin_pass().await?;
        tokio::spawn(me.drive(generation));
        Ok(generation)
    }

    /// Stop all passes
    pub async fn stop(&self) {
        let mut pass = self.pass.lock().await;
        pass.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        pass.apply(LoopEvent::Stop);
        tracing::info!("Reconciliation scheduler stopped");
    }

    async fn quiet_elapsed(&self, generation: u64) -> bool {
        let mut pass = self.pass.lock().await;
        if pass.generation != generation {
            return false;
        }
        pass.apply(LoopEvent::QuietElapsed);
        true
    }

    async fn drive(self: Arc<Self>, mut generation: u64) {
        loop {
            loop {
                match self.step(generation).await {
                    StepResult::Abandoned => {
                        tracing::debug!(generation, "Pass abandoned");
                        return;
                    }
                    StepResult::Finished => break,
                    StepResult::Paced(delay) => tokio::time::sleep(delay).await,
                }
            }

            tokio::time::sleep(self.config.quiet_interval()).await;
            if !self.quiet_elapsed(generation).await {
                return;
            }

            generation = match self.begin_pass().await {
                Ok(next) => next,
                Err(e) => {
                    // Liveness goes stale, so the watchdog retries
                    tracing::error!(error = %e, "Failed to start the next pass");
                    return;
                }
            };
        }
    }

    /// Handle an event from outside the pass
    pub async fn handle_event(&self, event: ServerEvent) {
        match event {
            ServerEvent::Created(group) => {
                if let Err(e) = self.reconciler.check_new_server(&group).await {
                    tracing::error!(server_id = %group.id, error = %e, "Failed to check new server");
                }
            }
        }
    }

    /// Run the loop until shutdown
    ///
    /// Waits for the startup delay, starts the first pass, spawns the
    /// watchdog, then serves server events.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<ServerEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let delay = self.config.startup_delay();
        if !delay.is_zero() {
            tracing::info!(delay_secs = delay.as_secs(), "Delaying first reconciliation pass");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => return Ok(()),
            }
        }

        if let Err(e) = self.start().await {
            tracing::error!(error = %e, "Failed to start the first pass");
        }

        let watchdog = Watchdog::new(
            self.clock.clone(),
            self.config.liveness_threshold(),
            self.config.watchdog_poll(),
        );
        let watchdog_handle = watchdog.spawn(self.clone(), shutdown_rx.clone());

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    let me = self.clone();
                    tokio::spawn(async move { me.handle_event(event).await });
                }
                _ = shutdown_rx.changed() => {
                    break;
                }
            }
        }

        self.stop().await;
        watchdog_handle.await.ok();
        Ok(())
    }
}

#[async_trait]
impl PassRestarter for ReconciliationScheduler {
    async fn restart_pass(&self) -> Result<()> {
        self.start().await.map(|_| ())
    }
}
