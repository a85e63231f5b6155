//! Invite reconciliation loop
//!
//! This module walks every known server forever, checks that the stored
//! invite still works, and repairs or disables it when it does not.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  ReconciliationScheduler                     │
//! │   Idle ──Start──▶ PassRunning ──PassFinished──▶ PassDone     │
//! │                      ▲    │                        │         │
//! │                      └────┴──────QuietElapsed──────┘         │
//! └────────┬──────────────────────┬──────────────────────────────┘
//!          │ advance              │ reconcile(current)
//!          ▼                      ▼
//!   ┌─────────────┐      ┌──────────────────┐      ┌──────────────┐
//!   │ PassCursor  │      │ ServerReconciler │─────▶│   Selector   │
//!   └─────────────┘      └────────┬─────────┘      └──────────────┘
//!                                 │ no usable invite
//!                                 ▼
//!                       ┌──────────────────────┐
//!                       │ NotificationThrottle │
//!                       └──────────────────────┘
//!
//!   ┌──────────┐  reads   ┌───────────────┐  restart_pass()
//!   │ Watchdog │────────▶ │ LivenessClock │ ◀──── touched by scheduler
//!   └──────────┘          └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cursor`] - Position marker over the pass snapshot
//! - [`selector`] - Invite selection heuristic
//! - [`throttle`] - Owner notification cooldown
//! - [`reconciler`] - Validate, repair, or disable one server
//! - [`scheduler`] - Pass state machine and pacing
//! - [`watchdog`] - Liveness monitoring and forced restarts
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```ignore
//! use invitekeeper::manager::InviteManager;
//!
//! let manager = InviteManager::new(&config, servers, updates, remote)?;
//! let (events_tx, events_rx) = tokio::sync::mpsc::channel(64);
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! tokio::spawn(manager.scheduler.clone().run(events_rx, shutdown_rx));
//! ```

pub mod cursor;
pub mod error;
pub mod reconciler;
pub mod scheduler;
pub mod selector;
pub mod throttle;
pub mod watchdog;

use anyhow::Result;
use std::sync::Arc;

use crate::config::Config;
use crate::notifications::MessageRenderer;
use crate::remote::SharedRemoteClient;
use crate::storage::{SharedInviteUpdateRepository, SharedServerRepository};

pub use cursor::PassCursor;
pub use error::{ReconcileError, ReconcileResult, ThrottleError};
pub use reconciler::{ReconcileOutcome, ServerReconciler, SkipReason};
pub use scheduler::{
    LoopEvent, LoopState, LoopStatus, ReconciliationScheduler, ServerEvent, StepResult,
};
pub use selector::select_best_invite;
pub use throttle::{NotificationThrottle, NotifyOutcome};
pub use watchdog::{LivenessClock, PassRestarter, Watchdog};

/// Fully wired reconciliation loop
pub struct InviteManager {
    pub scheduler: Arc<ReconciliationScheduler>,
    pub reconciler: Arc<ServerReconciler>,
    pub clock: LivenessClock,
}

impl InviteManager {
    /// Wire the loop from configuration and its collaborators
    pub fn new(
        config: &Config,
        servers: SharedServerRepository,
        updates: SharedInviteUpdateRepository,
        remote: SharedRemoteClient,
    ) -> Result<Self> {
        let renderer = Arc::new(MessageRenderer::new(&config.notifications)?);
        let throttle = Arc::new(NotificationThrottle::new(
            updates,
            remote.clone(),
            renderer,
            config.notifications.cooldown(),
        ));
        let reconciler = Arc::new(ServerReconciler::new(servers.clone(), remote, throttle));
        let clock = LivenessClock::new();
        let scheduler = ReconciliationScheduler::new(
            servers,
            reconciler.clone(),
            config.manager.clone(),
            clock.clone(),
        );

        Ok(Self {
            scheduler,
            reconciler,
            clock,
        })
    }
}
