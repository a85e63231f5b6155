//! invitekeeper - Invite link maintenance for listed chat servers
//!
//! Walks every listed server forever, checks that its stored invite still
//! works, and repairs it from the server's own invites, a freshly created
//! one, or by asking the owner.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Server records, invitations, throttle records
//! - [`remote`] - Chat service client trait, HTTP and mock implementations
//! - [`storage`] - Repositories (SQLite and in-memory)
//! - [`manager`] - Reconciliation loop: cursor, selector, throttle, reconciler, scheduler, watchdog
//! - [`commands`] - Manual invite correction
//! - [`notifications`] - Owner message templates
//! - [`status`] - Health, metrics and event endpoints
//! - [`metrics`] - Prometheus metrics
//! - [`utils`] - Retry helpers and text utilities
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use invitekeeper::config::Config;
//! use invitekeeper::manager::InviteManager;
//! use invitekeeper::remote::HttpRemoteClient;
//! use invitekeeper::storage::create_sqlite_repositories;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let (servers, updates) = create_sqlite_repositories(&config.database.sqlite_path)?;
//!     let remote = Arc::new(HttpRemoteClient::new(&config.remote)?);
//!     let manager = InviteManager::new(&config, servers, updates, remote)?;
//!     manager.scheduler.start().await?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod remote;
pub mod status;
pub mod storage;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::commands::{ManualUpdate, UpdateReply};
    pub use crate::config::Config;
    pub use crate::error::{ErrorCategory, KeeperErrorTrait};
    pub use crate::manager::{
        InviteManager, LivenessClock, ReconcileOutcome, ReconciliationScheduler, ServerEvent,
        ServerReconciler,
    };
    pub use crate::models::{Group, Invitation, InviteUpdate, ServerRecord, Visibility};
    pub use crate::remote::{HttpRemoteClient, RemoteClient};
    pub use crate::storage::{InviteUpdateRepository, ServerRepository, SqliteRepository};
}

// Direct re-exports for convenience
pub use models::{Group, Invitation, InviteUpdate, ServerRecord, Visibility};
