//! Remote chat service access
//!
//! The reconciliation loop talks to the chat service through the
//! [`RemoteClient`] trait. [`http::HttpRemoteClient`] implements it against a
//! Discord-style REST API; [`mock::MockRemoteClient`] is a scripted in-memory
//! implementation for tests and dry runs.
//!
//! # Error classification
//!
//! | Error | Meaning for the loop |
//! |-------|----------------------|
//! | `InviteNotFound`, `InvalidInvite` | stored token is dead, repair it |
//! | `RateLimited`, `ServerError`, `Timeout`, `Http` | transient, fast retry next visit |
//! | everything else | rejected call, fast retry next visit |

pub mod http;
pub mod mock;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::{CreateInviteOptions, Group, Invitation};

pub use http::HttpRemoteClient;
pub use mock::{MockRemoteClient, RemoteCall};

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Errors returned by the remote chat service
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Invite code does not exist or has expired
    #[error("Invite not found: {0}")]
    InviteNotFound(String),

    /// Invite exists but cannot be used for this server
    #[error("Invalid invite: {0}")]
    InvalidInvite(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Missing permissions or unexpected status
    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl RemoteError {
    /// Check if the error means the stored invite is no longer usable
    pub fn is_invalid_invite(&self) -> bool {
        matches!(self, Self::InviteNotFound(_) | Self::InvalidInvite(_))
    }

    /// Check if the error is transient and worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::ServerError(_) | Self::Timeout => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Capabilities the reconciliation loop needs from the chat service
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Look up a server the bot is a member of; `None` when it is gone
    async fn get_group(&self, group_id: &str) -> RemoteResult<Option<Group>>;

    /// Resolve an invite code
    async fn get_invite(&self, code: &str) -> RemoteResult<Invitation>;

    /// List all invites of a server
    async fn get_invites(&self, group_id: &str) -> RemoteResult<Vec<Invitation>>;

    /// Create an invite in a channel
    async fn create_invite(
        &self,
        channel_id: &str,
        options: CreateInviteOptions,
    ) -> RemoteResult<Invitation>;

    /// Send a direct message to a user
    async fn send_message(&self, recipient_id: &str, text: &str) -> RemoteResult<()>;
}

/// Thread-safe shared remote client
pub type SharedRemoteClient = Arc<dyn RemoteClient>;
