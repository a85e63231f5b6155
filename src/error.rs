//! Error classification for the invitekeeper crate
//!
//! Each module keeps its own `thiserror` enum. This module gives them a
//! shared [`ErrorCategory`] so the loop can log failed visits by kind.
//!
//! # Usage
//!
//! ```rust,ignore
//! use invitekeeper::error::KeeperErrorTrait;
//!
//! tracing::warn!(category = err.category().as_str(), error = %err, "Visit failed");
//! ```

pub use crate::manager::error::{ReconcileError, ThrottleError};
pub use crate::remote::RemoteError;

/// Common trait for invitekeeper error types
pub trait KeeperErrorTrait: std::error::Error {
    /// Get the error category for logging and metrics
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Remote service errors (HTTP, timeout, rate limit)
    Network,
    /// Invite codes that no longer work
    Invite,
    /// Storage errors
    Storage,
    /// Configuration errors
    Config,
    /// Broken internal invariants
    Invariant,
}

impl ErrorCategory {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Invite => "invite",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Invariant => "invariant",
        }
    }
}

impl KeeperErrorTrait for RemoteError {
    fn category(&self) -> ErrorCategory {
        if self.is_invalid_invite() {
            ErrorCategory::Invite
        } else if matches!(self, Self::InvalidUrl(_)) {
            ErrorCategory::Config
        } else {
            ErrorCategory::Network
        }
    }
}

impl KeeperErrorTrait for ThrottleError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingIdentifier => ErrorCategory::Invariant,
            Self::Storage(_) => ErrorCategory::Storage,
        }
    }
}

impl KeeperErrorTrait for ReconcileError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Remote(e) => e.category(),
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Throttle(e) => e.category(),
        }
    }
}
