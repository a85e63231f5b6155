//! Commands handled outside the reconciliation loop

pub mod update;

use thiserror::Error;

use crate::remote::RemoteError;

pub use update::{ManualUpdate, UpdateReply};

/// Command handling errors
#[derive(Error, Debug)]
pub enum CommandError {
    /// Remote service call failed
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// Record could not be loaded or saved
    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),
}
