//! Owner notification throttle
//!
//! An owner is asked for a new invite at most once per cooldown window. The
//! history lives in the invite update repository so it survives restarts.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::ThrottleError;
use crate::metrics;
use crate::models::{Group, InviteUpdate};
use crate::notifications::MessageRenderer;
use crate::remote::SharedRemoteClient;
use crate::storage::SharedInviteUpdateRepository;

/// Result of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// A fresh record was stored and the message handed to the remote
    Sent,
    /// The owner was asked recently; nothing sent
    Suppressed,
    /// The record could not be stored; nothing sent
    Aborted,
}

impl NotifyOutcome {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Suppressed => "suppressed",
            Self::Aborted => "aborted",
        }
    }
}

/// Decides whether an owner may be messaged and sends the message
///
/// Checks run one at a time, so the pass and server events never both see
/// an empty history for the same server.
pub struct NotificationThrottle {
    updates: SharedInviteUpdateRepository,
    remote: SharedRemoteClient,
    renderer: Arc<MessageRenderer>,
    cooldown: chrono::Duration,
    gate: Mutex<()>,
}

impl NotificationThrottle {
    pub fn new(
        updates: SharedInviteUpdateRepository,
        remote: SharedRemoteClient,
        renderer: Arc<MessageRenderer>,
        cooldown: chrono::Duration,
    ) -> Self {
        Self {
            updates,
            remote,
            renderer,
            cooldown,
            gate: Mutex::new(()),
        }
    }

    /// Cooldown between two messages about the same server
    pub fn cooldown(&self) -> chrono::Duration {
        self.cooldown
    }

    /// Ask the owner of `group` for a new invite unless asked recently
    ///
    /// Records older than the cooldown are removed on the way. Sends at most
    /// one message per call.
    pub async fn check_and_notify(&self, group: &Group) -> Result<NotifyOutcome, ThrottleError> {
        if group.id.is_empty() {
            tracing::error!(
                group_name = %group.name,
                "Refusing to notify owner of a group without identifier"
            );
            return Err(ThrottleError::MissingIdentifier);
        }

        let _guard = self.gate.lock().await;
        let records = self
            .updates
            .find_by_server(&group.id)
            .map_err(ThrottleError::Storage)?;

        let cutoff = Utc::now() - self.cooldown;
        for record in &records {
            if !record.is_expired(cutoff) {
                tracing::debug!(
                    server_id = %group.id,
                    asked_at = %record.inserted_at,
                    "Owner asked recently, suppressing notification"
                );
                metrics::record_notification(NotifyOutcome::Suppressed.as_str());
                return Ok(NotifyOutcome::Suppressed);
            }

            self.updates.remove(record).map_err(ThrottleError::Storage)?;
            tracing::debug!(server_id = %group.id, record_id = %record.id, "Removed stale throttle record");
        }

        let outcome = self.notify(group).await;
        metrics::record_notification(outcome.as_str());
        Ok(outcome)
    }

    async fn notify(&self, group: &Group) -> NotifyOutcome {
        if let Err(e) = self.updates.insert(&InviteUpdate::new(group.id.clone())) {
            tracing::error!(
                server_id = %group.id,
                error = %e,
                "Failed to store throttle record, not notifying owner"
            );
            return NotifyOutcome::Aborted;
        }

        let text = match self.renderer.update_request(group) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(server_id = %group.id, error = %e, "Failed to render update request");
                return NotifyOutcome::Sent;
            }
        };

        match self.remote.send_message(&group.owner_id, &text).await {
            Ok(()) => {
                tracing::info!(
                    server_id = %group.id,
                    owner_id = %group.owner_id,
                    "Asked owner for a new invite"
                );
            }
            Err(e) => {
                tracing::warn!(
                    server_id = %group.id,
                    owner_id = %group.owner_id,
                    error = %e,
                    "Failed to deliver update request"
                );
            }
        }

        NotifyOutcome::Sent
    }
}
