//! Per-server validate / repair / disable protocol

use std::sync::Arc;

use super::error::{ReconcileError, ReconcileResult};
use super::selector::select_best_invite;
use super::throttle::{NotificationThrottle, NotifyOutcome};
use crate::models::{CreateInviteOptions, Group, ServerRecord};
use crate::remote::SharedRemoteClient;
use crate::storage::SharedServerRepository;

/// Why a server was skipped without touching its invite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Hidden from the listing
    Private,
    /// The bot no longer sees the server
    GroupUnavailable,
    /// The record was deleted while the server was being visited
    Removed,
}

/// Result of reconciling one server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing was checked
    Skipped(SkipReason),
    /// Stored state kept as is
    Unchanged,
    /// A new invite code was stored
    Updated(String),
    /// Invite cleared and listing hidden
    Disabled,
}

impl ReconcileOutcome {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped(SkipReason::Private) => "skipped_private",
            Self::Skipped(SkipReason::GroupUnavailable) => "skipped_unavailable",
            Self::Skipped(SkipReason::Removed) => "skipped_removed",
            Self::Unchanged => "unchanged",
            Self::Updated(_) => "updated",
            Self::Disabled => "disabled",
        }
    }

    /// Skipped visits are paced like failures
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Validates a server's stored invite and repairs it when needed
pub struct ServerReconciler {
    servers: SharedServerRepository,
    remote: SharedRemoteClient,
    throttle: Arc<NotificationThrottle>,
}

impl ServerReconciler {
    pub fn new(
        servers: SharedServerRepository,
        remote: SharedRemoteClient,
        throttle: Arc<NotificationThrottle>,
    ) -> Self {
        Self {
            servers,
            remote,
            throttle,
        }
    }

    /// Reconcile one server
    ///
    /// A valid invite leaves the store untouched. Every other path that
    /// reaches a decision persists the whole record.
    pub async fn reconcile(&self, record: &ServerRecord) -> ReconcileResult<ReconcileOutcome> {
        if record.is_private() {
            tracing::trace!(server_id = %record.identifier, "Skipping private server");
            return Ok(ReconcileOutcome::Skipped(SkipReason::Private));
        }

        let Some(group) = self.remote.get_group(&record.identifier).await? else {
            tracing::trace!(server_id = %record.identifier, "Server not available, skipping");
            return Ok(ReconcileOutcome::Skipped(SkipReason::GroupUnavailable));
        };

        if let Some(code) = record.usable_invite() {
            match self.remote.get_invite(code).await {
                Ok(invite) => {
                    let same_group = invite.group_id.as_deref().map_or(true, |id| id == group.id);
                    if same_group {
                        return Ok(ReconcileOutcome::Unchanged);
                    }
                    tracing::debug!(
                        server_id = %group.id,
                        invite_group = ?invite.group_id,
                        "Stored invite leads to another server"
                    );
                }
                Err(e) if e.is_invalid_invite() => {
                    tracing::debug!(server_id = %group.id, error = %e, "Stored invite is invalid or expired");
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.repair(record, &group).await
    }

    async fn repair(&self, record: &ServerRecord, group: &Group) -> ReconcileResult<ReconcileOutcome> {
        let invites = self.remote.get_invites(&group.id).await?;
        if let Some(best) = select_best_invite(&invites).filter(|i| !i.code.is_empty()) {
            return self.store_invite(record, group, &best.code);
        }

        let channel = group
            .default_channel
            .as_deref()
            .or(record.default_channel.as_deref());

        if let Some(channel) = channel {
            match self
                .remote
                .create_invite(channel, CreateInviteOptions { temporary: false })
                .await
            {
                Ok(invite) if !invite.code.is_empty() => {
                    return self.store_invite(record, group, &invite.code);
                }
                Ok(_) => {
                    tracing::warn!(server_id = %group.id, channel_id = %channel, "Created invite has no code");
                }
                Err(e) => {
                    tracing::debug!(
                        server_id = %group.id,
                        channel_id = %channel,
                        error = %e,
                        "Failed to create invite"
                    );
                }
            }
        }

        match self.throttle.check_and_notify(group).await? {
            NotifyOutcome::Sent | NotifyOutcome::Suppressed => {
                if !self.persist(record, group, ServerRecord::disable)? {
                    return Ok(ReconcileOutcome::Skipped(SkipReason::Removed));
                }
                tracing::info!(server_id = %group.id, "No usable invite, server disabled");
                Ok(ReconcileOutcome::Disabled)
            }
            NotifyOutcome::Aborted => Ok(ReconcileOutcome::Unchanged),
        }
    }

    fn store_invite(
        &self,
        record: &ServerRecord,
        group: &Group,
        code: &str,
    ) -> ReconcileResult<ReconcileOutcome> {
        if !self.persist(record, group, |server| server.apply_invite(code))? {
            return Ok(ReconcileOutcome::Skipped(SkipReason::Removed));
        }
        tracing::info!(server_id = %group.id, name = %group.name, code = %code, "Invite code updated");
        Ok(ReconcileOutcome::Updated(code.to_string()))
    }

    /// Reload the record, apply `mutate`, and save the whole record
    ///
    /// Returns `false` without saving when the record no longer exists.
    fn persist(
        &self,
        record: &ServerRecord,
        group: &Group,
        mutate: impl FnOnce(&mut ServerRecord),
    ) -> ReconcileResult<bool> {
        let Some(mut current) = self
            .servers
            .find_by_identifier(&record.identifier)
            .map_err(ReconcileError::Storage)?
        else {
            tracing::debug!(server_id = %record.identifier, "Record removed during visit, not saving");
            return Ok(false);
        };

        current.refresh_from(group);
        mutate(&mut current);

        self.servers
            .save(&current)
            .map_err(ReconcileError::Storage)?;
        Ok(true)
    }

    /// Handle a server the bot just joined
    ///
    /// Servers that already hold an enabled record with an invite are left
    /// alone; otherwise the owner is asked for an invite through the
    /// throttle. Returns `None` when skipped.
    pub async fn check_new_server(&self, group: &Group) -> ReconcileResult<Option<NotifyOutcome>> {
        let existing = self
            .servers
            .find_by_identifier(&group.id)
            .map_err(ReconcileError::Storage)?;

        if let Some(server) = existing {
            if server.enabled && server.usable_invite().is_some() {
                tracing::debug!(server_id = %group.id, "New server already has an invite");
                return Ok(None);
            }
        }

        let outcome = self.throttle.check_and_notify(group).await?;
        tracing::info!(server_id = %group.id, outcome = outcome.as_str(), "Checked new server");
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;
    use crate::manager::error::ThrottleError;
    use crate::models::{InviteUpdate, Invitation, Visibility};
    use crate::notifications::MessageRenderer;
    use crate::remote::{MockRemoteClient, RemoteCall, RemoteError};
    use crate::storage::{InviteUpdateRepository, MockInviteUpdateRepository, MockServerRepository};
    use chrono::Duration;

    struct Fixture {
        servers: Arc<MockServerRepository>,
        updates: Arc<MockInviteUpdateRepository>,
        remote: Arc<MockRemoteClient>,
        reconciler: ServerReconciler,
    }

    fn fixture(remote: MockRemoteClient, servers: Vec<ServerRecord>) -> Fixture {
        let servers = Arc::new(MockServerRepository::with_servers(servers));
        let updates = Arc::new(MockInviteUpdateRepository::new());
        let remote = Arc::new(remote);
        let renderer = Arc::new(MessageRenderer::new(&NotificationConfig::default()).unwrap());
        let throttle = Arc::new(NotificationThrottle::new(
            updates.clone(),
            remote.clone(),
            renderer,
            Duration::days(15),
        ));
        let reconciler = ServerReconciler::new(servers.clone(), remote.clone(), throttle);
        Fixture {
            servers,
            updates,
            remote,
            reconciler,
        }
    }

    fn group() -> Group {
        Group::new("1", "Rust Lounge", "42")
    }

    fn record() -> ServerRecord {
        ServerRecord::new("1", "Rust Lounge", "42").with_invite("dead")
    }

    #[tokio::test]
    async fn test_private_server_skipped_without_remote_calls() {
        let private = record().with_visibility(Visibility::Private);
        let f = fixture(MockRemoteClient::new().with_group(group()), vec![private.clone()]);

        let outcome = f.reconciler.reconcile(&private).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::Private));
        assert_eq!(f.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unavailable_group_skipped() {
        let f = fixture(MockRemoteClient::new(), vec![record()]);

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::GroupUnavailable));
        assert_eq!(f.remote.calls(), vec![RemoteCall::GetGroup("1".into())]);
    }

    #[tokio::test]
    async fn test_valid_invite_leaves_store_untouched() {
        let valid = ServerRecord::new("1", "Rust Lounge", "42").with_invite("alive");
        let remote = MockRemoteClient::new()
            .with_group(group())
            .with_valid_invite(Invitation::new("alive", "10", "general").for_group("1"));
        let f = fixture(remote, vec![valid.clone()]);

        let outcome = f.reconciler.reconcile(&valid).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(f.servers.save_count(), 0);
    }

    #[tokio::test]
    async fn test_invite_for_other_group_is_repaired() {
        let stolen = ServerRecord::new("1", "Rust Lounge", "42").with_invite("elsewhere");
        let remote = MockRemoteClient::new()
            .with_group(group())
            .with_valid_invite(Invitation::new("elsewhere", "99", "general").for_group("2"))
            .with_group_invites("1", vec![Invitation::new("mine", "10", "general")]);
        let f = fixture(remote, vec![stolen.clone()]);

        let outcome = f.reconciler.reconcile(&stolen).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Updated("mine".into()));
    }

    #[tokio::test]
    async fn test_invalid_invite_replaced_with_general() {
        let remote = MockRemoteClient::new().with_group(group()).with_group_invites(
            "1",
            vec![
                Invitation::new("lobby1", "11", "lobby"),
                Invitation::new("gen1", "10", "general"),
            ],
        );
        let mut disabled = record();
        disabled.enabled = false;
        let f = fixture(remote, vec![disabled.clone()]);

        let outcome = f.reconciler.reconcile(&disabled).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Updated("gen1".into()));
        let stored = f.servers.get("1").unwrap();
        assert_eq!(stored.invite_code.as_deref(), Some("gen1"));
        assert!(stored.enabled);
    }

    #[tokio::test]
    async fn test_missing_token_goes_straight_to_repair() {
        let empty = ServerRecord::new("1", "Rust Lounge", "42");
        let remote = MockRemoteClient::new()
            .with_group(group())
            .with_group_invites("1", vec![Invitation::new("gen1", "10", "general")]);
        let f = fixture(remote, vec![empty.clone()]);

        f.reconciler.reconcile(&empty).await.unwrap();

        assert!(!f
            .remote
            .calls()
            .iter()
            .any(|c| matches!(c, RemoteCall::GetInvite(_))));
    }

    #[tokio::test]
    async fn test_creates_invite_in_default_channel() {
        let remote = MockRemoteClient::new()
            .with_group(group().with_default_channel("10"))
            .with_creatable_invite("10", Invitation::new("fresh", "10", "welcome"));
        let f = fixture(remote, vec![record()]);

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Updated("fresh".into()));
        let stored = f.servers.get("1").unwrap();
        assert_eq!(stored.default_channel.as_deref(), Some("10"));
        assert!(f.remote.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_record_channel_used_when_group_has_none() {
        let with_channel = record().with_default_channel("20");
        let remote = MockRemoteClient::new()
            .with_group(group())
            .with_creatable_invite("20", Invitation::new("fresh", "20", "welcome"));
        let f = fixture(remote, vec![with_channel.clone()]);

        let outcome = f.reconciler.reconcile(&with_channel).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Updated("fresh".into()));
    }

    #[tokio::test]
    async fn test_creation_failure_falls_back_to_owner() {
        let remote = MockRemoteClient::new().with_group(group().with_default_channel("10"));
        let f = fixture(remote, vec![record()]);

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Disabled);
        assert_eq!(f.remote.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_created_invite_without_code_falls_back_to_owner() {
        let remote = MockRemoteClient::new()
            .with_group(group().with_default_channel("10"))
            .with_creatable_invite("10", Invitation::new("", "10", "x"));
        let f = fixture(remote, vec![record()]);

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Disabled);
        assert!(f
            .remote
            .calls()
            .contains(&RemoteCall::CreateInvite("10".into())));
        assert_eq!(f.remote.sent_messages().len(), 1);
        let stored = f.servers.get("1").unwrap();
        assert!(stored.invite_code.is_none());
        assert!(!stored.enabled);
    }

    #[tokio::test]
    async fn test_no_channel_notifies_owner_and_disables() {
        let f = fixture(MockRemoteClient::new().with_group(group()), vec![record()]);

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Disabled);
        let stored = f.servers.get("1").unwrap();
        assert!(stored.invite_code.is_none());
        assert!(!stored.enabled);
        assert_eq!(f.remote.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_suppressed_notification_still_disables() {
        let f = fixture(MockRemoteClient::new().with_group(group()), vec![record()]);
        f.updates.insert(&InviteUpdate::new("1")).unwrap();

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Disabled);
        assert!(f.remote.sent_messages().is_empty());
        assert!(!f.servers.get("1").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_aborted_notification_leaves_record() {
        let f = fixture(MockRemoteClient::new().with_group(group()), vec![record()]);
        f.updates.set_fail_inserts(true);

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert_eq!(f.servers.save_count(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_error_without_mutation() {
        let f = fixture(MockRemoteClient::new().with_group(group()), vec![record()]);
        f.remote.set_unavailable(true);

        let err = f.reconciler.reconcile(&record()).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Remote(RemoteError::ServerError(503))));
        assert!(!err.is_storage());
        assert_eq!(f.servers.save_count(), 0);
    }

    #[tokio::test]
    async fn test_save_failure_is_storage_error() {
        let remote = MockRemoteClient::new()
            .with_group(group())
            .with_group_invites("1", vec![Invitation::new("gen1", "10", "general")]);
        let f = fixture(remote, vec![record()]);
        f.servers.set_fail_saves(true);

        let err = f.reconciler.reconcile(&record()).await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_record_removed_during_visit_is_not_recreated() {
        let remote = MockRemoteClient::new()
            .with_group(group())
            .with_group_invites("1", vec![Invitation::new("gen1", "10", "general")]);
        let f = fixture(remote, Vec::new());

        let outcome = f.reconciler.reconcile(&record()).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::Removed));
        assert_eq!(f.servers.save_count(), 0);
        assert!(f.servers.get("1").is_none());
    }

    #[tokio::test]
    async fn test_repair_refreshes_group_fields() {
        let renamed = Group::new("1", "Rust Lounge 2", "43");
        let remote = MockRemoteClient::new()
            .with_group(renamed)
            .with_group_invites("1", vec![Invitation::new("gen1", "10", "general")]);
        let f = fixture(remote, vec![record()]);

        f.reconciler.reconcile(&record()).await.unwrap();

        let stored = f.servers.get("1").unwrap();
        assert_eq!(stored.name, "Rust Lounge 2");
        assert_eq!(stored.owner_id, "43");
    }

    #[tokio::test]
    async fn test_new_server_with_invite_is_skipped() {
        let existing = ServerRecord::new("1", "Rust Lounge", "42").with_invite("alive");
        let f = fixture(MockRemoteClient::new(), vec![existing]);

        let outcome = f.reconciler.check_new_server(&group()).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(f.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_new_server_without_invite_notifies_owner() {
        let f = fixture(MockRemoteClient::new(), Vec::new());

        let outcome = f.reconciler.check_new_server(&group()).await.unwrap();

        assert_eq!(outcome, Some(NotifyOutcome::Sent));
        assert_eq!(f.remote.sent_messages().len(), 1);
    }

    #[tokio::test]
    async fn test_new_server_without_identifier() {
        let f = fixture(MockRemoteClient::new(), Vec::new());

        let err = f
            .reconciler
            .check_new_server(&Group::new("", "Nameless", "42"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ReconcileError::Throttle(ThrottleError::MissingIdentifier)
        ));
    }
}
