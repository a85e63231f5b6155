//! Scripted in-memory remote client
//!
//! Records every call it receives so tests can assert on remote traffic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use super::{RemoteClient, RemoteError, RemoteResult};
use crate::models::{CreateInviteOptions, Group, Invitation};

/// A call received by [`MockRemoteClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    GetGroup(String),
    GetInvite(String),
    GetInvites(String),
    CreateInvite(String),
    SendMessage(String),
}

/// A direct message sent through [`MockRemoteClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient_id: String,
    pub text: String,
}

/// Mock remote client with scripted responses
#[derive(Default)]
pub struct MockRemoteClient {
    groups: RwLock<HashMap<String, Group>>,
    valid_invites: RwLock<HashMap<String, Invitation>>,
    group_invites: RwLock<HashMap<String, Vec<Invitation>>>,
    creatable: RwLock<HashMap<String, Invitation>>,
    calls: RwLock<Vec<RemoteCall>>,
    sent: RwLock<Vec<SentMessage>>,
    unavailable: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockRemoteClient {
    /// Create an empty mock
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live group
    pub fn with_group(self, group: Group) -> Self {
        self.groups.write().unwrap().insert(group.id.clone(), group);
        self
    }

    /// Register an invite code that resolves successfully
    pub fn with_valid_invite(self, invite: Invitation) -> Self {
        self.valid_invites
            .write()
            .unwrap()
            .insert(invite.code.clone(), invite);
        self
    }

    /// Set the invites listed for a group
    pub fn with_group_invites(self, group_id: &str, invites: Vec<Invitation>) -> Self {
        self.group_invites
            .write()
            .unwrap()
            .insert(group_id.to_string(), invites);
        self
    }

    /// Allow invite creation in a channel, returning `invite`
    pub fn with_creatable_invite(self, channel_id: &str, invite: Invitation) -> Self {
        self.creatable
            .write()
            .unwrap()
            .insert(channel_id.to_string(), invite);
        self
    }

    /// Make every call fail with a 503
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make message delivery fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// All calls received so far
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    /// Messages delivered so far
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.read().unwrap().clone()
    }

    /// Forget recorded calls and messages
    pub fn clear_history(&self) {
        self.calls.write().unwrap().clear();
        self.sent.write().unwrap().clear();
    }

    fn record(&self, call: RemoteCall) -> RemoteResult<()> {
        self.calls.write().unwrap().push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::ServerError(503));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteClient for MockRemoteClient {
    async fn get_group(&self, group_id: &str) -> RemoteResult<Option<Group>> {
        self.record(RemoteCall::GetGroup(group_id.to_string()))?;
        Ok(self.groups.read().unwrap().get(group_id).cloned())
    }

    async fn get_invite(&self, code: &str) -> RemoteResult<Invitation> {
        self.record(RemoteCall::GetInvite(code.to_string()))?;
        self.valid_invites
            .read()
            .unwrap()
            .get(code)
            .cloned()
            .ok_or_else(|| RemoteError::InviteNotFound(code.to_string()))
    }

    async fn get_invites(&self, group_id: &str) -> RemoteResult<Vec<Invitation>> {
        self.record(RemoteCall::GetInvites(group_id.to_string()))?;
        Ok(self
            .group_invites
            .read()
            .unwrap()
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_invite(
        &self,
        channel_id: &str,
        _options: CreateInviteOptions,
    ) -> RemoteResult<Invitation> {
        self.record(RemoteCall::CreateInvite(channel_id.to_string()))?;
        self.creatable
            .read()
            .unwrap()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| RemoteError::Rejected {
                status: 403,
                body: "Missing Permissions".to_string(),
            })
    }

    async fn send_message(&self, recipient_id: &str, text: &str) -> RemoteResult<()> {
        self.record(RemoteCall::SendMessage(recipient_id.to_string()))?;
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected {
                status: 403,
                body: "Cannot send messages to this user".to_string(),
            });
        }
        self.sent.write().unwrap().push(SentMessage {
            recipient_id: recipient_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}
