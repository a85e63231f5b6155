//! Core data structures for invitekeeper
//!
//! This module contains the records the reconciliation loop reads and
//! writes, plus the transient views of the remote chat service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Listing visibility of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Listed publicly; invites are maintained
    #[default]
    Public,
    /// Hidden from the listing; the loop never touches it
    Private,
}

impl Visibility {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Stored visibility value that is neither `public` nor `private`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown visibility: {0}")]
pub struct ParseVisibilityError(pub String);

impl std::str::FromStr for Visibility {
    type Err = ParseVisibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(ParseVisibilityError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored record for a listed server
///
/// A record is either disabled (no usable invite) or carries an invite code
/// that was valid the last time it was checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRecord {
    /// Server identifier in the remote service
    pub identifier: String,

    /// Display name
    pub name: String,

    /// Owner user identifier
    pub owner_id: String,

    /// Current invite code, if any
    pub invite_code: Option<String>,

    /// Whether the server is shown in the listing
    pub enabled: bool,

    /// Listing visibility
    #[serde(default)]
    pub visibility: Visibility,

    /// Channel to create invites in when none exist
    pub default_channel: Option<String>,
}

impl ServerRecord {
    /// Create a new enabled, public record without an invite
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            invite_code: None,
            enabled: true,
            visibility: Visibility::Public,
            default_channel: None,
        }
    }

    /// Set the invite code
    pub fn with_invite(mut self, code: impl Into<String>) -> Self {
        self.invite_code = Some(code.into());
        self
    }

    /// Set the visibility
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Set the default channel
    pub fn with_default_channel(mut self, channel: impl Into<String>) -> Self {
        self.default_channel = Some(channel.into());
        self
    }

    /// Check if the record is hidden from the listing
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Get the invite code when it is present and non-empty
    pub fn usable_invite(&self) -> Option<&str> {
        self.invite_code.as_deref().filter(|code| !code.is_empty())
    }

    /// Store a working invite and re-enable the listing
    pub fn apply_invite(&mut self, code: impl Into<String>) {
        self.invite_code = Some(code.into());
        self.enabled = true;
    }

    /// Clear the invite and hide the listing
    pub fn disable(&mut self) {
        self.invite_code = None;
        self.enabled = false;
    }

    /// Refresh the fields mirrored from the live group
    pub fn refresh_from(&mut self, group: &Group) {
        self.name = group.name.clone();
        self.owner_id = group.owner_id.clone();
        if group.default_channel.is_some() {
            self.default_channel = group.default_channel.clone();
        }
    }
}

/// Live view of a server in the remote service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Server identifier
    pub id: String,

    /// Display name
    pub name: String,

    /// Owner user identifier
    pub owner_id: String,

    /// Default channel identifier
    #[serde(default)]
    pub default_channel: Option<String>,
}

impl Group {
    /// Create a group without a default channel
    pub fn new(id: impl Into<String>, name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            owner_id: owner_id.into(),
            default_channel: None,
        }
    }

    /// Set the default channel
    pub fn with_default_channel(mut self, channel: impl Into<String>) -> Self {
        self.default_channel = Some(channel.into());
        self
    }
}

/// Channel an invitation was issued for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteChannel {
    pub id: String,
    pub name: String,
}

/// Invitation fetched from the remote service
///
/// Never persisted; only `code` is copied into a [`ServerRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    /// Invite code
    pub code: String,

    /// Grants temporary membership only
    #[serde(default)]
    pub temporary: bool,

    /// Revoked by a moderator
    #[serde(default)]
    pub revoked: bool,

    /// Issuing channel
    pub channel: InviteChannel,

    /// Server the invite leads to, when reported
    #[serde(default)]
    pub group_id: Option<String>,
}

impl Invitation {
    /// Create a permanent, non-revoked invitation
    pub fn new(code: impl Into<String>, channel_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            temporary: false,
            revoked: false,
            channel: InviteChannel {
                id: channel_id.into(),
                name: channel_name.into(),
            },
            group_id: None,
        }
    }

    /// Mark as temporary
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Mark as revoked
    pub fn revoked(mut self) -> Self {
        self.revoked = true;
        self
    }

    /// Set the server the invite belongs to
    pub fn for_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Temporary or revoked invites are only accepted as a fallback
    pub fn is_degraded(&self) -> bool {
        self.temporary || self.revoked
    }
}

/// Options for invite creation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateInviteOptions {
    pub temporary: bool,
}

/// Persisted marker that an owner was asked for a new invite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteUpdate {
    /// Record identifier
    pub id: String,

    /// Server the request was about
    pub server_id: String,

    /// When the request was sent
    pub inserted_at: DateTime<Utc>,
}

impl InviteUpdate {
    /// Create a record stamped now
    pub fn new(server_id: impl Into<String>) -> Self {
        Self::at(server_id, Utc::now())
    }

    /// Create a record with an explicit insertion time
    pub fn at(server_id: impl Into<String>, inserted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            server_id: server_id.into(),
            inserted_at,
        }
    }

    /// Check whether the cooldown that started with this record is over
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        self.inserted_at <= cutoff
    }
}
