//! Manual invite correction
//!
//! Owners reply to the update request with
//! `update <server id> <invite url>` in a private message. The command
//! checks ownership against the live server and stores the code directly,
//! bypassing the loop.

use regex::Regex;
use std::sync::LazyLock;

use super::CommandError;
use crate::metrics;
use crate::models::ServerRecord;
use crate::remote::SharedRemoteClient;
use crate::storage::SharedServerRepository;

static UPDATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^update (\d+) <?https?://(?:discord\.gg|discordapp\.com/invite)/([A-Za-z0-9]+)>?$",
    )
    .unwrap()
});

/// Reply to a manual update attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReply {
    /// Not a private message, or not an update command
    Ignored,
    /// The bot does not know the server
    BadServerId,
    /// Author does not own the server
    NotOwner,
    /// The code was stored
    Updated { name: String, code: String },
}

impl UpdateReply {
    /// Text to send back, if any
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Ignored => None,
            Self::BadServerId => Some("Bad server id".to_string()),
            Self::NotOwner => Some("You aren't the owner of this server.".to_string()),
            Self::Updated { name, code } => {
                Some(format!("Updating {name} with new invite code: {code}"))
            }
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::BadServerId => "bad_server_id",
            Self::NotOwner => "not_owner",
            Self::Updated { .. } => "applied",
        }
    }
}

/// Parse `update <id> <url>`; returns the server id and invite code
pub fn parse_update(text: &str) -> Option<(&str, &str)> {
    let caps = UPDATE_REGEX.captures(text)?;
    Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}

/// Handles owner-submitted invite corrections
pub struct ManualUpdate {
    servers: SharedServerRepository,
    remote: SharedRemoteClient,
}

impl ManualUpdate {
    pub fn new(servers: SharedServerRepository, remote: SharedRemoteClient) -> Self {
        Self { servers, remote }
    }

    /// Handle a message from `author_id`
    pub async fn handle(
        &self,
        author_id: &str,
        text: &str,
        is_private_message: bool,
    ) -> Result<UpdateReply, CommandError> {
        if !is_private_message {
            return Ok(UpdateReply::Ignored);
        }
        let Some((server_id, code)) = parse_update(text) else {
            return Ok(UpdateReply::Ignored);
        };

        let reply = self.apply(author_id, server_id, code).await?;
        metrics::record_manual_update(reply.as_str());
        Ok(reply)
    }

    async fn apply(
        &self,
        author_id: &str,
        server_id: &str,
        code: &str,
    ) -> Result<UpdateReply, CommandError> {
        let Some(group) = self.remote.get_group(server_id).await? else {
            tracing::debug!(server_id, author_id, "Manual update for unknown server");
            return Ok(UpdateReply::BadServerId);
        };

        if group.owner_id != author_id {
            tracing::warn!(server_id, author_id, "Manual update from non-owner");
            return Ok(UpdateReply::NotOwner);
        }

        let mut record = self
            .servers
            .find_by_identifier(server_id)
            .map_err(CommandError::Storage)?
            .unwrap_or_else(|| ServerRecord::new(&group.id, &group.name, &group.owner_id));
        record.refresh_from(&group);
        record.apply_invite(code);
        self.servers.save(&record).map_err(CommandError::Storage)?;

        tracing::info!(server_id, code, "Invite code updated by owner");
        Ok(UpdateReply::Updated {
            name: group.name.trim().to_string(),
            code: code.to_string(),
        })
    }
}
