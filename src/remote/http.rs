//! HTTP remote client
//!
//! Talks to a Discord-style REST API with a bot token. Transient failures
//! (429, 5xx, timeouts) are retried with exponential backoff; everything
//! else is returned to the caller on the first attempt.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Method, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use super::{RemoteClient, RemoteError, RemoteResult};
use crate::config::RemoteConfig;
use crate::models::{CreateInviteOptions, Group, Invitation, InviteChannel};
use crate::utils::retry::{with_retry_if, RetryConfig};
use crate::utils::truncate_text;

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireGuild {
    id: String,
    name: String,
    owner_id: String,
    #[serde(default)]
    system_channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WirePartialGuild {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireInvite {
    code: String,
    #[serde(default)]
    temporary: bool,
    #[serde(default)]
    revoked: bool,
    #[serde(default)]
    channel: Option<WireChannel>,
    #[serde(default)]
    guild: Option<WirePartialGuild>,
}

impl From<WireGuild> for Group {
    fn from(guild: WireGuild) -> Self {
        Self {
            id: guild.id,
            name: guild.name,
            owner_id: guild.owner_id,
            default_channel: guild.system_channel_id,
        }
    }
}

impl From<WireInvite> for Invitation {
    fn from(invite: WireInvite) -> Self {
        let channel = invite
            .channel
            .map(|c| InviteChannel {
                id: c.id,
                name: c.name.unwrap_or_default(),
            })
            .unwrap_or_else(|| InviteChannel {
                id: String::new(),
                name: String::new(),
            });

        Self {
            code: invite.code,
            temporary: invite.temporary,
            revoked: invite.revoked,
            channel,
            group_id: invite.guild.map(|g| g.id),
        }
    }
}

// ============================================================================
// HTTP Remote Client
// ============================================================================

/// REST client for the chat service
pub struct HttpRemoteClient {
    client: Client,
    base_url: Url,
    token: String,
    retry: RetryConfig,
    dm_channels: RwLock<HashMap<String, String>>,
}

impl HttpRemoteClient {
    /// Create a new client from configuration
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {e}", config.api_url)))?;

        if base_url.cannot_be_a_base() {
            return Err(RemoteError::InvalidUrl(config.api_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(format!("invitekeeper/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
            retry: RetryConfig::new(config.max_retries),
            dm_channels: RwLock::new(HashMap::new()),
        })
    }

    /// Override the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send a request with retries; `Ok(None)` means 404
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> RemoteResult<Option<T>> {
        with_retry_if(
            &self.retry,
            || self.execute(method.clone(), url.clone(), body.clone()),
            RemoteError::is_transient,
        )
        .await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> RemoteResult<Option<T>> {
        tracing::trace!(method = %method, url = %url, "Remote request");

        let mut request = self
            .client
            .request(method, url)
            .header(AUTHORIZATION, format!("Bot {}", self.token));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Http(e)
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::RateLimited);
        }
        if status.is_server_error() {
            return Err(RemoteError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                body: truncate_text(&body, 200),
            });
        }

        let value = response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Some(value))
    }

    async fn dm_channel(&self, recipient_id: &str) -> RemoteResult<String> {
        if let Some(channel) = self.dm_channels.read().await.get(recipient_id) {
            return Ok(channel.clone());
        }

        let url = self.endpoint(&["users", "@me", "channels"])?;
        let channel: WireChannel = self
            .request(
                Method::POST,
                url,
                Some(serde_json::json!({ "recipient_id": recipient_id })),
            )
            .await?
            .ok_or_else(|| RemoteError::Rejected {
                status: 404,
                body: format!("Unknown user {recipient_id}"),
            })?;

        self.dm_channels
            .write()
            .await
            .insert(recipient_id.to_string(), channel.id.clone());
        Ok(channel.id)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get_group(&self, group_id: &str) -> RemoteResult<Option<Group>> {
        let url = self.endpoint(&["guilds", group_id])?;
        match self.request::<WireGuild>(Method::GET, url, None).await {
            Ok(guild) => Ok(guild.map(Group::from)),
            // Missing Access: the bot is not a member of this guild
            Err(RemoteError::Rejected { status: 403, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn get_invite(&self, code: &str) -> RemoteResult<Invitation> {
        let url = self.endpoint(&["invites", code])?;
        let invite: Option<WireInvite> = self.request(Method::GET, url, None).await?;
        invite
            .map(Invitation::from)
            .ok_or_else(|| RemoteError::InviteNotFound(code.to_string()))
    }

    async fn get_invites(&self, group_id: &str) -> RemoteResult<Vec<Invitation>> {
        let url = self.endpoint(&["guilds", group_id, "invites"])?;
        let invites: Option<Vec<WireInvite>> = self.request(Method::GET, url, None).await?;
        Ok(invites
            .unwrap_or_default()
            .into_iter()
            .map(Invitation::from)
            .collect())
    }

    async fn create_invite(
        &self,
        channel_id: &str,
        options: CreateInviteOptions,
    ) -> RemoteResult<Invitation> {
        let url = self.endpoint(&["channels", channel_id, "invites"])?;
        let body = serde_json::json!({
            "temporary": options.temporary,
            "max_age": 0,
        });
        let invite: Option<WireInvite> = self.request(Method::POST, url, Some(body)).await?;
        invite.map(Invitation::from).ok_or_else(|| RemoteError::Rejected {
            status: 404,
            body: format!("Unknown channel {channel_id}"),
        })
    }

    async fn send_message(&self, recipient_id: &str, text: &str) -> RemoteResult<()> {
        let channel_id = self.dm_channel(recipient_id).await?;
        let url = self.endpoint(&["channels", &channel_id, "messages"])?;
        let _: Option<IgnoredAny> = self
            .request(
                Method::POST,
                url,
                Some(serde_json::json!({ "content": text })),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_url: &str) -> RemoteConfig {
        RemoteConfig {
            api_url: api_url.to_string(),
            token: "token".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        }
    }

    #[test]
    fn test_endpoint_joins_segments() {
        let client = HttpRemoteClient::new(&config("https://example.com/api/v10/")).unwrap();
        let url = client.endpoint(&["guilds", "123", "invites"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/v10/guilds/123/invites");
    }

    #[test]
    fn test_endpoint_escapes_segments() {
        let client = HttpRemoteClient::new(&config("https://example.com/api")).unwrap();
        let url = client.endpoint(&["invites", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/invites/a%2Fb");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpRemoteClient::new(&config("not a url")),
            Err(RemoteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_wire_invite_conversion() {
        let wire: WireInvite = serde_json::from_value(serde_json::json!({
            "code": "abc123",
            "guild": { "id": "1" },
            "channel": { "id": "10", "name": "general", "type": 0 },
            "temporary": false
        }))
        .unwrap();

        let invite = Invitation::from(wire);
        assert_eq!(invite.code, "abc123");
        assert_eq!(invite.channel.name, "general");
        assert_eq!(invite.group_id.as_deref(), Some("1"));
        assert!(!invite.revoked);
    }
}
