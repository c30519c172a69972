// ABOUTME: Discord invite-channel client creating single-use, time-limited invites
// ABOUTME: Parameters are fixed: five-minute expiry, one use, unique, non-temporary

//! Discord invite creation.
//!
//! One operation against the Discord REST API: create an invite for the
//! configured destination channel. Every invite is single-use, expires after
//! five minutes, and is forced unique so issuance never reuses a code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ServerConfig;
use crate::constants::{endpoints, invite};
use crate::errors::{GateError, GateResult};

/// Interface to the invite-issuing service.
#[async_trait]
pub trait InviteApi: Send + Sync {
    /// Create a fresh single-use invite and return its fully qualified URL.
    ///
    /// # Errors
    ///
    /// [`GateError::InviteCreationFailed`] carrying the upstream body on any
    /// non-success status.
    async fn create_invite(&self) -> GateResult<String>;
}

/// Discord REST implementation of [`InviteApi`].
pub struct DiscordInviteClient {
    http: reqwest::Client,
    bot_token: String,
    channel_id: String,
}

#[derive(Debug, Serialize)]
struct InviteRequest {
    max_age: u32,
    max_uses: u8,
    temporary: bool,
    unique: bool,
}

#[derive(Debug, Deserialize)]
struct InviteResponse {
    code: String,
}

impl DiscordInviteClient {
    /// Build a client from server configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: config.discord_bot_token.clone(),
            channel_id: config.discord_channel_id.clone(),
        }
    }

    fn invite_url(code: &str) -> String {
        format!("{}/{code}", endpoints::DISCORD_INVITE_BASE)
    }
}

#[async_trait]
impl InviteApi for DiscordInviteClient {
    async fn create_invite(&self) -> GateResult<String> {
        let response = self
            .http
            .post(format!(
                "{}/channels/{}/invites",
                endpoints::DISCORD_API_BASE,
                self.channel_id
            ))
            .header("Authorization", format!("Bot {}", self.bot_token))
            .json(&InviteRequest {
                max_age: invite::MAX_AGE_SECS,
                max_uses: invite::MAX_USES,
                temporary: false,
                unique: true,
            })
            .send()
            .await
            .map_err(|e| GateError::InviteCreationFailed {
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GateError::InviteCreationFailed { detail });
        }

        let created: InviteResponse =
            response
                .json()
                .await
                .map_err(|e| GateError::InviteCreationFailed {
                    detail: format!("unusable invite response: {e}"),
                })?;

        let url = Self::invite_url(&created.code);
        info!("created single-use invite for channel {}", self.channel_id);
        Ok(url)
    }
}
