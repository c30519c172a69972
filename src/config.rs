// ABOUTME: Environment-based server configuration, threaded explicitly into every component
// ABOUTME: Missing values are warned about, never validated; upstream calls fail naturally

//! Environment-only configuration.
//!
//! All deployment-specific values come from environment variables and are
//! read once at startup into a [`ServerConfig`] that is passed explicitly to
//! each component at construction. Nothing reads the environment after
//! startup, and nothing is validated beyond a presence warning: a missing
//! client secret simply fails at the token endpoint with the upstream error.

use std::env;

use tracing::warn;

use crate::constants::{defaults, sweep};

/// Complete server configuration, sourced from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port (`HTTP_PORT`).
    pub http_port: u16,
    /// Externally visible base URL used to build the callback redirect
    /// (`BASE_URL`).
    pub base_url: String,
    /// Entra ID tenant identifier (`ENTRA_TENANT_ID`).
    pub tenant_id: String,
    /// OAuth client id (`ENTRA_CLIENT_ID`).
    pub client_id: String,
    /// OAuth client secret (`ENTRA_CLIENT_SECRET`).
    pub client_secret: String,
    /// Email domain suffix allowed to register (`ALLOWED_EMAIL_DOMAIN`),
    /// without the leading `@`.
    pub allowed_domain: String,
    /// Discord bot credential used to create invites (`DISCORD_BOT_TOKEN`).
    pub discord_bot_token: String,
    /// Target Discord channel id for invites (`DISCORD_CHANNEL_ID`).
    pub discord_channel_id: String,
    /// Redis connection URL; absent selects the in-memory store backend
    /// (`REDIS_URL`).
    pub redis_url: Option<String>,
    /// Whether the stale-guest sweep task runs (`SWEEP_ENABLED`).
    pub sweep_enabled: bool,
    /// Sweep cadence in seconds (`SWEEP_INTERVAL_SECS`).
    pub sweep_interval_secs: u64,
    /// Pending guests younger than this many seconds are not swept
    /// (`SWEEP_GRACE_SECS`).
    pub sweep_grace_secs: i64,
}

impl ServerConfig {
    /// Load configuration from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            http_port: env::var("HTTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults::HTTP_PORT),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| defaults::BASE_URL.to_owned()),
            tenant_id: required("ENTRA_TENANT_ID"),
            client_id: required("ENTRA_CLIENT_ID"),
            client_secret: required("ENTRA_CLIENT_SECRET"),
            allowed_domain: required("ALLOWED_EMAIL_DOMAIN"),
            discord_bot_token: required("DISCORD_BOT_TOKEN"),
            discord_channel_id: required("DISCORD_CHANNEL_ID"),
            redis_url: env::var("REDIS_URL").ok(),
            sweep_enabled: env::var("SWEEP_ENABLED")
                .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(sweep::DEFAULT_INTERVAL_SECS),
            sweep_grace_secs: env::var("SWEEP_GRACE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(sweep::DEFAULT_GRACE_SECS),
        }
    }

    /// The OAuth callback redirect URI derived from the base URL.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/callback", self.base_url.trim_end_matches('/'))
    }
}

/// Read a required variable, warning (not failing) when absent.
fn required(name: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        warn!("{name} is not set; upstream calls depending on it will fail");
        String::new()
    })
}
