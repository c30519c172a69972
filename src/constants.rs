// ABOUTME: Constants module with domain-separated organization
// ABOUTME: Upstream endpoints, TTLs, store key prefixes, and server defaults

//! Application constants grouped by domain.

/// Upstream service endpoints.
pub mod endpoints {
    /// Microsoft Entra ID login/token host.
    pub const LOGIN_BASE: &str = "https://login.microsoftonline.com";
    /// Microsoft Graph v1.0 API base.
    pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";
    /// Discord REST API base.
    pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";
    /// Public Discord invite link base.
    pub const DISCORD_INVITE_BASE: &str = "https://discord.gg";
}

/// OAuth scopes and grant parameters.
pub mod oauth {
    /// Scopes requested for the end-user authorization redirect.
    pub const AUTHORIZE_SCOPES: &str = "openid profile email";
    /// Scope for the service-level client-credentials grant.
    pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";
}

/// Correlation store key layout.
pub mod store_keys {
    /// Prefix for pending registration flows, keyed by state token.
    pub const STATE_PREFIX: &str = "state:";
    /// Prefix for persisted invite records.
    pub const INVITE_PREFIX: &str = "invite:";
}

/// Time-to-live windows, in seconds unless noted.
pub mod ttl {
    /// Pending flow lifetime: the user has ten minutes to finish sign-in.
    pub const STATE_SECS: u64 = 600;
    /// Invite record retention: seven days, independent of the invite's own validity.
    pub const INVITE_RECORD_SECS: u64 = 604_800;
    /// Validity window of the issued Discord invite link: five minutes.
    pub const INVITE_LINK_SECS: u32 = 300;
}

/// Discord invite creation parameters.
pub mod invite {
    /// Invite expires after this many seconds.
    pub const MAX_AGE_SECS: u32 = super::ttl::INVITE_LINK_SECS;
    /// Single-use.
    pub const MAX_USES: u8 = 1;
}

/// Stale-guest sweep defaults.
pub mod sweep {
    /// How often the sweep runs.
    pub const DEFAULT_INTERVAL_SECS: u64 = 3600;
    /// Pending guests younger than this are left alone.
    pub const DEFAULT_GRACE_SECS: i64 = 86_400;
}

/// Server and store defaults.
pub mod defaults {
    /// Default HTTP listen port.
    pub const HTTP_PORT: u16 = 8080;
    /// Default externally visible base URL.
    pub const BASE_URL: &str = "http://localhost:8080";
    /// In-memory store capacity bound.
    pub const STORE_MAX_ENTRIES: usize = 10_000;
    /// In-memory store expired-entry cleanup interval.
    pub const STORE_CLEANUP_INTERVAL_SECS: u64 = 60;
}
