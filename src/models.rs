// ABOUTME: Data structures persisted in the correlation store and their key layout
// ABOUTME: PendingFlow binds a state token to an email and guest id; InviteRecord is append-only

//! Persisted data model.
//!
//! Two record kinds live in the correlation store:
//!
//! - [`PendingFlow`] under `state:<token>`, created at registration and
//!   consumed exactly once at callback time. The state token is the sole
//!   correlation handle between the two legs of the OAuth redirect; the
//!   store does not index by email.
//! - [`InviteRecord`] under `invite:<email>:<epochMillis>`, written only
//!   after full verification and never updated or deleted (TTL expiry only).
//!   The composite key lets multiple records per email coexist.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{store_keys, ttl};

/// A registration awaiting its OAuth callback, keyed by state token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingFlow {
    /// The claimed email address, compared case-insensitively at
    /// verification time.
    pub email: String,
    /// Directory id of the provisioned guest. `None` when provisioning was
    /// skipped because the guest already existed.
    pub guest_user_id: Option<String>,
}

/// A successfully issued invite, retained for audit and listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRecord {
    /// Verified email of the recipient.
    pub email: String,
    /// Display name from the identity token.
    pub user_name: String,
    /// The issued single-use invite URL.
    pub invite_url: String,
    /// When the invite was created.
    pub created_at: DateTime<Utc>,
    /// When the invite link itself stops working (creation + 5 minutes).
    /// The record outlives this by design.
    pub expires_at: DateTime<Utc>,
}

impl InviteRecord {
    /// Build a record for an invite issued at `created_at`.
    #[must_use]
    pub fn new(email: &str, user_name: &str, invite_url: &str, created_at: DateTime<Utc>) -> Self {
        Self {
            email: email.to_owned(),
            user_name: user_name.to_owned(),
            invite_url: invite_url.to_owned(),
            created_at,
            expires_at: created_at + Duration::seconds(i64::from(ttl::INVITE_LINK_SECS)),
        }
    }

    /// Store key for this record.
    #[must_use]
    pub fn key(&self) -> String {
        invite_key(&self.email, &self.created_at)
    }
}

/// Store key for a pending flow.
#[must_use]
pub fn state_key(token: &str) -> String {
    format!("{}{token}", store_keys::STATE_PREFIX)
}

/// Store key for an invite record.
#[must_use]
pub fn invite_key(email: &str, created_at: &DateTime<Utc>) -> String {
    format!(
        "{}{email}:{}",
        store_keys::INVITE_PREFIX,
        created_at.timestamp_millis()
    )
}

/// Store key prefix covering every invite record for one email.
#[must_use]
pub fn invite_prefix(email: &str) -> String {
    format!("{}{email}:", store_keys::INVITE_PREFIX)
}
