// ABOUTME: Microsoft Graph directory client for guest provisioning and retraction
// ABOUTME: Guest deletion is a best-effort compensation that never raises into callers

//! Directory operations against Microsoft Graph.
//!
//! Three operations, each an independent network request with no retries:
//! a service-level token via the client-credentials grant, guest invitation
//! creation, and guest deletion. Deletion is explicitly a compensating
//! action: its own failure is logged as an observability signal and never
//! propagated, so it cannot mask the error being compensated for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::constants::{endpoints, oauth};
use crate::errors::{GateError, GateResult};

/// Marker Graph puts in the 400 body when the invited user already exists.
const ALREADY_EXISTS_MARKER: &str = "already exists";

/// Outcome of a guest invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedGuest {
    /// Directory id of the created guest; `None` when the guest already
    /// existed and provisioning was skipped.
    pub guest_user_id: Option<String>,
    /// Provider-issued redemption URL for the invitation, when one was
    /// created.
    pub redeem_url: Option<String>,
}

/// A guest account that has not yet redeemed its invitation.
#[derive(Debug, Clone)]
pub struct PendingGuest {
    /// Directory id.
    pub id: String,
    /// When the guest was created.
    pub created_at: DateTime<Utc>,
}

/// Interface to the directory service.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Create a guest invitation for `email` with `redirect_target` as the
    /// invitation's redirect URL.
    ///
    /// An "already exists" rejection from the directory is a benign
    /// idempotent outcome and returns a [`ProvisionedGuest`] with both
    /// fields `None`.
    ///
    /// # Errors
    ///
    /// [`GateError::TokenAcquisitionFailed`] or
    /// [`GateError::GuestProvisioningFailed`].
    async fn provision_guest(
        &self,
        email: &str,
        redirect_target: &str,
    ) -> GateResult<ProvisionedGuest>;

    /// Best-effort deletion of a guest account. Never fails: problems are
    /// logged and swallowed.
    async fn delete_guest(&self, guest_user_id: &str);

    /// List guest accounts still in the pending-acceptance state, for the
    /// stale-guest sweep.
    ///
    /// # Errors
    ///
    /// [`GateError::TokenAcquisitionFailed`] or
    /// [`GateError::GuestProvisioningFailed`] when the directory query
    /// fails.
    async fn list_pending_guests(&self) -> GateResult<Vec<PendingGuest>>;
}

/// Microsoft Graph implementation of [`DirectoryApi`].
pub struct GraphDirectoryClient {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct ServiceTokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InvitationRequest<'a> {
    invited_user_email_address: &'a str,
    invite_redirect_url: &'a str,
    send_invitation_message: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvitationResponse {
    invite_redeem_url: Option<String>,
    invited_user: Option<InvitedUser>,
}

#[derive(Debug, Deserialize)]
struct InvitedUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DirectoryPage {
    value: Vec<GuestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuestEntry {
    id: String,
    created_date_time: Option<DateTime<Utc>>,
}

impl GraphDirectoryClient {
    /// Build a client from server configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Acquire a service-level access token via the client-credentials
    /// grant.
    ///
    /// # Errors
    ///
    /// [`GateError::TokenAcquisitionFailed`] carrying the upstream body on
    /// any non-success status.
    pub async fn service_token(&self) -> GateResult<String> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            endpoints::LOGIN_BASE,
            self.tenant_id
        );
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", oauth::GRAPH_DEFAULT_SCOPE),
            ("grant_type", "client_credentials"),
        ];

        let response = self
            .http
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GateError::TokenAcquisitionFailed {
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GateError::TokenAcquisitionFailed { detail });
        }

        let token: ServiceTokenResponse =
            response
                .json()
                .await
                .map_err(|e| GateError::TokenAcquisitionFailed {
                    detail: format!("unusable token response: {e}"),
                })?;
        Ok(token.access_token)
    }

    /// Whether a provisioning rejection is the benign "already exists" case.
    fn is_already_invited(status: StatusCode, body: &str) -> bool {
        status == StatusCode::BAD_REQUEST && body.contains(ALREADY_EXISTS_MARKER)
    }
}

#[async_trait]
impl DirectoryApi for GraphDirectoryClient {
    async fn provision_guest(
        &self,
        email: &str,
        redirect_target: &str,
    ) -> GateResult<ProvisionedGuest> {
        let token = self.service_token().await?;

        let body = InvitationRequest {
            invited_user_email_address: email,
            invite_redirect_url: redirect_target,
            send_invitation_message: false,
        };

        let response = self
            .http
            .post(format!("{}/invitations", endpoints::GRAPH_BASE))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GateError::GuestProvisioningFailed {
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            if Self::is_already_invited(status, &detail) {
                info!("guest already exists in directory: {email}");
                return Ok(ProvisionedGuest {
                    guest_user_id: None,
                    redeem_url: None,
                });
            }
            return Err(GateError::GuestProvisioningFailed { detail });
        }

        let invitation: InvitationResponse =
            response
                .json()
                .await
                .map_err(|e| GateError::GuestProvisioningFailed {
                    detail: format!("unusable invitation response: {e}"),
                })?;

        let guest_user_id = invitation.invited_user.map(|u| u.id);
        info!(
            guest_user_id = guest_user_id.as_deref().unwrap_or("unknown"),
            "provisioned guest for {email}"
        );

        Ok(ProvisionedGuest {
            guest_user_id,
            redeem_url: invitation.invite_redeem_url,
        })
    }

    async fn delete_guest(&self, guest_user_id: &str) {
        let token = match self.service_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("guest deletion skipped, token acquisition failed: {e}");
                return;
            }
        };

        let result = self
            .http
            .delete(format!("{}/users/{guest_user_id}", endpoints::GRAPH_BASE))
            .bearer_auth(&token)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("deleted guest {guest_user_id}");
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                warn!("guest deletion for {guest_user_id} returned {status}: {body}");
            }
            Err(e) => {
                warn!("guest deletion for {guest_user_id} failed: {e}");
            }
        }
    }

    async fn list_pending_guests(&self) -> GateResult<Vec<PendingGuest>> {
        let token = self.service_token().await?;

        let response = self
            .http
            .get(format!("{}/users", endpoints::GRAPH_BASE))
            .bearer_auth(&token)
            .header("ConsistencyLevel", "eventual")
            .query(&[
                (
                    "$filter",
                    "userType eq 'Guest' and externalUserState eq 'PendingAcceptance'",
                ),
                ("$select", "id,createdDateTime"),
            ])
            .send()
            .await
            .map_err(|e| GateError::GuestProvisioningFailed {
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GateError::GuestProvisioningFailed { detail });
        }

        let page: DirectoryPage =
            response
                .json()
                .await
                .map_err(|e| GateError::GuestProvisioningFailed {
                    detail: format!("unusable directory response: {e}"),
                })?;

        Ok(page
            .value
            .into_iter()
            .filter_map(|entry| {
                entry.created_date_time.map(|created_at| PendingGuest {
                    id: entry.id,
                    created_at,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_invited_requires_both_status_and_marker() {
        assert!(GraphDirectoryClient::is_already_invited(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"message":"Invited user already exists in the directory"}}"#
        ));
        assert!(!GraphDirectoryClient::is_already_invited(
            StatusCode::BAD_REQUEST,
            "some other validation failure"
        ));
        assert!(!GraphDirectoryClient::is_already_invited(
            StatusCode::FORBIDDEN,
            "already exists"
        ));
    }

    #[test]
    fn invitation_request_uses_graph_field_names() {
        let body = InvitationRequest {
            invited_user_email_address: "a@d.edu",
            invite_redirect_url: "https://gate.example.org/auth",
            send_invitation_message: false,
        };
        let json = serde_json::to_value(&body).map(|v| v.to_string()).unwrap_or_default();
        assert!(json.contains("invitedUserEmailAddress"));
        assert!(json.contains("inviteRedirectUrl"));
        assert!(json.contains("sendInvitationMessage"));
    }
}
