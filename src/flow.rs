// ABOUTME: Registration/callback state machine composing directory, IdP, invite, and store
// ABOUTME: Owns replay prevention, email binding checks, and compensating guest deletion

//! The flow orchestrator.
//!
//! A registration moves `Idle → AwaitingCallback` by provisioning a guest,
//! binding a [`PendingFlow`] to a fresh state token, and handing the client
//! its sign-in URL. The callback moves `AwaitingCallback → Completed` or to
//! the terminal `Rejected`:
//!
//! - The pending flow is consumed (removed from the store) before any
//!   network call, so a retried or duplicated callback carrying the same
//!   state token can never be serviced twice.
//! - Once the flow is consumed, any failure — identity mismatch or plain
//!   upstream breakage — retracts the provisioned guest before the
//!   rejection is returned. An orphaned pending guest is worse than a
//!   duplicate delete attempt.

use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use rand::RngCore;
use tracing::{info, warn};

use crate::constants::ttl;
use crate::directory::DirectoryApi;
use crate::discord::InviteApi;
use crate::errors::{GateError, GateResult};
use crate::identity::IdTokenVerifier;
use crate::models::{state_key, InviteRecord, PendingFlow};
use crate::oauth::IdentityProvider;
use crate::store::{Store, StoreProvider};

/// State token length in bytes before base64 encoding.
const STATE_TOKEN_BYTES: usize = 32;

/// Successful registration response payload.
#[derive(Debug, Clone)]
pub struct Registration {
    /// URL the client must navigate to: the invitation redeem URL when the
    /// directory issued one, otherwise the authorization URL.
    pub auth_url: String,
}

/// Raw query parameters delivered by the IdP redirect.
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// State token issued at registration.
    pub state: Option<String>,
    /// Error code, when the IdP rejected the sign-in.
    pub error: Option<String>,
    /// Human-readable error description from the IdP.
    pub error_description: Option<String>,
}

/// What the callback renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackPage {
    /// Verification succeeded; show the invite.
    Success {
        /// Display name from the identity token.
        user_name: String,
        /// Freshly created invite URL.
        invite_url: String,
    },
    /// Verification failed; show an error page with status 400.
    Rejected {
        /// Page title.
        title: String,
        /// Page body.
        message: String,
    },
}

/// Composes the collaborators into the registration and callback handlers.
pub struct FlowOrchestrator {
    allowed_domain: String,
    store: Store,
    idp: Arc<dyn IdentityProvider>,
    directory: Arc<dyn DirectoryApi>,
    invites: Arc<dyn InviteApi>,
    verifier: IdTokenVerifier,
}

impl FlowOrchestrator {
    /// Wire up an orchestrator.
    #[must_use]
    pub fn new(
        allowed_domain: String,
        store: Store,
        idp: Arc<dyn IdentityProvider>,
        directory: Arc<dyn DirectoryApi>,
        invites: Arc<dyn InviteApi>,
        verifier: IdTokenVerifier,
    ) -> Self {
        Self {
            allowed_domain,
            store,
            idp,
            directory,
            invites,
            verifier,
        }
    }

    /// Handle a registration request: `Idle → AwaitingCallback`.
    ///
    /// # Errors
    ///
    /// [`GateError::RejectedDomain`] for emails outside the allowed domain;
    /// upstream provisioning or storage errors otherwise. On a domain
    /// rejection nothing has been provisioned and nothing written.
    pub async fn register(&self, email: &str) -> GateResult<Registration> {
        let email = email.trim();
        if !self.has_allowed_domain(email) {
            return Err(GateError::RejectedDomain {
                domain: self.allowed_domain.clone(),
            });
        }

        let state = new_state_token();
        let authorization_url = self.idp.authorization_url(&state, email);

        let guest = self
            .directory
            .provision_guest(email, &authorization_url)
            .await?;

        let flow = PendingFlow {
            email: email.to_owned(),
            guest_user_id: guest.guest_user_id.clone(),
        };
        self.store
            .put(
                &state_key(&state),
                &flow,
                Duration::from_secs(ttl::STATE_SECS),
            )
            .await?;

        info!(
            guest_bound = guest.guest_user_id.is_some(),
            "registration accepted for {email}"
        );

        Ok(Registration {
            auth_url: guest.redeem_url.unwrap_or(authorization_url),
        })
    }

    /// Handle the IdP redirect: `AwaitingCallback → Completed | Rejected`.
    ///
    /// Never fails outright; every failure becomes a `Rejected` page.
    pub async fn callback(&self, params: CallbackParams) -> CallbackPage {
        if let Some(error) = params.error {
            warn!("identity provider returned error: {error}");
            return CallbackPage::Rejected {
                title: "Sign-in failed".to_owned(),
                message: params.error_description.unwrap_or(error),
            };
        }

        let (Some(code), Some(state)) = (params.code, params.state) else {
            return CallbackPage::Rejected {
                title: "Sign-in failed".to_owned(),
                message: "The authorization code or state token is missing.".to_owned(),
            };
        };

        // Consume the pending flow before any network call. Whatever happens
        // next, this state token is spent.
        let pending: Option<PendingFlow> = match self.store.take(&state_key(&state)).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(code = e.error_code(), "state consumption failed: {e}");
                return rejection_for(&e);
            }
        };
        let Some(pending) = pending else {
            return rejection_for(&GateError::StateMissingOrExpired);
        };

        match self.verify_and_complete(&code, &pending).await {
            Ok(page) => page,
            Err(e) => {
                warn!(code = e.error_code(), "callback rejected: {e}");
                if let Some(guest_user_id) = &pending.guest_user_id {
                    self.directory.delete_guest(guest_user_id).await;
                }
                rejection_for(&e)
            }
        }
    }

    /// The verified/post-verification path. Any error here triggers the
    /// caller's compensation.
    async fn verify_and_complete(
        &self,
        code: &str,
        pending: &PendingFlow,
    ) -> GateResult<CallbackPage> {
        let tokens = self.idp.exchange_code(code).await?;
        let identity = self.verifier.verify(&tokens.id_token)?;

        if !self.has_allowed_domain(&identity.email) {
            return Err(GateError::RejectedDomain {
                domain: self.allowed_domain.clone(),
            });
        }
        if !identity.email.eq_ignore_ascii_case(&pending.email) {
            return Err(GateError::EmailBindingMismatch);
        }

        let invite_url = self.invites.create_invite().await?;

        let record = InviteRecord::new(&identity.email, &identity.name, &invite_url, Utc::now());
        self.store
            .put(
                &record.key(),
                &record,
                Duration::from_secs(ttl::INVITE_RECORD_SECS),
            )
            .await?;

        info!(subject = %identity.subject, "invite issued to {}", identity.email);

        Ok(CallbackPage::Success {
            user_name: identity.name,
            invite_url,
        })
    }

    fn has_allowed_domain(&self, email: &str) -> bool {
        let suffix = format!("@{}", self.allowed_domain.to_ascii_lowercase());
        !email.is_empty() && email.to_ascii_lowercase().ends_with(&suffix)
    }
}

/// Map a flow error to its rejection page.
fn rejection_for(error: &GateError) -> CallbackPage {
    CallbackPage::Rejected {
        title: error.page_title().to_owned(),
        message: error.page_message(),
    }
}

/// Generate an unguessable state token: 256 bits from the OS CSPRNG,
/// URL-safe base64 without padding.
fn new_state_token() -> String {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
