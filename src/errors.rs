// ABOUTME: Unified error type covering the registration and callback flow taxonomy
// ABOUTME: Maps each failure to an error code, HTTP status, and user-facing page copy
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GuildPass Project

//! Error handling for the invite gate.
//!
//! Every failure the service can produce is a variant of [`GateError`].
//! Identity, domain, and binding failures are user-facing and render as an
//! error page with status 400; upstream service failures surface as JSON 500
//! with the upstream detail string. There are no automatic retries anywhere:
//! the user restarts the flow, which issues a fresh state token.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors produced by the registration/callback flow and its collaborators.
#[derive(Debug, Error)]
pub enum GateError {
    /// The submitted email does not carry the required domain suffix.
    #[error("only @{domain} email addresses are allowed")]
    RejectedDomain {
        /// The configured allowed domain.
        domain: String,
    },

    /// The directory invitation call failed with a non-benign status.
    #[error("guest provisioning failed: {detail}")]
    GuestProvisioningFailed {
        /// Upstream response body.
        detail: String,
    },

    /// The client-credentials grant against the identity provider failed.
    #[error("service token acquisition failed: {detail}")]
    TokenAcquisitionFailed {
        /// Upstream response body.
        detail: String,
    },

    /// The authorization-code exchange at the token endpoint failed.
    #[error("authorization code exchange failed: {detail}")]
    AuthCodeExchangeFailed {
        /// Upstream response body.
        detail: String,
    },

    /// The identity token could not be decoded into a claim set.
    #[error("identity token is malformed: {detail}")]
    MalformedToken {
        /// What step of decoding failed.
        detail: String,
    },

    /// The identity token's issuer claim does not match the expected tenant.
    #[error("identity token issuer does not match the expected tenant")]
    IssuerMismatch,

    /// The identity token's audience claim does not match this client.
    #[error("identity token audience does not match this application")]
    AudienceMismatch,

    /// The identity token's expiry claim lies in the past.
    #[error("identity token has expired")]
    TokenExpired,

    /// The identity token's not-before claim lies in the future.
    #[error("identity token is not yet valid")]
    TokenNotYetValid,

    /// No pending flow exists for the presented state token.
    #[error("state token is missing, already used, or expired")]
    StateMissingOrExpired,

    /// The verified email does not match the email bound at registration.
    #[error("verified email does not match the registered email")]
    EmailBindingMismatch,

    /// The Discord invite-creation call failed.
    #[error("invite creation failed: {detail}")]
    InviteCreationFailed {
        /// Upstream response body.
        detail: String,
    },

    /// A correlation store operation failed.
    #[error("storage operation failed: {detail}")]
    StorageFailure {
        /// Backend error description.
        detail: String,
    },
}

impl GateError {
    /// Stable machine-readable code for logs and JSON error bodies.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::RejectedDomain { .. } => "rejected_domain",
            Self::GuestProvisioningFailed { .. } => "guest_provisioning_failed",
            Self::TokenAcquisitionFailed { .. } => "token_acquisition_failed",
            Self::AuthCodeExchangeFailed { .. } => "auth_code_exchange_failed",
            Self::MalformedToken { .. } => "malformed_token",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::TokenExpired => "token_expired",
            Self::TokenNotYetValid => "token_not_yet_valid",
            Self::StateMissingOrExpired => "state_missing_or_expired",
            Self::EmailBindingMismatch => "email_binding_mismatch",
            Self::InviteCreationFailed { .. } => "invite_creation_failed",
            Self::StorageFailure { .. } => "storage_failure",
        }
    }

    /// HTTP status for the JSON (registration) surface.
    ///
    /// User-correctable failures are 400; upstream failures are 500.
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        match self {
            Self::RejectedDomain { .. }
            | Self::MalformedToken { .. }
            | Self::IssuerMismatch
            | Self::AudienceMismatch
            | Self::TokenExpired
            | Self::TokenNotYetValid
            | Self::StateMissingOrExpired
            | Self::EmailBindingMismatch => StatusCode::BAD_REQUEST,
            Self::GuestProvisioningFailed { .. }
            | Self::TokenAcquisitionFailed { .. }
            | Self::AuthCodeExchangeFailed { .. }
            | Self::InviteCreationFailed { .. }
            | Self::StorageFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Title for the rendered error page.
    #[must_use]
    pub const fn page_title(&self) -> &'static str {
        match self {
            Self::RejectedDomain { .. } | Self::EmailBindingMismatch => "Access denied",
            Self::MalformedToken { .. }
            | Self::IssuerMismatch
            | Self::AudienceMismatch
            | Self::TokenExpired
            | Self::TokenNotYetValid => "Sign-in could not be verified",
            Self::StateMissingOrExpired => "Link invalid or expired",
            Self::GuestProvisioningFailed { .. }
            | Self::TokenAcquisitionFailed { .. }
            | Self::AuthCodeExchangeFailed { .. }
            | Self::InviteCreationFailed { .. }
            | Self::StorageFailure { .. } => "Something went wrong",
        }
    }

    /// Body copy for the rendered error page.
    ///
    /// Upstream detail strings stay out of user-facing pages; they are logged
    /// at the failure site instead.
    #[must_use]
    pub fn page_message(&self) -> String {
        match self {
            Self::RejectedDomain { domain } => {
                format!("This service is only available to @{domain} email addresses.")
            }
            Self::EmailBindingMismatch => {
                "The account you signed in with does not match the email you registered."
                    .to_owned()
            }
            Self::StateMissingOrExpired => {
                "This sign-in link has already been used or has expired. Please register again."
                    .to_owned()
            }
            Self::MalformedToken { .. }
            | Self::IssuerMismatch
            | Self::AudienceMismatch
            | Self::TokenExpired
            | Self::TokenNotYetValid => {
                "Your sign-in could not be verified. Please register again.".to_owned()
            }
            Self::GuestProvisioningFailed { .. }
            | Self::TokenAcquisitionFailed { .. }
            | Self::AuthCodeExchangeFailed { .. }
            | Self::InviteCreationFailed { .. }
            | Self::StorageFailure { .. } => {
                "An unexpected error occurred while processing your request. Please try again."
                    .to_owned()
            }
        }
    }
}

/// Result type alias used throughout the crate.
pub type GateResult<T> = Result<T, GateError>;
