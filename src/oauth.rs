// ABOUTME: Identity provider seam for the authorization redirect and code exchange
// ABOUTME: Concrete implementation targets the Entra ID v2.0 endpoints

//! OAuth2 interaction with the identity provider.
//!
//! [`IdentityProvider`] is the seam the flow orchestrator talks through: it
//! builds the authorization redirect for the registration leg and performs
//! the authorization-code exchange for the callback leg. No refresh, no
//! revocation; a failed exchange is surfaced once and the user re-registers.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::ServerConfig;
use crate::constants::{endpoints, oauth};
use crate::errors::{GateError, GateResult};

/// Result of a successful authorization-code exchange.
#[derive(Debug, Clone)]
pub struct TokenExchange {
    /// The raw OIDC identity token.
    pub id_token: String,
}

/// Interface to the identity provider's authorize and token endpoints.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the authorization redirect URL carrying `state` and a login
    /// hint for the claimed email.
    fn authorization_url(&self, state: &str, login_hint: &str) -> String;

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::AuthCodeExchangeFailed`] when the token endpoint
    /// responds with a non-success status or an unusable body.
    async fn exchange_code(&self, code: &str) -> GateResult<TokenExchange>;
}

/// Entra ID v2.0 implementation of [`IdentityProvider`].
pub struct EntraIdentityProvider {
    http: reqwest::Client,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

/// Token endpoint response; only the identity token is consumed.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

impl EntraIdentityProvider {
    /// Build a provider from server configuration.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            tenant_id: config.tenant_id.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri(),
        }
    }

    fn token_endpoint(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            endpoints::LOGIN_BASE,
            self.tenant_id
        )
    }
}

#[async_trait]
impl IdentityProvider for EntraIdentityProvider {
    fn authorization_url(&self, state: &str, login_hint: &str) -> String {
        let authorize = format!(
            "{}/{}/oauth2/v2.0/authorize",
            endpoints::LOGIN_BASE,
            self.tenant_id
        );
        // The base is a constant-plus-tenant string; parsing cannot fail in
        // a way we can recover from, so fall back to manual assembly.
        Url::parse_with_params(
            &authorize,
            &[
                ("client_id", self.client_id.as_str()),
                ("response_type", "code"),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_mode", "query"),
                ("scope", oauth::AUTHORIZE_SCOPES),
                ("state", state),
                ("login_hint", login_hint),
            ],
        )
        .map_or_else(
            |_| {
                format!(
                    "{authorize}?client_id={}&response_type=code&state={}",
                    urlencoding::encode(&self.client_id),
                    urlencoding::encode(state)
                )
            },
            |url| url.to_string(),
        )
    }

    async fn exchange_code(&self, code: &str) -> GateResult<TokenExchange> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(self.token_endpoint())
            .form(&params)
            .send()
            .await
            .map_err(|e| GateError::AuthCodeExchangeFailed {
                detail: e.to_string(),
            })?;

        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GateError::AuthCodeExchangeFailed { detail });
        }

        let tokens: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| GateError::AuthCodeExchangeFailed {
                    detail: format!("unusable token response: {e}"),
                })?;

        Ok(TokenExchange {
            id_token: tokens.id_token,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_provider() -> EntraIdentityProvider {
        EntraIdentityProvider {
            http: reqwest::Client::new(),
            tenant_id: "tenant-123".to_owned(),
            client_id: "client-abc".to_owned(),
            client_secret: "secret".to_owned(),
            redirect_uri: "http://localhost:8080/callback".to_owned(),
        }
    }

    #[test]
    fn authorization_url_carries_state_and_login_hint() {
        let url = test_provider().authorization_url("tok-1", "ada@example.edu");
        let parsed = Url::parse(&url).unwrap();
        assert!(url.starts_with(
            "https://login.microsoftonline.com/tenant-123/oauth2/v2.0/authorize?"
        ));
        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("state".to_owned(), "tok-1".to_owned())));
        assert!(pairs.contains(&("login_hint".to_owned(), "ada@example.edu".to_owned())));
        assert!(pairs.contains(&("response_type".to_owned(), "code".to_owned())));
        assert!(pairs.contains(&("scope".to_owned(), "openid profile email".to_owned())));
    }

    #[test]
    fn token_endpoint_targets_the_tenant() {
        assert_eq!(
            test_provider().token_endpoint(),
            "https://login.microsoftonline.com/tenant-123/oauth2/v2.0/token"
        );
    }
}
