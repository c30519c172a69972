// ABOUTME: OIDC identity token claims validation against expected issuer and audience
// ABOUTME: Signature verification is a pluggable step and is disabled by default

//! Identity token verification.
//!
//! Decodes an OIDC identity token (three dot-separated segments, the middle
//! one URL-safe base64 of a JSON claim set) and validates its claims against
//! the expected issuer and audience, plus expiry and not-before when present.
//! Each check fails with a distinct [`GateError`] variant.
//!
//! Cryptographic signature verification is NOT performed by default. It is
//! modeled as the pluggable [`SignatureCheck`] seam so the gap is explicit
//! and a real verifier can be swapped in; the server logs the disabled state
//! at startup.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::Deserialize;

use crate::constants::endpoints;
use crate::errors::{GateError, GateResult};

/// Identity extracted from a validated token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Resolved email: `email`, else `preferred_username`, else `upn`.
    pub email: String,
    /// Resolved display name: `name`, else `given_name`, else `"User"`.
    pub name: String,
    /// Resolved subject: `sub`, else `oid`.
    pub subject: String,
}

/// Pluggable signature verification step.
///
/// Runs before claims validation. The default [`NoSignatureCheck`] accepts
/// every token.
pub trait SignatureCheck: Send + Sync {
    /// Verify the raw token's signature.
    ///
    /// # Errors
    ///
    /// Returns the error that should reject the token.
    fn verify(&self, raw_token: &str) -> GateResult<()>;
}

/// The default, non-verifying signature step.
pub struct NoSignatureCheck;

impl SignatureCheck for NoSignatureCheck {
    fn verify(&self, _raw_token: &str) -> GateResult<()> {
        Ok(())
    }
}

/// Claim set of an Entra ID identity token. All fields optional; presence
/// rules are enforced by the verifier, not the deserializer.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    iss: Option<String>,
    aud: Option<Audience>,
    exp: Option<i64>,
    nbf: Option<i64>,
    email: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
    name: Option<String>,
    given_name: Option<String>,
    sub: Option<String>,
    oid: Option<String>,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    fn matches(&self, expected: &str) -> bool {
        match self {
            Self::Single(aud) => aud == expected,
            Self::Many(auds) => auds.iter().any(|aud| aud == expected),
        }
    }
}

/// Validates identity tokens against a fixed issuer and audience.
pub struct IdTokenVerifier {
    expected_issuer: String,
    expected_audience: String,
    signature: Arc<dyn SignatureCheck>,
}

impl IdTokenVerifier {
    /// Build a verifier for the given tenant and client.
    #[must_use]
    pub fn new(tenant_id: &str, client_id: &str) -> Self {
        Self {
            expected_issuer: format!("{}/{tenant_id}/v2.0", endpoints::LOGIN_BASE),
            expected_audience: client_id.to_owned(),
            signature: Arc::new(NoSignatureCheck),
        }
    }

    /// Replace the signature verification step.
    #[must_use]
    pub fn with_signature_check(mut self, check: Arc<dyn SignatureCheck>) -> Self {
        self.signature = check;
        self
    }

    /// Validate `raw_token` and extract the identity it asserts.
    ///
    /// # Errors
    ///
    /// `MalformedToken` for any decoding failure, `IssuerMismatch`,
    /// `AudienceMismatch`, `TokenExpired`, or `TokenNotYetValid` for the
    /// corresponding claim check.
    pub fn verify(&self, raw_token: &str) -> GateResult<VerifiedIdentity> {
        self.verify_at(raw_token, Utc::now().timestamp())
    }

    fn verify_at(&self, raw_token: &str, now: i64) -> GateResult<VerifiedIdentity> {
        self.signature.verify(raw_token)?;

        let segments: Vec<&str> = raw_token.split('.').collect();
        if segments.len() != 3 {
            return Err(GateError::MalformedToken {
                detail: format!("expected 3 segments, found {}", segments.len()),
            });
        }

        let payload =
            URL_SAFE_NO_PAD
                .decode(segments[1])
                .map_err(|e| GateError::MalformedToken {
                    detail: format!("payload is not valid base64: {e}"),
                })?;
        let payload = String::from_utf8(payload).map_err(|e| GateError::MalformedToken {
            detail: format!("payload is not valid UTF-8: {e}"),
        })?;
        let claims: IdTokenClaims =
            serde_json::from_str(&payload).map_err(|e| GateError::MalformedToken {
                detail: format!("payload is not a valid claim set: {e}"),
            })?;

        if claims.iss.as_deref() != Some(self.expected_issuer.as_str()) {
            return Err(GateError::IssuerMismatch);
        }
        if !claims
            .aud
            .as_ref()
            .is_some_and(|aud| aud.matches(&self.expected_audience))
        {
            return Err(GateError::AudienceMismatch);
        }
        if let Some(exp) = claims.exp {
            if exp < now {
                return Err(GateError::TokenExpired);
            }
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now {
                return Err(GateError::TokenNotYetValid);
            }
        }

        Ok(VerifiedIdentity {
            email: first_non_empty(&[&claims.email, &claims.preferred_username, &claims.upn])
                .unwrap_or_default(),
            name: first_non_empty(&[&claims.name, &claims.given_name])
                .unwrap_or_else(|| "User".to_owned()),
            subject: first_non_empty(&[&claims.sub, &claims.oid]).unwrap_or_default(),
        })
    }
}

/// First claim that is present and non-empty.
fn first_non_empty(candidates: &[&Option<String>]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .find(|s| !s.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const TENANT: &str = "tenant-123";
    const CLIENT: &str = "client-abc";

    fn verifier() -> IdTokenVerifier {
        IdTokenVerifier::new(TENANT, CLIENT)
    }

    fn issuer() -> String {
        format!("https://login.microsoftonline.com/{TENANT}/v2.0")
    }

    fn token_with(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    fn valid_claims() -> serde_json::Value {
        serde_json::json!({
            "iss": issuer(),
            "aud": CLIENT,
            "exp": Utc::now().timestamp() + 3600,
            "nbf": Utc::now().timestamp() - 60,
            "email": "ada@example.edu",
            "name": "Ada Lovelace",
            "sub": "subject-1",
        })
    }

    #[test]
    fn accepts_a_valid_token() {
        let identity = verifier().verify(&token_with(&valid_claims())).unwrap();
        assert_eq!(identity.email, "ada@example.edu");
        assert_eq!(identity.name, "Ada Lovelace");
        assert_eq!(identity.subject, "subject-1");
    }

    #[test]
    fn rejects_wrong_segment_count() {
        let err = verifier().verify("only.two").unwrap_err();
        assert!(matches!(err, GateError::MalformedToken { .. }));
    }

    #[test]
    fn rejects_invalid_base64_payload() {
        let err = verifier().verify("h.!!!not-base64!!!.s").unwrap_err();
        assert!(matches!(err, GateError::MalformedToken { .. }));
    }

    #[test]
    fn rejects_non_json_payload() {
        let payload = URL_SAFE_NO_PAD.encode("not json");
        let err = verifier().verify(&format!("h.{payload}.s")).unwrap_err();
        assert!(matches!(err, GateError::MalformedToken { .. }));
    }

    #[test]
    fn rejects_issuer_mismatch() {
        let mut claims = valid_claims();
        claims["iss"] = "https://login.microsoftonline.com/other-tenant/v2.0".into();
        let err = verifier().verify(&token_with(&claims)).unwrap_err();
        assert!(matches!(err, GateError::IssuerMismatch));
    }

    #[test]
    fn rejects_audience_mismatch() {
        let mut claims = valid_claims();
        claims["aud"] = "someone-else".into();
        let err = verifier().verify(&token_with(&claims)).unwrap_err();
        assert!(matches!(err, GateError::AudienceMismatch));
    }

    #[test]
    fn accepts_audience_arrays_containing_this_client() {
        let mut claims = valid_claims();
        claims["aud"] = serde_json::json!(["other", CLIENT]);
        assert!(verifier().verify(&token_with(&claims)).is_ok());
    }

    #[test]
    fn rejects_expired_token() {
        let mut claims = valid_claims();
        claims["exp"] = (Utc::now().timestamp() - 10).into();
        let err = verifier().verify(&token_with(&claims)).unwrap_err();
        assert!(matches!(err, GateError::TokenExpired));
    }

    #[test]
    fn rejects_not_yet_valid_token() {
        let mut claims = valid_claims();
        claims["nbf"] = (Utc::now().timestamp() + 3600).into();
        let err = verifier().verify(&token_with(&claims)).unwrap_err();
        assert!(matches!(err, GateError::TokenNotYetValid));
    }

    #[test]
    fn expiry_and_not_before_are_optional() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("exp");
        claims.as_object_mut().unwrap().remove("nbf");
        assert!(verifier().verify(&token_with(&claims)).is_ok());
    }

    #[test]
    fn email_falls_back_to_preferred_username_then_upn() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("email");
        claims["preferred_username"] = "pref@example.edu".into();
        let identity = verifier().verify(&token_with(&claims)).unwrap();
        assert_eq!(identity.email, "pref@example.edu");

        claims.as_object_mut().unwrap().remove("preferred_username");
        claims["upn"] = "upn@example.edu".into();
        let identity = verifier().verify(&token_with(&claims)).unwrap();
        assert_eq!(identity.email, "upn@example.edu");
    }

    #[test]
    fn empty_email_claim_is_skipped() {
        let mut claims = valid_claims();
        claims["email"] = "".into();
        claims["preferred_username"] = "pref@example.edu".into();
        let identity = verifier().verify(&token_with(&claims)).unwrap();
        assert_eq!(identity.email, "pref@example.edu");
    }

    #[test]
    fn name_defaults_to_user() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("name");
        let identity = verifier().verify(&token_with(&claims)).unwrap();
        assert_eq!(identity.name, "User");
    }

    #[test]
    fn subject_falls_back_to_oid() {
        let mut claims = valid_claims();
        claims.as_object_mut().unwrap().remove("sub");
        claims["oid"] = "oid-7".into();
        let identity = verifier().verify(&token_with(&claims)).unwrap();
        assert_eq!(identity.subject, "oid-7");
    }

    struct RejectAll;

    impl SignatureCheck for RejectAll {
        fn verify(&self, _raw_token: &str) -> GateResult<()> {
            Err(GateError::MalformedToken {
                detail: "signature rejected".to_owned(),
            })
        }
    }

    #[test]
    fn signature_check_runs_before_claims_validation() {
        let verifier = verifier().with_signature_check(Arc::new(RejectAll));
        let err = verifier.verify(&token_with(&valid_claims())).unwrap_err();
        assert!(matches!(err, GateError::MalformedToken { .. }));
    }
}
