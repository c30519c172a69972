// ABOUTME: Integration tests for the registration/callback state machine
// ABOUTME: Drives the orchestrator against mock upstream clients and the in-memory store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GuildPass Project

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use url::Url;

use guildpass::directory::{DirectoryApi, PendingGuest, ProvisionedGuest};
use guildpass::discord::InviteApi;
use guildpass::errors::{GateError, GateResult};
use guildpass::flow::{CallbackPage, CallbackParams, FlowOrchestrator};
use guildpass::identity::IdTokenVerifier;
use guildpass::models::{InviteRecord, PendingFlow};
use guildpass::oauth::{IdentityProvider, TokenExchange};
use guildpass::store::{memory::InMemoryStore, Store, StoreConfig, StoreProvider};
use guildpass::sweep;

const TENANT: &str = "tenant-123";
const CLIENT: &str = "client-abc";
const DOMAIN: &str = "alloweddomain.edu";
const GUEST_ID: &str = "guest-1";
const REDEEM_URL: &str = "https://redeem.test/guest-1";
const INVITE_URL: &str = "https://discord.gg/test123";

fn expected_issuer() -> String {
    format!("https://login.microsoftonline.com/{TENANT}/v2.0")
}

fn make_id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}

fn valid_token_for(email: &str) -> String {
    make_id_token(&serde_json::json!({
        "iss": expected_issuer(),
        "aud": CLIENT,
        "exp": Utc::now().timestamp() + 3600,
        "email": email,
        "name": "Ada Lovelace",
        "sub": "subject-1",
    }))
}

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

struct MockIdp {
    exchange: Mutex<GateResult<String>>,
    last_auth_url: Mutex<Option<String>>,
}

impl MockIdp {
    fn with_token(id_token: &str) -> Arc<Self> {
        Arc::new(Self {
            exchange: Mutex::new(Ok(id_token.to_owned())),
            last_auth_url: Mutex::new(None),
        })
    }

    fn failing_exchange() -> Arc<Self> {
        Arc::new(Self {
            exchange: Mutex::new(Err(GateError::AuthCodeExchangeFailed {
                detail: "upstream said no".to_owned(),
            })),
            last_auth_url: Mutex::new(None),
        })
    }

    /// State token captured from the most recent authorization URL.
    fn issued_state(&self) -> String {
        let url = self
            .last_auth_url
            .lock()
            .unwrap()
            .clone()
            .expect("no authorization URL was built");
        let parsed = Url::parse(&url).unwrap();
        parsed
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .expect("authorization URL carries no state")
    }
}

#[async_trait]
impl IdentityProvider for MockIdp {
    fn authorization_url(&self, state: &str, login_hint: &str) -> String {
        let url = format!(
            "https://login.test/authorize?state={}&login_hint={}",
            urlencoding::encode(state),
            urlencoding::encode(login_hint)
        );
        *self.last_auth_url.lock().unwrap() = Some(url.clone());
        url
    }

    async fn exchange_code(&self, _code: &str) -> GateResult<TokenExchange> {
        match &*self.exchange.lock().unwrap() {
            Ok(id_token) => Ok(TokenExchange {
                id_token: id_token.clone(),
            }),
            Err(GateError::AuthCodeExchangeFailed { detail }) => {
                Err(GateError::AuthCodeExchangeFailed {
                    detail: detail.clone(),
                })
            }
            Err(_) => unreachable!("mock only fails with AuthCodeExchangeFailed"),
        }
    }
}

#[derive(Clone, Copy)]
enum ProvisionMode {
    Created,
    AlreadyExists,
}

struct MockDirectory {
    mode: ProvisionMode,
    provisions: AtomicUsize,
    deletes: Mutex<Vec<String>>,
    pending: Vec<PendingGuest>,
}

impl MockDirectory {
    fn new(mode: ProvisionMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            provisions: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            pending: Vec::new(),
        })
    }

    fn with_pending(pending: Vec<PendingGuest>) -> Arc<Self> {
        Arc::new(Self {
            mode: ProvisionMode::Created,
            provisions: AtomicUsize::new(0),
            deletes: Mutex::new(Vec::new()),
            pending,
        })
    }

    fn provision_count(&self) -> usize {
        self.provisions.load(Ordering::SeqCst)
    }

    fn deleted(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DirectoryApi for MockDirectory {
    async fn provision_guest(
        &self,
        _email: &str,
        _redirect_target: &str,
    ) -> GateResult<ProvisionedGuest> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            ProvisionMode::Created => Ok(ProvisionedGuest {
                guest_user_id: Some(GUEST_ID.to_owned()),
                redeem_url: Some(REDEEM_URL.to_owned()),
            }),
            ProvisionMode::AlreadyExists => Ok(ProvisionedGuest {
                guest_user_id: None,
                redeem_url: None,
            }),
        }
    }

    async fn delete_guest(&self, guest_user_id: &str) {
        self.deletes.lock().unwrap().push(guest_user_id.to_owned());
    }

    async fn list_pending_guests(&self) -> GateResult<Vec<PendingGuest>> {
        Ok(self.pending.clone())
    }
}

struct MockInvites {
    calls: AtomicUsize,
    fail: bool,
}

impl MockInvites {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InviteApi for MockInvites {
    async fn create_invite(&self) -> GateResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GateError::InviteCreationFailed {
                detail: "channel gone".to_owned(),
            });
        }
        Ok(INVITE_URL.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    flow: FlowOrchestrator,
    store: Store,
    idp: Arc<MockIdp>,
    directory: Arc<MockDirectory>,
    invites: Arc<MockInvites>,
}

fn test_store() -> Store {
    Store::Memory(InMemoryStore::new(&StoreConfig {
        enable_background_cleanup: false,
        ..StoreConfig::default()
    }))
}

fn harness(
    idp: Arc<MockIdp>,
    directory: Arc<MockDirectory>,
    invites: Arc<MockInvites>,
) -> Harness {
    let store = test_store();
    let flow = FlowOrchestrator::new(
        DOMAIN.to_owned(),
        store.clone(),
        idp.clone(),
        directory.clone(),
        invites.clone(),
        IdTokenVerifier::new(TENANT, CLIENT),
    );
    Harness {
        flow,
        store,
        idp,
        directory,
        invites,
    }
}

fn default_harness() -> Harness {
    harness(
        MockIdp::with_token(&valid_token_for(&format!("user@{DOMAIN}"))),
        MockDirectory::new(ProvisionMode::Created),
        MockInvites::new(),
    )
}

fn callback_with(code: &str, state: &str) -> CallbackParams {
    CallbackParams {
        code: Some(code.to_owned()),
        state: Some(state.to_owned()),
        ..CallbackParams::default()
    }
}

async fn stored_flows(store: &Store) -> Vec<PendingFlow> {
    store.scan_prefix("state:").await.unwrap()
}

async fn stored_invites(store: &Store) -> Vec<InviteRecord> {
    store.scan_prefix("invite:").await.unwrap()
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn foreign_domain_is_rejected_with_no_side_effects() {
    let h = default_harness();

    let err = h.flow.register("user@evil.com").await.unwrap_err();

    assert!(matches!(err, GateError::RejectedDomain { .. }));
    assert_eq!(h.directory.provision_count(), 0);
    assert!(stored_flows(&h.store).await.is_empty());
}

#[tokio::test]
async fn registration_responds_with_redeem_url_and_binds_guest() {
    let h = default_harness();

    let registration = h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();

    assert_eq!(registration.auth_url, REDEEM_URL);
    let flows = stored_flows(&h.store).await;
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].email, format!("user@{DOMAIN}"));
    assert_eq!(flows[0].guest_user_id.as_deref(), Some(GUEST_ID));
}

#[tokio::test]
async fn existing_guest_falls_back_to_the_authorization_url() {
    let h = harness(
        MockIdp::with_token(&valid_token_for(&format!("user@{DOMAIN}"))),
        MockDirectory::new(ProvisionMode::AlreadyExists),
        MockInvites::new(),
    );

    let registration = h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();

    // No redeem URL was issued, so the response is the originally
    // constructed authorization URL with the issued state token.
    let state = h.idp.issued_state();
    assert!(registration.auth_url.starts_with("https://login.test/authorize?"));
    assert!(registration.auth_url.contains(&format!("state={state}")));

    let flows = stored_flows(&h.store).await;
    assert_eq!(flows.len(), 1);
    assert_eq!(flows[0].guest_user_id, None);
}

#[tokio::test]
async fn email_domain_check_is_case_insensitive() {
    let h = default_harness();
    let registration = h.flow.register(&format!("User@{}", DOMAIN.to_uppercase())).await;
    assert!(registration.is_ok());
}

// ---------------------------------------------------------------------------
// Callback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn end_to_end_flow_issues_a_single_use_invite() {
    let h = default_harness();
    let email = format!("user@{DOMAIN}");

    h.flow.register(&email).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;
    let CallbackPage::Success {
        user_name,
        invite_url,
    } = page
    else {
        panic!("expected success page, got {page:?}");
    };
    assert_eq!(user_name, "Ada Lovelace");
    assert_eq!(invite_url, INVITE_URL);

    let records = stored_invites(&h.store).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].email, email);
    assert_eq!(records[0].invite_url, INVITE_URL);

    // The state token was consumed: replaying the callback is rejected and
    // issues nothing further.
    let replay = h.flow.callback(callback_with("auth-code", &state)).await;
    let CallbackPage::Rejected { title, .. } = replay else {
        panic!("expected rejection on replay");
    };
    assert_eq!(title, "Link invalid or expired");
    assert_eq!(h.invites.call_count(), 1);
    assert_eq!(stored_invites(&h.store).await.len(), 1);
}

#[tokio::test]
async fn unknown_state_token_is_rejected() {
    let h = default_harness();
    let page = h.flow.callback(callback_with("auth-code", "no-such-state")).await;
    assert!(matches!(page, CallbackPage::Rejected { .. }));
    assert_eq!(h.invites.call_count(), 0);
}

#[tokio::test]
async fn verified_email_binding_is_case_insensitive() {
    let email = format!("User@{DOMAIN}");
    let h = harness(
        MockIdp::with_token(&valid_token_for(&format!("user@{DOMAIN}"))),
        MockDirectory::new(ProvisionMode::Created),
        MockInvites::new(),
    );

    h.flow.register(&email).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;
    assert!(matches!(page, CallbackPage::Success { .. }));
}

#[tokio::test]
async fn email_binding_mismatch_rejects_and_deletes_the_guest_once() {
    // Same domain, different mailbox than the one registered.
    let h = harness(
        MockIdp::with_token(&valid_token_for(&format!("other@{DOMAIN}"))),
        MockDirectory::new(ProvisionMode::Created),
        MockInvites::new(),
    );

    h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;

    assert!(matches!(page, CallbackPage::Rejected { .. }));
    assert_eq!(h.directory.deleted(), vec![GUEST_ID.to_owned()]);
    assert_eq!(h.invites.call_count(), 0);
    assert!(stored_invites(&h.store).await.is_empty());
}

#[tokio::test]
async fn issuer_mismatch_rejects_and_deletes_the_guest() {
    let token = make_id_token(&serde_json::json!({
        "iss": "https://login.microsoftonline.com/other-tenant/v2.0",
        "aud": CLIENT,
        "exp": Utc::now().timestamp() + 3600,
        "email": format!("user@{DOMAIN}"),
        "sub": "subject-1",
    }));
    let h = harness(
        MockIdp::with_token(&token),
        MockDirectory::new(ProvisionMode::Created),
        MockInvites::new(),
    );

    h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;

    let CallbackPage::Rejected { title, .. } = page else {
        panic!("expected rejection");
    };
    assert_eq!(title, "Sign-in could not be verified");
    assert_eq!(h.directory.deleted(), vec![GUEST_ID.to_owned()]);
}

#[tokio::test]
async fn exchange_failure_still_compensates_the_bound_guest() {
    let h = harness(
        MockIdp::failing_exchange(),
        MockDirectory::new(ProvisionMode::Created),
        MockInvites::new(),
    );

    h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;

    assert!(matches!(page, CallbackPage::Rejected { .. }));
    assert_eq!(h.directory.deleted(), vec![GUEST_ID.to_owned()]);
}

#[tokio::test]
async fn invite_creation_failure_compensates_and_renders_generic_error() {
    let h = harness(
        MockIdp::with_token(&valid_token_for(&format!("user@{DOMAIN}"))),
        MockDirectory::new(ProvisionMode::Created),
        MockInvites::failing(),
    );

    h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;

    let CallbackPage::Rejected { title, message } = page else {
        panic!("expected rejection");
    };
    assert_eq!(title, "Something went wrong");
    assert!(!message.contains("channel gone"));
    assert_eq!(h.directory.deleted(), vec![GUEST_ID.to_owned()]);
    assert!(stored_invites(&h.store).await.is_empty());
}

#[tokio::test]
async fn no_guest_bound_means_nothing_to_compensate() {
    let h = harness(
        MockIdp::with_token(&valid_token_for(&format!("other@{DOMAIN}"))),
        MockDirectory::new(ProvisionMode::AlreadyExists),
        MockInvites::new(),
    );

    h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();
    let state = h.idp.issued_state();

    let page = h.flow.callback(callback_with("auth-code", &state)).await;

    assert!(matches!(page, CallbackPage::Rejected { .. }));
    assert!(h.directory.deleted().is_empty());
}

#[tokio::test]
async fn idp_error_short_circuits_without_touching_state() {
    let h = default_harness();

    h.flow.register(&format!("user@{DOMAIN}")).await.unwrap();

    let page = h
        .flow
        .callback(CallbackParams {
            error: Some("access_denied".to_owned()),
            error_description: Some("User cancelled the sign-in.".to_owned()),
            ..CallbackParams::default()
        })
        .await;

    let CallbackPage::Rejected { message, .. } = page else {
        panic!("expected rejection");
    };
    assert_eq!(message, "User cancelled the sign-in.");
    // The pending flow was not consumed.
    assert_eq!(stored_flows(&h.store).await.len(), 1);
}

#[tokio::test]
async fn missing_code_or_state_is_rejected() {
    let h = default_harness();

    let page = h
        .flow
        .callback(CallbackParams {
            state: Some("some-state".to_owned()),
            ..CallbackParams::default()
        })
        .await;
    assert!(matches!(page, CallbackPage::Rejected { .. }));

    let page = h
        .flow
        .callback(CallbackParams {
            code: Some("some-code".to_owned()),
            ..CallbackParams::default()
        })
        .await;
    assert!(matches!(page, CallbackPage::Rejected { .. }));
}

// ---------------------------------------------------------------------------
// Sweep
// ---------------------------------------------------------------------------

#[tokio::test]
async fn sweep_deletes_only_guests_older_than_the_grace_window() {
    let now = Utc::now();
    let directory = MockDirectory::with_pending(vec![
        PendingGuest {
            id: "stale-guest".to_owned(),
            created_at: now - chrono::Duration::hours(48),
        },
        PendingGuest {
            id: "fresh-guest".to_owned(),
            created_at: now - chrono::Duration::minutes(5),
        },
    ]);

    let deleted = sweep::sweep_once(directory.as_ref(), 86_400, now)
        .await
        .unwrap();

    assert_eq!(deleted, 1);
    assert_eq!(directory.deleted(), vec!["stale-guest".to_owned()]);
}

// ---------------------------------------------------------------------------
// Pending flow round trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_flow_round_trips_through_the_store() {
    let store = test_store();
    let flow = PendingFlow {
        email: "a@d.edu".to_owned(),
        guest_user_id: Some("g1".to_owned()),
    };

    store
        .put("state:tok", &flow, Duration::from_secs(600))
        .await
        .unwrap();

    let read: Option<PendingFlow> = store.get("state:tok").await.unwrap();
    assert_eq!(read, Some(flow.clone()));

    let taken: Option<PendingFlow> = store.take("state:tok").await.unwrap();
    assert_eq!(taken, Some(flow));

    let gone: Option<PendingFlow> = store.get("state:tok").await.unwrap();
    assert_eq!(gone, None);
}
