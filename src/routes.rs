// ABOUTME: HTTP route handlers for the home page, registration, callback, and audit listing
// ABOUTME: Thin axum wrappers delegating to the flow orchestrator and correlation store

//! HTTP routes.
//!
//! Handlers are thin wrappers: registration and callback delegate to the
//! [`FlowOrchestrator`], the invite listing reads the store directly, and
//! the home page is static. JSON endpoints carry permissive CORS headers via
//! the router-level layer; preflight `OPTIONS` is answered by that layer.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::errors::GateError;
use crate::flow::{CallbackPage, CallbackParams, FlowOrchestrator};
use crate::middleware::cors::setup_cors;
use crate::models::{invite_prefix, InviteRecord};
use crate::store::{Store, StoreProvider};
use crate::{constants::store_keys, templates};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The registration/callback state machine.
    pub flow: Arc<FlowOrchestrator>,
    /// Correlation store handle, used directly by the audit listing.
    pub store: Store,
}

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    /// The claimed email address.
    pub email: String,
}

/// Query parameters of the OAuth callback redirect.
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Query parameters of the invite listing.
#[derive(Debug, Deserialize)]
pub struct InviteListQuery {
    email: Option<String>,
}

/// Invite listing response.
#[derive(Debug, Serialize)]
pub struct InviteListResponse {
    /// Matching records, newest first.
    pub invites: Vec<InviteRecord>,
    /// Number of records returned.
    pub total: usize,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/register", post(register))
        .route("/callback", get(callback))
        .route("/api/invites", get(list_invites))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(setup_cors())
        .with_state(state)
}

async fn home() -> Html<&'static str> {
    Html(templates::home_page())
}

async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Response {
    match state.flow.register(&request.email).await {
        Ok(registration) => Json(json!({ "authUrl": registration.auth_url })).into_response(),
        Err(err @ GateError::RejectedDomain { .. }) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": err.page_message() })),
        )
            .into_response(),
        Err(err) => {
            error!(code = err.error_code(), "registration failed: {err}");
            (
                err.http_status(),
                Json(json!({
                    "error": "Failed to process registration",
                    "details": err.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn callback(State(state): State<AppState>, Query(query): Query<CallbackQuery>) -> Response {
    let page = state
        .flow
        .callback(CallbackParams {
            code: query.code,
            state: query.state,
            error: query.error,
            error_description: query.error_description,
        })
        .await;

    match page {
        CallbackPage::Success {
            user_name,
            invite_url,
        } => Html(templates::success_page(&user_name, &invite_url)).into_response(),
        CallbackPage::Rejected { title, message } => (
            StatusCode::BAD_REQUEST,
            Html(templates::error_page(&title, &message)),
        )
            .into_response(),
    }
}

async fn list_invites(
    State(state): State<AppState>,
    Query(query): Query<InviteListQuery>,
) -> Response {
    let prefix = query
        .email
        .as_deref()
        .map_or_else(|| store_keys::INVITE_PREFIX.to_owned(), invite_prefix);

    match state.store.scan_prefix::<InviteRecord>(&prefix).await {
        Ok(mut invites) => {
            invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            let total = invites.len();
            Json(InviteListResponse { invites, total }).into_response()
        }
        Err(err) => {
            error!(code = err.error_code(), "invite listing failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to list invites" })),
            )
                .into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
