// ABOUTME: CORS middleware configuration for the JSON API endpoints
// ABOUTME: Permissive by design: any origin, GET/POST/OPTIONS, content-type header
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GuildPass Project

use http::{header::HeaderName, Method};
use tower_http::cors::{Any, CorsLayer};

/// Configure the permissive CORS layer.
///
/// The registration form may be embedded on other institutional pages, so
/// all origins are allowed. Preflight `OPTIONS` requests are answered by
/// this layer with the headers and no body.
#[must_use]
pub fn setup_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers([HeaderName::from_static("content-type")])
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
}
