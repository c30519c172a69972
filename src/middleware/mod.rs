// ABOUTME: HTTP middleware layers applied at router construction
// ABOUTME: Currently CORS only; tracing comes from tower-http directly

//! Middleware layers.

/// CORS configuration for the JSON endpoints
pub mod cors;
