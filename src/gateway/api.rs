//! Internal gateway API, served under a reserved path prefix.
//!
//! The prefix is carved out before forwarding on every route, so no
//! request under it ever reaches a backend.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::gateway::server::Snapshot;

/// Reserved path prefix, embedded by the dashboard frontend.
pub const INTERNAL_PREFIX: &str = "/8ef55d02bd174c29177d5618bfb3a2f3";

#[derive(Serialize)]
struct AppListResponse {
    apps: Vec<String>,
}

/// Dispatch an internal API resource.
pub fn handle(snapshot: &Snapshot, resource: &str, email: Option<&str>) -> Response {
    match resource {
        "allowedApps" => allowed_apps(snapshot, email),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// External hosts whose allow-list contains the session email.
fn allowed_apps(snapshot: &Snapshot, email: Option<&str>) -> Response {
    let Some(email) = email else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let apps = snapshot
        .config
        .proxies
        .iter()
        .filter(|proxy| proxy.allowed_users.iter().any(|user| user == email))
        .map(|proxy| proxy.external.clone())
        .collect();

    Json(AppListResponse { apps }).into_response()
}
