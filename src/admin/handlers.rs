//! Admin API handlers: the config editor and a status probe.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::admin::AdminState;
use crate::config::schema::Config;
use crate::config::validation::validate_config;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub routes: usize,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        routes: state.lifecycle.current().routes.len(),
    })
}

/// Raw configuration document for the editor.
pub async fn get_config(State(state): State<AdminState>) -> Response {
    match state.lifecycle.store().read_raw() {
        Ok(raw) => ([(header::CONTENT_TYPE, "application/json")], raw).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "reading configuration failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error reading config").into_response()
        }
    }
}

/// Accept a new document: validate, persist, then drive the restart
/// protocol. Any failure leaves the previous configuration serving.
pub async fn post_config(State(state): State<AdminState>, body: String) -> Response {
    let config: Config = match serde_json::from_str(&body) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "rejected config update: bad JSON");
            return (StatusCode::BAD_REQUEST, "Error decoding JSON").into_response();
        }
    };

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::warn!(error = %error, "rejected config update");
        }
        return (StatusCode::BAD_REQUEST, "Invalid configuration").into_response();
    }

    if let Err(e) = state.lifecycle.store().persist(&config) {
        tracing::error!(error = %e, "persisting configuration failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error writing config").into_response();
    }

    if let Err(e) = state.lifecycle.restart().await {
        tracing::error!(error = %e, "restart failed");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Error applying config").into_response();
    }

    "okay".into_response()
}
