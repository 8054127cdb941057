//! HTTP serving subsystem.
//!
//! # Data Flow
//! ```text
//! TLS-terminated request
//!     → server.rs (router, per-snapshot state)
//!     → dispatch.rs (CORS preflight, dashboard redirect, internal API
//!       carve-out, authentication gate)
//!     → forward.rs (reverse proxy) | websocket.rs (raw tunnel)
//!     → backend
//! ```

pub mod api;
pub mod dispatch;
pub mod forward;
pub mod server;
pub mod websocket;

pub use server::{build_router, redirect_router, Snapshot};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

/// Inbound Host, from the Host header or the request target.
pub(crate) fn request_host(request: &Request<Body>) -> &str {
    request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
}

/// First query parameter with the given name, form-decoded.
pub(crate) fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Plain `302 Found` redirect; several flows require exactly this status.
pub(crate) fn redirect_found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
