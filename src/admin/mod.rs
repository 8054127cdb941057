//! Admin surface: static frontend plus the configuration editor API.
//!
//! Served on its own long-lived listener so a reload in progress can
//! still be observed from the editor that triggered it.

pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::lifecycle::Lifecycle;

use self::handlers::{get_config, get_status, post_config};

#[derive(Clone)]
pub struct AdminState {
    pub lifecycle: Arc<Lifecycle>,
}

/// Build the admin router: `/config` editor API, a status probe, and the
/// static frontend for everything else.
pub fn router(lifecycle: Arc<Lifecycle>, frontend_dir: PathBuf) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::CONTENT_LENGTH,
            header::ACCEPT_ENCODING,
            header::HeaderName::from_static("x-csrf-token"),
            header::AUTHORIZATION,
        ])
        .allow_credentials(true);

    Router::new()
        .route("/config", get(get_config).post(post_config))
        .route("/status", get(get_status))
        .fallback_service(ServeDir::new(frontend_dir))
        .with_state(AdminState { lifecycle })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
