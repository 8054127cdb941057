//! Router assembly and per-snapshot serving state.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{OidcClient, SessionStore};
use crate::config::schema::Config;
use crate::error::Result;
use crate::gateway::forward::ForwardClient;
use crate::gateway::{dispatch, redirect_found, request_host};
use crate::routing::{strip_port, RouteTable};

/// Upper bound on a proxied request/response exchange. Generous so slow
/// backends and long uploads survive; tunnels are unaffected once upgraded.
const PROXY_TIMEOUT: Duration = Duration::from_secs(240);

/// Request timeout for the HTTP→HTTPS redirect listener.
const REDIRECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything derived from one configuration document. Handlers reach the
/// snapshot through router state, so requests in flight during a restart
/// keep the snapshot they started with.
pub struct Snapshot {
    pub config: Config,
    pub routes: RouteTable,
    pub sessions: SessionStore,
    pub oidc: OidcClient,
    pub forwarder: ForwardClient,
    /// Whether the serving listener terminates TLS (sets the
    /// X-Forwarded-Proto/Ssl view backends get).
    pub tls_terminated: bool,
}

impl Snapshot {
    pub fn build(config: Config) -> Result<Arc<Self>> {
        let routes = RouteTable::from_config(&config)?;
        let sessions = SessionStore::new(
            &config.session_key,
            &config.tldn,
            config.cookie_max_age_secs(),
        );
        let oidc = OidcClient::new(&config.oauth)?;
        let tls_terminated = config.listen.tls;

        tracing::info!(
            routes = routes.len(),
            tldn = %config.tldn,
            "snapshot built"
        );

        Ok(Arc::new(Self {
            config,
            routes,
            sessions,
            oidc,
            forwarder: ForwardClient::new(),
            tls_terminated,
        }))
    }
}

/// The proxy router served on the TLS listener: external hosts plus the
/// gateway's own OAuth2 hostpaths, all funneled through the dispatcher.
pub fn build_router(snapshot: Arc<Snapshot>) -> Router {
    Router::new()
        .fallback(dispatch::handle)
        .with_state(snapshot)
        .layer(TimeoutLayer::new(PROXY_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// The plain-HTTP router: everything redirects to HTTPS.
pub fn redirect_router() -> Router {
    Router::new()
        .fallback(redirect_to_https)
        .layer(TimeoutLayer::new(REDIRECT_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

async fn redirect_to_https(request: Request) -> Response {
    let host = strip_port(request_host(&request)).to_string();
    if host.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    let path = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    redirect_found(&format!("https://{}{}", host, path))
}
