//! Per-request dispatch: the authentication state machine.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::gateway::server::Snapshot;
use crate::gateway::{api, forward, query_param, redirect_found, request_host, websocket};
use crate::observability::metrics;
use crate::routing::RouteEntry;

/// Identity header backends receive for authenticated requests.
pub const USER_HEADER: &str = "x-pylon-user";

/// Entry point for every request on the serving listener.
pub async fn handle(
    State(snapshot): State<Arc<Snapshot>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let host = request_host(&request).to_string();

    if snapshot.routes.is_oauth_host(&host) {
        return snapshot.oidc.handle(&snapshot.sessions, request).await;
    }

    let Some(route) = snapshot.routes.lookup(&host).cloned() else {
        tracing::warn!(host = %host, "no route for host");
        return StatusCode::NOT_FOUND.into_response();
    };

    dispatch(&snapshot, &route, remote, &host, request).await
}

async fn dispatch(
    snapshot: &Snapshot,
    route: &Arc<RouteEntry>,
    remote: SocketAddr,
    host: &str,
    mut request: Request<Body>,
) -> Response {
    if request.method() == Method::OPTIONS {
        return preflight(request.headers());
    }

    // Dashboard subdomains bounce once through a marker query so the SPA's
    // hash router lands on its dashboard view. The trailing slash in the
    // marker distinguishes it from hash-route fragments.
    if snapshot.routes.subdomain(host).starts_with("dashboard")
        && query_param(request.uri(), "isDashboardRedirect").as_deref() != Some("true/")
    {
        return redirect_found("?isDashboardRedirect=true/#/dashboard");
    }

    let path = request.uri().path().to_string();
    let email = snapshot.sessions.resolve(request.headers());

    // Reserved prefix: served locally, never forwarded to any backend.
    if let Some(rest) = path.strip_prefix(api::INTERNAL_PREFIX) {
        if rest.is_empty() || rest.starts_with('/') {
            return api::handle(snapshot, rest.trim_start_matches('/'), email.as_deref());
        }
    }

    if route.is_open_route(&path) {
        tracing::debug!(path = %path, backend = %route.internal, "unauthenticated route bypass");
    } else {
        match &email {
            None => {
                metrics::record_auth_redirect();
                let login = format!(
                    "{}?referer={}{}",
                    snapshot.config.oauth.auth_url, host, path
                );
                return redirect_found(&login);
            }
            Some(email) if !route.allows(email) => {
                metrics::record_auth_denied();
                tracing::warn!(email = %email, host = %host, path = %path, "user not in allow-list");
                return denial_page(email, &snapshot.config.oauth.auth_url);
            }
            Some(email) => match HeaderValue::from_str(email) {
                Ok(value) => {
                    request.headers_mut().insert(USER_HEADER, value);
                }
                Err(_) => {
                    tracing::error!("session email is not a valid header value");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            },
        }
    }

    let remote_ip = remote.ip().to_string();
    if websocket::is_websocket_upgrade(request.headers()) {
        websocket::tunnel(snapshot, route, host, &remote_ip, request).await
    } else {
        forward::forward(snapshot, route, host, &remote_ip, request).await
    }
}

/// CORS response for OPTIONS: the allowed origin mirrors the request.
fn preflight(headers: &HeaderMap) -> Response {
    let mut response = StatusCode::OK.into_response();
    let out = response.headers_mut();
    if let Some(origin) = headers.get(header::ORIGIN) {
        out.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    }
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS, PUT, DELETE"),
    );
    out.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(
            "Accept, Content-Type, Content-Length, Accept-Encoding, X-CSRF-Token, Authorization",
        ),
    );
    out.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    response
}

/// Authorization denial is a page, not an error status: the user is
/// authenticated, just not welcome here.
fn denial_page(email: &str, auth_url: &str) -> Response {
    let body = format!(
        "<h3>User {} is unauthorized to access this resource.</h3>\n\
         <button onclick=\"window.location.href = '{}';\">Login</button>",
        email, auth_url
    );
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preflight_mirrors_origin() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_static("https://app.example.com"));

        let response = preflight(&headers);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
            "true"
        );
    }

    #[test]
    fn preflight_without_origin_sets_no_allow_origin() {
        let response = preflight(&HeaderMap::new());
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }

    #[test]
    fn denial_page_names_the_user() {
        let response = denial_page("guest@x", "https://auth.example.com/login");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }
}
