//! OAuth2/OIDC login flow.
//!
//! The gateway serves two hostpaths of its own: the login URL, which
//! forwards the browser to the provider's authorize endpoint with the
//! original target carried in `state`, and the registered callback, which
//! exchanges the code, extracts the email from the ID token payload and
//! establishes the session cookie.
//!
//! Identity failures deliberately collapse to a generic 500: token
//! exchange output and user input never reach the response body.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use url::Url;

use crate::auth::session::SessionStore;
use crate::config::schema::OauthConfig;
use crate::error::{Error, Result};
use crate::gateway::{query_param, redirect_found, request_host};
use crate::routing::strip_port;

pub const GOOGLE_AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

const OAUTH_SCOPES: &str = "email profile";

/// OAuth2 client bound to one config snapshot.
pub struct OidcClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    authorize_endpoint: Url,
    token_endpoint: String,
    auth_host: String,
    redirect_host: String,
    redirect_path: String,
}

impl OidcClient {
    pub fn new(oauth: &OauthConfig) -> Result<Self> {
        let auth = Url::parse(&oauth.auth_url)
            .map_err(|e| Error::Config(format!("oauth.auth_url: {}", e)))?;
        let redirect = Url::parse(&oauth.redirect_url)
            .map_err(|e| Error::Config(format!("oauth.redirect_url: {}", e)))?;
        let authorize_endpoint = Url::parse(
            oauth
                .authorize_endpoint
                .as_deref()
                .unwrap_or(GOOGLE_AUTHORIZE_ENDPOINT),
        )
        .map_err(|e| Error::Config(format!("oauth.authorize_endpoint: {}", e)))?;

        Ok(Self {
            http: reqwest::Client::new(),
            client_id: oauth.client_id.clone(),
            client_secret: oauth.client_secret.clone(),
            redirect_url: oauth.redirect_url.clone(),
            authorize_endpoint,
            token_endpoint: oauth
                .token_endpoint
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_ENDPOINT.to_string()),
            auth_host: auth.host_str().unwrap_or_default().to_string(),
            redirect_host: redirect.host_str().unwrap_or_default().to_string(),
            redirect_path: redirect.path().to_string(),
        })
    }

    /// Serve a request addressed to one of the gateway's own OAuth2 hosts.
    ///
    /// When the login and callback URLs share a hostname the request path
    /// decides; otherwise the host does, matching how the two hostpaths are
    /// registered.
    pub async fn handle(&self, sessions: &SessionStore, request: Request<Body>) -> Response {
        let host = request_host(&request).to_string();
        let is_callback = if self.auth_host == self.redirect_host {
            request.uri().path() == self.redirect_path
        } else {
            strip_port(&host) == self.redirect_host
        };

        if is_callback {
            self.complete_login(sessions, request.uri()).await
        } else {
            let referer = query_param(request.uri(), "referer").unwrap_or_default();
            self.authorize_redirect(&referer)
        }
    }

    /// 302 to the provider's authorize endpoint, carrying the original
    /// target in `state`.
    fn authorize_redirect(&self, referer: &str) -> Response {
        let mut url = self.authorize_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", OAUTH_SCOPES)
            .append_pair("state", referer);
        redirect_found(url.as_str())
    }

    /// The OAuth2 callback: exchange the code, verify the ID token claims,
    /// set the session cookie and send the browser back where it started.
    async fn complete_login(&self, sessions: &SessionStore, uri: &Uri) -> Response {
        let Some(code) = query_param(uri, "code") else {
            tracing::warn!("callback without authorization code");
            return identity_failure();
        };

        let id_token = match self.exchange_code(&code).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "token exchange failed");
                return identity_failure();
            }
        };

        let email = match email_from_id_token(&id_token) {
            Ok(email) => email,
            Err(e) => {
                tracing::error!(error = %e, "ID token rejected");
                return identity_failure();
            }
        };

        let set_cookie = sessions.issue(&email);
        tracing::info!(email = %email, "login completed");

        let referer = query_param(uri, "state").unwrap_or_default();
        if referer.is_empty() {
            return (
                StatusCode::OK,
                [(header::SET_COOKIE, set_cookie)],
                format!(
                    "Authenticated as {}. You can now access your applications.",
                    email
                ),
            )
                .into_response();
        }

        // The referer was recorded scheme-less; anything that names its own
        // scheme is an open-redirect attempt unless it is already https.
        let target = if referer.starts_with("https://") {
            referer
        } else if referer.contains("://") {
            tracing::warn!(state = %referer, "refusing non-https redirect target");
            return identity_failure();
        } else {
            format!("https://{}", referer)
        };

        let mut response = redirect_found(&target);
        if let Ok(value) = set_cookie.parse() {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
        response
    }

    async fn exchange_code(&self, code: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct TokenResponse {
            #[serde(default)]
            id_token: Option<String>,
        }

        let response = self
            .http
            .post(&self.token_endpoint)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Identity(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        token
            .id_token
            .ok_or_else(|| Error::Identity("token response missing id_token".to_string()))
    }
}

/// Extract the verified email from an OIDC ID token payload.
///
/// The token is not signature-checked here: it was just received directly
/// from the provider over the token-exchange channel.
pub fn email_from_id_token(id_token: &str) -> Result<String> {
    #[derive(Deserialize)]
    struct Claims {
        #[serde(default)]
        email: String,
        #[serde(default)]
        email_verified: bool,
    }

    let segments: Vec<&str> = id_token.split('.').collect();
    if segments.len() != 3 {
        return Err(Error::Identity("malformed ID token".to_string()));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|e| Error::Identity(format!("ID token payload: {}", e)))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| Error::Identity(format!("ID token claims: {}", e)))?;

    if claims.email.is_empty() {
        return Err(Error::Identity("missing email in ID token".to_string()));
    }
    if !claims.email_verified {
        return Err(Error::Identity(format!(
            "email {} not listed as verified",
            claims.email
        )));
    }
    Ok(claims.email)
}

fn identity_failure() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Authentication failed").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_id_token(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{}.{}.signature", header, payload)
    }

    #[test]
    fn email_round_trips_through_id_token() {
        for email in ["user@x", "first.last@example.org"] {
            let token = encode_id_token(&serde_json::json!({
                "email": email,
                "email_verified": true,
            }));
            assert_eq!(email_from_id_token(&token).unwrap(), email);
        }
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(email_from_id_token("only.two").is_err());
        assert!(email_from_id_token("a.b.c.d").is_err());
    }

    #[test]
    fn rejects_unverified_email() {
        let token = encode_id_token(&serde_json::json!({
            "email": "user@x",
            "email_verified": false,
        }));
        assert!(email_from_id_token(&token).is_err());
    }

    #[test]
    fn rejects_missing_email() {
        let token = encode_id_token(&serde_json::json!({ "email_verified": true }));
        assert!(email_from_id_token(&token).is_err());
    }

    #[test]
    fn authorize_redirect_carries_state() {
        let client = OidcClient::new(&OauthConfig {
            auth_url: "https://auth.example.com/login".into(),
            redirect_url: "https://auth.example.com/callback".into(),
            client_id: "cid".into(),
            client_secret: "secret".into(),
            ..Default::default()
        })
        .unwrap();

        let response = client.authorize_redirect("app.example.com/inbox");
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with(GOOGLE_AUTHORIZE_ENDPOINT));
        assert!(location.contains("client_id=cid"));
        assert!(location.contains("state=app.example.com%2Finbox"));
    }
}
