//! Configuration schema definitions.
//!
//! The on-disk document is a single JSON object. All types derive Serde
//! traits; secrets get a redacting `Debug` so they never reach the logs.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Apex domain. Used as the session cookie domain and as the suffix
    /// stripped when extracting subdomains.
    pub tldn: String,

    /// Legacy global allow-list. Kept for document fidelity; per-proxy
    /// lists are what gate access.
    pub allowed_users: Vec<String>,

    /// Proxied applications.
    pub proxies: Vec<ProxyEntry>,

    /// Opaque session-signing secret.
    pub session_key: String,

    /// Session cookie lifetime in nanoseconds (Go `time.Duration` wire
    /// format, preserved for compatibility with existing documents).
    pub cookie_expire: u64,

    /// OAuth2 provider credentials and gateway-facing URLs.
    pub oauth: OauthConfig,

    /// Serving listener addresses.
    pub listen: ListenConfig,
}

impl Config {
    /// Cookie Max-Age in whole seconds.
    pub fn cookie_max_age_secs(&self) -> i64 {
        (self.cookie_expire / 1_000_000_000) as i64
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("tldn", &self.tldn)
            .field("allowed_users", &self.allowed_users)
            .field("proxies", &self.proxies)
            .field("session_key", &"****")
            .field("cookie_expire", &self.cookie_expire)
            .field("oauth", &self.oauth)
            .field("listen", &self.listen)
            .finish()
    }
}

/// One proxied application: an external hostname mapped to an internal
/// backend origin.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyEntry {
    /// Backend origin (scheme + host[:port]).
    pub internal: String,

    /// External hostname clients use.
    pub external: String,

    /// Emails allowed to reach this backend.
    pub allowed_users: Vec<String>,

    /// Regex fragments joined by `|`; matching paths bypass the auth gate.
    /// An empty list matches no path.
    pub unauthenticated_routes: Vec<String>,
}

/// OAuth2 credentials and the gateway's own login/callback URLs.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OauthConfig {
    /// The gateway's externally-visible login URL. Unauthenticated users
    /// are redirected here; the host is served by the gateway itself.
    pub auth_url: String,

    /// OAuth2 client ID.
    pub client_id: String,

    /// OAuth2 client secret.
    pub client_secret: String,

    /// Registered callback URL; the host is served by the gateway itself.
    pub redirect_url: String,

    /// Provider authorize endpoint. Defaults to Google.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorize_endpoint: Option<String>,

    /// Provider token endpoint. Defaults to Google.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,
}

impl std::fmt::Debug for OauthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OauthConfig")
            .field("auth_url", &self.auth_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .field("redirect_url", &self.redirect_url)
            .field("authorize_endpoint", &self.authorize_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenConfig {
    /// TLS-terminating proxy listener.
    pub https_addr: SocketAddr,

    /// Plain-HTTP listener that redirects to HTTPS.
    pub http_addr: SocketAddr,

    /// Terminate TLS on the proxy listener. Disabled only for tests and
    /// deployments behind an outer TLS terminator.
    pub tls: bool,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            https_addr: "0.0.0.0:443".parse().expect("static address"),
            http_addr: "0.0.0.0:80".parse().expect("static address"),
            tls: true,
        }
    }
}
