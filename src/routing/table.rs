//! Route table compilation and host lookup.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::Regex;
use url::Url;

use crate::config::schema::Config;
use crate::error::{Error, Result};

/// Compiled routing entry for one proxied application.
#[derive(Debug)]
pub struct RouteEntry {
    /// External hostname this entry serves.
    pub external: String,
    /// Parsed backend origin.
    pub internal: Url,
    /// Joined unauthenticated-route alternation. `None` when the configured
    /// list is empty: an empty pattern would match every path, and an empty
    /// list must match none.
    open_routes: Option<Regex>,
    allowed_users: HashSet<String>,
}

impl RouteEntry {
    fn compile(
        external: &str,
        internal: &str,
        allowed_users: &[String],
        fragments: &[String],
    ) -> Result<Self> {
        let internal = Url::parse(internal)
            .map_err(|e| Error::Config(format!("internal URL '{}': {}", internal, e)))?;

        let pattern = fragments
            .iter()
            .filter(|f| !f.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join("|");
        let open_routes = if pattern.is_empty() {
            None
        } else {
            Some(
                Regex::new(&pattern)
                    .map_err(|e| Error::Config(format!("route pattern '{}': {}", pattern, e)))?,
            )
        };

        Ok(Self {
            external: external.to_string(),
            internal,
            open_routes,
            allowed_users: allowed_users.iter().cloned().collect(),
        })
    }

    /// Whether this path bypasses the authentication gate.
    pub fn is_open_route(&self, path: &str) -> bool {
        match &self.open_routes {
            Some(re) => re.is_match(path),
            None => false,
        }
    }

    pub fn allows(&self, email: &str) -> bool {
        self.allowed_users.contains(email)
    }
}

/// Immutable host → backend mapping derived from exactly one configuration
/// snapshot. Rebuilt wholesale by the restart protocol; never mutated.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<String, Arc<RouteEntry>>,
    tldn: String,
    auth_host: String,
    redirect_host: String,
}

impl RouteTable {
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut routes = HashMap::with_capacity(config.proxies.len());
        for proxy in &config.proxies {
            let entry = RouteEntry::compile(
                &proxy.external,
                &proxy.internal,
                &proxy.allowed_users,
                &proxy.unauthenticated_routes,
            )?;
            routes.insert(proxy.external.clone(), Arc::new(entry));
        }

        let auth_host = host_of_url(&config.oauth.auth_url)?;
        let redirect_host = host_of_url(&config.oauth.redirect_url)?;

        Ok(Self {
            routes,
            tldn: config.tldn.clone(),
            auth_host,
            redirect_host,
        })
    }

    /// Look up the route for an inbound Host header (port ignored).
    pub fn lookup(&self, host: &str) -> Option<&Arc<RouteEntry>> {
        self.routes.get(strip_port(host.trim()))
    }

    pub fn auth_host(&self) -> &str {
        &self.auth_host
    }

    pub fn redirect_host(&self) -> &str {
        &self.redirect_host
    }

    /// Whether the host is one of the gateway's own OAuth2 endpoints.
    pub fn is_oauth_host(&self, host: &str) -> bool {
        let host = strip_port(host.trim());
        host == self.auth_host || host == self.redirect_host
    }

    /// Subdomain of the inbound host relative to the apex domain.
    /// `www` counts as no subdomain.
    pub fn subdomain<'a>(&self, host: &'a str) -> &'a str {
        subdomain(host, &self.tldn)
    }

    /// Every hostname allowed to obtain a certificate: the external host of
    /// each proxy entry plus the OAuth2 auth and callback hosts.
    pub fn certificate_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.routes.keys().cloned().collect();
        domains.sort();
        for host in [&self.auth_host, &self.redirect_host] {
            if !domains.iter().any(|d| d == host) {
                domains.push(host.clone());
            }
        }
        domains
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn host_of_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| Error::Config(format!("URL '{}': {}", raw, e)))?;
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| Error::Config(format!("URL '{}' has no host", raw)))
}

/// Strip a trailing `:port` from a Host header value. Bracketed IPv6
/// literals keep their brackets.
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    }
}

/// Extract the subdomain of `host` relative to the apex domain: the prefix
/// left after removing `.<tldn>`, with `www` treated as no subdomain.
pub fn subdomain<'a>(host: &'a str, tldn: &str) -> &'a str {
    let host = strip_port(host.trim());
    if tldn.is_empty() {
        return "";
    }
    match host.strip_suffix(tldn).and_then(|p| p.strip_suffix('.')) {
        Some("") | Some("www") | None => "",
        Some(prefix) => prefix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{OauthConfig, ProxyEntry};

    fn table() -> RouteTable {
        let config = Config {
            tldn: "example.com".into(),
            proxies: vec![
                ProxyEntry {
                    internal: "http://10.0.0.5:8080".into(),
                    external: "app.example.com".into(),
                    allowed_users: vec!["user@x".into()],
                    unauthenticated_routes: vec![],
                },
                ProxyEntry {
                    internal: "http://10.0.0.6:9000".into(),
                    external: "files.example.com".into(),
                    allowed_users: vec![],
                    unauthenticated_routes: vec!["^/public/".into(), "^/healthz$".into()],
                },
            ],
            oauth: OauthConfig {
                auth_url: "https://auth.example.com/login".into(),
                redirect_url: "https://auth.example.com/callback".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        RouteTable::from_config(&config).unwrap()
    }

    #[test]
    fn lookup_ignores_port() {
        let table = table();
        assert!(table.lookup("app.example.com").is_some());
        assert!(table.lookup("app.example.com:443").is_some());
        assert!(table.lookup("unknown.example.com").is_none());
    }

    #[test]
    fn empty_unauthenticated_routes_match_nothing() {
        let table = table();
        let route = table.lookup("app.example.com").unwrap();
        assert!(!route.is_open_route("/"));
        assert!(!route.is_open_route("/anything"));
        assert!(!route.is_open_route(""));
    }

    #[test]
    fn open_route_alternation_matches() {
        let table = table();
        let route = table.lookup("files.example.com").unwrap();
        assert!(route.is_open_route("/public/logo.png"));
        assert!(route.is_open_route("/healthz"));
        assert!(!route.is_open_route("/private/doc"));
    }

    #[test]
    fn blank_fragments_do_not_open_everything() {
        let entry = RouteEntry::compile(
            "a.example.com",
            "http://10.0.0.1:80",
            &[],
            &[String::new(), String::new()],
        )
        .unwrap();
        assert!(!entry.is_open_route("/secret"));
    }

    #[test]
    fn certificate_domains_cover_proxies_and_oauth_hosts() {
        let table = table();
        let domains = table.certificate_domains();
        for host in ["app.example.com", "files.example.com", "auth.example.com"] {
            assert!(domains.iter().any(|d| d == host), "missing {}", host);
        }
        // auth and redirect share a host; no duplicate entry
        assert_eq!(domains.len(), 3);
    }

    #[test]
    fn subdomain_boundaries() {
        assert_eq!(subdomain("www.example.com", "example.com"), "");
        assert_eq!(subdomain("example.com", "example.com"), "");
        assert_eq!(subdomain("a.b.example.com", "example.com"), "a.b");
        assert_eq!(subdomain("dashboard.example.com", "example.com"), "dashboard");
        assert_eq!(subdomain(" dashboard.example.com ", "example.com"), "dashboard");
        assert_eq!(subdomain("sub.notexample.com", "example.com"), "");
        assert_eq!(subdomain("dashboard.example.com:443", "example.com"), "dashboard");
    }

    #[test]
    fn allow_list_membership() {
        let table = table();
        let route = table.lookup("app.example.com").unwrap();
        assert!(route.allows("user@x"));
        assert!(!route.allows("guest@x"));
    }
}
