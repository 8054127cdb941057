//! Signed session cookie handling.
//!
//! The session is a single signed cookie carrying the authenticated email,
//! scoped to the apex domain. The signing key is derived from the
//! configured secret, so rotating `session_key` invalidates every live
//! session at the next restart.

use axum::http::{header, HeaderMap};
use cookie::time::Duration;
use cookie::{Cookie, CookieJar, Key, SameSite};
use sha2::{Digest, Sha512};

/// Session cookie name.
pub const SESSION_COOKIE: &str = "pylon";

/// Issues and verifies the session cookie for one config snapshot.
#[derive(Clone)]
pub struct SessionStore {
    key: Key,
    domain: String,
    max_age_secs: i64,
}

impl SessionStore {
    /// The configured secret is stretched to the 64 bytes a signing key
    /// requires; any non-empty secret is acceptable.
    pub fn new(session_key: &str, domain: &str, max_age_secs: i64) -> Self {
        let digest = Sha512::digest(session_key.as_bytes());
        Self {
            key: Key::from(digest.as_slice()),
            domain: domain.to_string(),
            max_age_secs,
        }
    }

    /// Verify the session cookie on a request and return the email it
    /// carries. Purely local; never blocks on the network.
    pub fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let mut jar = CookieJar::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            for piece in raw.split(';') {
                if let Ok(cookie) = Cookie::parse_encoded(piece.trim().to_owned()) {
                    jar.add_original(cookie);
                }
            }
        }
        jar.signed(&self.key)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
    }

    /// Build the Set-Cookie header value establishing a session.
    pub fn issue(&self, email: &str) -> String {
        let mut cookie = Cookie::new(SESSION_COOKIE, email.to_owned());
        cookie.set_path("/");
        cookie.set_domain(self.domain.clone());
        cookie.set_max_age(Duration::seconds(self.max_age_secs));
        cookie.set_secure(true);
        cookie.set_http_only(true);
        cookie.set_same_site(SameSite::Lax);

        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key).add(cookie);
        jar.get(SESSION_COOKIE)
            .expect("cookie was just added")
            .encoded()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn store() -> SessionStore {
        SessionStore::new("test-signing-secret", "example.com", 86_400)
    }

    fn headers_from_set_cookie(set_cookie: &str) -> HeaderMap {
        // A client echoes back only the name=value pair.
        let pair = set_cookie.split(';').next().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(pair).unwrap());
        headers
    }

    #[test]
    fn issue_then_resolve_round_trips() {
        let store = store();
        let set_cookie = store.issue("user@x");

        assert!(set_cookie.contains("Domain=example.com"));
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=86400"));

        let headers = headers_from_set_cookie(&set_cookie);
        assert_eq!(store.resolve(&headers).as_deref(), Some("user@x"));
    }

    #[test]
    fn tampered_cookie_is_rejected() {
        let store = store();
        let set_cookie = store.issue("user@x");
        let tampered = set_cookie.replacen("pylon=", "pylon=x", 1);

        let headers = headers_from_set_cookie(&tampered);
        assert_eq!(store.resolve(&headers), None);
    }

    #[test]
    fn rotated_key_invalidates_sessions() {
        let issued = store().issue("user@x");
        let rotated = SessionStore::new("another-secret", "example.com", 86_400);

        let headers = headers_from_set_cookie(&issued);
        assert_eq!(rotated.resolve(&headers), None);
    }

    #[test]
    fn missing_cookie_resolves_to_none() {
        assert_eq!(store().resolve(&HeaderMap::new()), None);
    }
}
