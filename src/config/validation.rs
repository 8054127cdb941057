//! Configuration validation logic.

use std::collections::HashSet;

use url::Url;

use crate::config::schema::Config;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation error: {}", self.0)
    }
}

/// Validate a Config for semantic correctness.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.tldn.trim().is_empty() {
        errors.push(ValidationError("tldn must not be empty".to_string()));
    }

    if config.session_key.is_empty() {
        errors.push(ValidationError("session_key must not be empty".to_string()));
    }

    let mut seen_external: HashSet<&str> = HashSet::new();
    for proxy in &config.proxies {
        if proxy.external.trim().is_empty() {
            errors.push(ValidationError(format!(
                "proxy for '{}' has an empty external host",
                proxy.internal
            )));
        } else if !seen_external.insert(proxy.external.as_str()) {
            errors.push(ValidationError(format!(
                "duplicate external host '{}'",
                proxy.external
            )));
        }

        match Url::parse(&proxy.internal) {
            Ok(url) if url.host_str().is_some() => {}
            Ok(_) => errors.push(ValidationError(format!(
                "internal URL '{}' has no host",
                proxy.internal
            ))),
            Err(e) => errors.push(ValidationError(format!(
                "internal URL '{}' does not parse: {}",
                proxy.internal, e
            ))),
        }

        for fragment in &proxy.unauthenticated_routes {
            if let Err(e) = regex::Regex::new(fragment) {
                errors.push(ValidationError(format!(
                    "unauthenticated route '{}' on '{}' does not compile: {}",
                    fragment, proxy.external, e
                )));
            }
        }
    }

    for (name, value) in [
        ("oauth.auth_url", &config.oauth.auth_url),
        ("oauth.redirect_url", &config.oauth.redirect_url),
    ] {
        match Url::parse(value) {
            Ok(url) if url.host_str().is_some() => {}
            _ => errors.push(ValidationError(format!(
                "{} '{}' is not a valid URL",
                name, value
            ))),
        }
    }

    if config.cookie_expire == 0 {
        tracing::warn!("cookie_expire is 0, sessions expire immediately");
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;

    fn base_config() -> Config {
        Config {
            tldn: "example.com".into(),
            session_key: "k".into(),
            cookie_expire: 86_400_000_000_000,
            oauth: OauthConfig {
                auth_url: "https://auth.example.com/login".into(),
                redirect_url: "https://auth.example.com/callback".into(),
                ..Default::default()
            },
            proxies: vec![ProxyEntry {
                internal: "http://10.0.0.5:8080".into(),
                external: "app.example.com".into(),
                allowed_users: vec!["user@x".into()],
                unauthenticated_routes: vec![],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn duplicate_external_host_rejected() {
        let mut config = base_config();
        config.proxies.push(config.proxies[0].clone());

        let errs = validate_config(&config).unwrap_err();
        assert!(errs
            .iter()
            .any(|e| e.0.contains("duplicate external host 'app.example.com'")));
    }

    #[test]
    fn unparseable_internal_url_rejected() {
        let mut config = base_config();
        config.proxies[0].internal = "not a url".into();

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("does not parse")));
    }

    #[test]
    fn bad_route_regex_rejected() {
        let mut config = base_config();
        config.proxies[0].unauthenticated_routes = vec!["^/public/(".into()];

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("does not compile")));
    }

    #[test]
    fn missing_oauth_urls_rejected() {
        let mut config = base_config();
        config.oauth.auth_url = String::new();

        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("oauth.auth_url")));
    }
}
