//! Configuration loading and persistence.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::schema::Config;
use crate::config::validation::validate_config;
use crate::error::{Error, Result};

/// Reads and writes the JSON configuration document at a fixed path.
///
/// The store itself is stateless; the active snapshot lives with the
/// lifecycle controller and is only replaced through the restart protocol.
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the configuration document.
    pub fn load(&self) -> Result<Config> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!("reading {}: {}", self.path.display(), e))
        })?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("parsing {}: {}", self.path.display(), e)))?;

        validate_config(&config).map_err(|errors| {
            let joined = errors
                .iter()
                .map(|e| e.0.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            Error::Config(joined)
        })?;

        Ok(config)
    }

    /// Raw document bytes, for the admin editor.
    pub fn read_raw(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.path)?)
    }

    /// Persist a new document: pretty-printed with 4-space indent, written
    /// to a temporary file and renamed into place so readers never observe
    /// a partial write.
    pub fn persist(&self, config: &Config) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        config.serialize(&mut serializer)?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &buf)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o666))?;
        }
        fs::rename(&tmp, &self.path)?;

        tracing::info!(path = %self.path.display(), "configuration persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{OauthConfig, ProxyEntry};

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pylon-store-{}-{}.json", name, std::process::id()))
    }

    fn sample_config() -> Config {
        Config {
            tldn: "example.com".into(),
            session_key: "key".into(),
            cookie_expire: 86_400_000_000_000,
            oauth: OauthConfig {
                auth_url: "https://auth.example.com/login".into(),
                redirect_url: "https://auth.example.com/callback".into(),
                client_id: "id".into(),
                client_secret: "secret".into(),
                ..Default::default()
            },
            proxies: vec![ProxyEntry {
                internal: "http://10.0.0.5:8080".into(),
                external: "app.example.com".into(),
                allowed_users: vec!["user@x".into()],
                unauthenticated_routes: vec!["^/public/".into()],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn persist_then_load_round_trips() {
        let path = scratch_path("roundtrip");
        let store = ConfigStore::new(&path);
        let config = sample_config();

        store.persist(&config).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            serde_json::to_value(&loaded).unwrap()
        );

        let raw = store.read_raw().unwrap();
        assert!(raw.contains("    \"tldn\""), "expected 4-space indent");

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let store = ConfigStore::new("/nonexistent/pylon.json");
        assert!(matches!(store.load(), Err(Error::Config(_))));
    }

    #[test]
    fn load_rejects_invalid_document() {
        let path = scratch_path("invalid");
        fs::write(&path, "{\"tldn\": \"\"}").unwrap();

        let store = ConfigStore::new(&path);
        assert!(matches!(store.load(), Err(Error::Config(_))));

        fs::remove_file(&path).unwrap();
    }
}
