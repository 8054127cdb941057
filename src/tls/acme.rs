//! On-demand certificate provisioning.
//!
//! Wraps the ACME library behind the two primitives the lifecycle
//! controller needs: a TLS acceptor whose resolver obtains and renews
//! certificates on demand, and a background task surfacing account and
//! order events. Validation uses TLS-ALPN-01, so challenges are answered
//! inside the TLS listener itself; the plain-HTTP listener stays a pure
//! redirect.
//!
//! Only whitelisted hostnames may obtain a certificate; issued
//! certificates persist in a disk cache across restarts.

use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt;
use rustls_acme::axum::AxumAcceptor;
use rustls_acme::caches::DirCache;
use rustls_acme::AcmeConfig;
use tokio::task::JoinHandle;

/// Certificate manager for one set of whitelisted domains.
///
/// Dropped (and its event task with it) when the lifecycle controller
/// tears a listener generation down; the disk cache makes the successor
/// manager pick up existing certificates without re-issuing.
pub struct AcmeManager {
    acceptor: AxumAcceptor,
    events: JoinHandle<()>,
}

impl AcmeManager {
    /// `production` selects the real Let's Encrypt directory; staging
    /// otherwise. Terms of service are accepted by configuration.
    pub fn new(domains: Vec<String>, cache_dir: &Path, production: bool) -> Self {
        super::install_crypto_provider();
        tracing::info!(?domains, cache = %cache_dir.display(), "certificate manager starting");

        let mut state = AcmeConfig::new(domains)
            .cache(DirCache::new(cache_dir.to_path_buf()))
            .directory_lets_encrypt(production)
            .state();

        let rustls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(state.resolver());
        let acceptor = state.axum_acceptor(Arc::new(rustls_config));

        let events = tokio::spawn(async move {
            while let Some(event) = state.next().await {
                match event {
                    Ok(ok) => tracing::info!(event = ?ok, "certificate event"),
                    Err(err) => tracing::error!(error = %err, "certificate error"),
                }
            }
        });

        Self { acceptor, events }
    }

    /// TLS acceptor for the serving listener.
    pub fn acceptor(&self) -> AxumAcceptor {
        self.acceptor.clone()
    }
}

impl Drop for AcmeManager {
    fn drop(&mut self) {
        self.events.abort();
    }
}
