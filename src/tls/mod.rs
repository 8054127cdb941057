//! TLS termination with automated certificates.

pub mod acme;

pub use acme::AcmeManager;

use std::sync::Once;

/// Pin the process-default crypto provider before any rustls config is
/// built. Multiple construction paths call this; only the first installs.
pub(crate) fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
