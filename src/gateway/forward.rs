//! Standard HTTP forwarding to internal backends.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use url::Url;

use crate::error::{Error, Result};
use crate::gateway::server::Snapshot;
use crate::observability::metrics;
use crate::routing::RouteEntry;

/// HTTP client shared by every forward through one snapshot.
///
/// Backends are trusted peers on a private network and frequently present
/// self-signed certificates, so server verification is disabled for
/// backend connections only.
pub struct ForwardClient {
    inner: Client<HttpsConnector<HttpConnector>, Body>,
}

impl ForwardClient {
    pub fn new() -> Self {
        crate::tls::install_crypto_provider();
        let tls = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(TrustedBackendVerifier))
            .with_no_client_auth();
        let connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();
        Self {
            inner: Client::builder(TokioExecutor::new()).build(connector),
        }
    }
}

impl Default for ForwardClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward an authenticated request to the route's backend.
pub async fn forward(
    snapshot: &Snapshot,
    route: &Arc<RouteEntry>,
    inbound_host: &str,
    remote_ip: &str,
    mut request: Request<Body>,
) -> Response {
    apply_forwarded_headers(
        request.headers_mut(),
        &route.internal,
        inbound_host,
        remote_ip,
        snapshot.tls_terminated,
    );

    if let Err(e) = rewrite_to_backend(&mut request, &route.internal) {
        tracing::error!(backend = %route.internal, error = %e, "request rewrite failed");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let backend = route.internal.to_string();
    match snapshot.forwarder.inner.request(request).await {
        Ok(response) => {
            metrics::record_forward(&route.external, response.status().as_u16());
            response.map(Body::new).into_response()
        }
        Err(e) => {
            tracing::error!(
                backend = %backend,
                remote_addr = %remote_ip,
                error = %e,
                "upstream request failed"
            );
            metrics::record_forward(&route.external, StatusCode::BAD_GATEWAY.as_u16());
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Authority string for the backend origin (`host` or `host:port`).
pub(crate) fn backend_authority(internal: &Url) -> String {
    let host = internal.host_str().unwrap_or_default();
    match internal.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Backend port, falling back to the scheme default.
pub(crate) fn backend_port(internal: &Url) -> u16 {
    internal.port_or_known_default().unwrap_or(80)
}

/// Set the forwarding headers the backend relies on to reconstruct the
/// client's view of the request.
pub(crate) fn apply_forwarded_headers(
    headers: &mut HeaderMap,
    internal: &Url,
    inbound_host: &str,
    remote_ip: &str,
    tls_terminated: bool,
) {
    let proto = if tls_terminated { "https" } else { "http" };
    headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
    if tls_terminated {
        headers.insert("x-forwarded-ssl", HeaderValue::from_static("on"));
    } else {
        headers.remove("x-forwarded-ssl");
    }
    if let Ok(value) = HeaderValue::from_str(&backend_port(internal).to_string()) {
        headers.insert("x-forwarded-port", value);
    }
    if let Ok(value) = HeaderValue::from_str(inbound_host) {
        headers.insert("x-forwarded-host", value);
    }
    if !remote_ip.is_empty() {
        if let Ok(value) = HeaderValue::from_str(remote_ip) {
            headers.insert("x-forwarded-for", value);
        }
    }
}

/// Point the request at the backend: URI scheme/authority and Host header.
fn rewrite_to_backend(request: &mut Request<Body>, internal: &Url) -> Result<()> {
    let authority = backend_authority(internal);

    let mut parts = request.uri().clone().into_parts();
    parts.scheme = Some(if internal.scheme() == "https" {
        Scheme::HTTPS
    } else {
        Scheme::HTTP
    });
    parts.authority = Some(
        Authority::from_str(&authority)
            .map_err(|e| Error::Forward(format!("backend authority '{}': {}", authority, e)))?,
    );
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    *request.uri_mut() = Uri::from_parts(parts)
        .map_err(|e| Error::Forward(format!("rewritten URI: {}", e)))?;

    let host_value = HeaderValue::from_str(&authority)
        .map_err(|e| Error::Forward(format!("backend host header: {}", e)))?;
    request.headers_mut().insert(header::HOST, host_value);
    Ok(())
}

/// Certificate verifier that accepts any backend certificate.
///
/// Only wired into the backend-facing client; the public listener always
/// presents real certificates.
#[derive(Debug)]
struct TrustedBackendVerifier;

impl rustls::client::danger::ServerCertVerifier for TrustedBackendVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}
