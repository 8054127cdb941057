//! WebSocket forwarding as a raw byte tunnel.
//!
//! HTTP libraries disagree about proxying upgrades, so the transport is
//! manual: the client connection is taken over after the handshake
//! response, a plain TCP connection is opened to the backend, the
//! (rewritten) upgrade request is serialized onto it verbatim, and from
//! the backend's `101` onward both directions are pumped byte-for-byte
//! until either side closes.

use std::io::ErrorKind;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::{copy_bidirectional, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::gateway::forward::{apply_forwarded_headers, backend_port};
use crate::gateway::server::Snapshot;
use crate::observability::metrics;
use crate::routing::RouteEntry;

/// Largest backend handshake response head we accept.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;

/// WebSocket upgrade detection: `Connection` mentions `upgrade` and
/// `Upgrade` mentions `websocket`. Substring match because the values are
/// lists ("upgrade, keep-alive").
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    header_contains(headers, header::CONNECTION, "upgrade")
        && header_contains(headers, header::UPGRADE, "websocket")
}

fn header_contains(headers: &HeaderMap, name: HeaderName, needle: &str) -> bool {
    headers.get_all(name).iter().any(|value| {
        value
            .to_str()
            .map(|v| v.to_ascii_lowercase().contains(needle))
            .unwrap_or(false)
    })
}

/// Tunnel a WebSocket upgrade to the backend.
///
/// The internal URL's scheme is ignored: the backend leg is always plain
/// TCP. Both connections are closed on every exit path, including errors
/// after the client side has been taken over.
pub async fn tunnel(
    snapshot: &Snapshot,
    route: &Arc<RouteEntry>,
    inbound_host: &str,
    remote_ip: &str,
    mut request: Request<Body>,
) -> Response {
    let Some(on_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
        tracing::error!("connection does not support upgrades, cannot tunnel");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let backend_addr = format!(
        "{}:{}",
        route.internal.host_str().unwrap_or_default(),
        backend_port(&route.internal)
    );
    let mut backend = match TcpStream::connect(&backend_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(backend = %backend_addr, error = %e, "backend dial failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    apply_forwarded_headers(
        request.headers_mut(),
        &route.internal,
        inbound_host,
        remote_ip,
        snapshot.tls_terminated,
    );
    match HeaderValue::from_str(&backend_addr) {
        Ok(value) => {
            request.headers_mut().insert(header::HOST, value);
        }
        Err(e) => {
            tracing::error!(backend = %backend_addr, error = %e, "bad backend host");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    if let Err(e) = backend.write_all(&serialize_request_head(&request)).await {
        tracing::error!(backend = %backend_addr, error = %e, "writing upgrade request failed");
        return StatusCode::BAD_GATEWAY.into_response();
    }

    let (status, headers, buffered) = match read_response_head(&mut backend).await {
        Ok(head) => head,
        Err(e) => {
            tracing::error!(backend = %backend_addr, error = %e, "reading upgrade response failed");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    if status != StatusCode::SWITCHING_PROTOCOLS {
        tracing::warn!(backend = %backend_addr, status = %status, "backend refused upgrade");
        let mut response = Response::new(Body::from(buffered));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        return response;
    }

    let path = request.uri().path().to_string();
    metrics::record_tunnel(1);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let mut client = TokioIo::new(upgraded);
                // Bytes the backend sent past the handshake head belong to
                // the tunnel and must reach the client first.
                if !buffered.is_empty() {
                    if let Err(e) = client.write_all(&buffered).await {
                        tracing::warn!(path = %path, error = %e, "flushing buffered frames failed");
                        metrics::record_tunnel(-1);
                        return;
                    }
                }
                match copy_bidirectional(&mut client, &mut backend).await {
                    Ok((to_backend, to_client)) => {
                        tracing::debug!(path = %path, to_backend, to_client, "tunnel closed");
                    }
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        tracing::debug!(path = %path, "tunnel closed at EOF");
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "tunnel error");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "client upgrade failed");
            }
        }
        // Dropping both ends closes both sockets.
        metrics::record_tunnel(-1);
    });

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Serialize the rewritten upgrade request for the backend, headers as-is.
fn serialize_request_head(request: &Request<Body>) -> Vec<u8> {
    let target = request
        .uri()
        .path_and_query()
        .map(|p| p.as_str())
        .unwrap_or("/");
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), target).into_bytes();
    for (name, value) in request.headers() {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// Read the backend's response head; returns any bytes past the terminator.
async fn read_response_head(
    stream: &mut TcpStream,
) -> Result<(StatusCode, HeaderMap, Vec<u8>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Forward(
                "backend closed during upgrade handshake".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let buffered = buf.split_off(pos + 4);
            let (status, headers) = parse_response_head(&buf)?;
            return Ok((status, headers, buffered));
        }
        if buf.len() > MAX_RESPONSE_HEAD {
            return Err(Error::Forward("upgrade response head too large".to_string()));
        }
    }
}

fn parse_response_head(head: &[u8]) -> Result<(StatusCode, HeaderMap)> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::Forward("upgrade response head is not UTF-8".to_string()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines.next().unwrap_or_default();
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| Error::Forward(format!("malformed status line '{}'", status_line)))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.trim().as_bytes()),
            HeaderValue::from_str(value.trim()),
        ) {
            headers.append(name, value);
        }
    }
    Ok((status, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn detects_upgrade_with_list_values() {
        let map = headers(&[("connection", "Upgrade, keep-alive"), ("upgrade", "WebSocket")]);
        assert!(is_websocket_upgrade(&map));
    }

    #[test]
    fn plain_requests_are_not_upgrades() {
        assert!(!is_websocket_upgrade(&headers(&[("connection", "keep-alive")])));
        assert!(!is_websocket_upgrade(&headers(&[
            ("connection", "upgrade"),
            ("upgrade", "h2c"),
        ])));
    }

    #[test]
    fn parses_switching_protocols_head() {
        let head = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
        let (status, headers) = parse_response_head(head).unwrap();
        assert_eq!(status, StatusCode::SWITCHING_PROTOCOLS);
        assert_eq!(headers[header::UPGRADE], "websocket");
    }

    #[test]
    fn rejects_garbage_status_line() {
        assert!(parse_response_head(b"definitely not http\r\n\r\n").is_err());
    }

    #[test]
    fn serialized_head_carries_rewritten_host() {
        let request = axum::http::Request::builder()
            .method("GET")
            .uri("/ws?room=1")
            .header(header::HOST, "10.0.0.5:8080")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();

        let head = String::from_utf8(serialize_request_head(&request)).unwrap();
        assert!(head.starts_with("GET /ws?room=1 HTTP/1.1\r\n"));
        assert!(head.contains("host: 10.0.0.5:8080\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }
}
