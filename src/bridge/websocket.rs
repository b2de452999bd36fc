//! WebSocket transport for running the two sides in separate processes.
//!
//! The content side listens on a loopback port. A peer opens with a hello
//! handshake, then each text frame carries one JSON-encoded [`Envelope`].

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

use super::content_bridge::ContentBridge;
use super::transport::{self, Endpoint};
use crate::content::ContentHandle;
use crate::error::{BridgeError, Result};
use crate::protocol::{Envelope, PROTOCOL_VERSION};

/// How long a new connection may take to send its hello.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind the bridge listener on `host:port`.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{}:{}", host, port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Transport(format!("Failed to bind to {}: {}", addr, e)))
}

/// Accept connections forever, giving each its own bridge loop over the
/// shared content context.
pub async fn serve(listener: TcpListener, context: ContentHandle) -> Result<()> {
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .map_err(|e| BridgeError::Transport(format!("Accept failed: {}", e)))?;

        tracing::debug!("New connection from {}", peer);

        if !peer.ip().is_loopback() {
            tracing::warn!("Rejected non-loopback connection from {}", peer);
            drop(stream);
            continue;
        }

        tokio::spawn(handle_connection(stream, peer, context.clone()));
    }
}

/// Parse an origin string into (scheme, host).
fn parse_origin(origin: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = origin.split_once("://")?;
    let rest = rest.trim_end_matches('/');
    if rest.is_empty() {
        return None;
    }
    let host = if rest.starts_with('[') {
        let end = rest.find(']')?;
        let after = &rest[end + 1..];
        if !after.is_empty() && !after.starts_with(':') {
            return None;
        }
        &rest[..end + 1]
    } else {
        rest.split(':').next().unwrap_or(rest)
    };
    if host.is_empty() {
        None
    } else {
        Some((scheme, host))
    }
}

/// Browsers send an Origin header; only loopback pages may drive the bridge.
fn is_origin_allowed(origin: Option<&str>) -> bool {
    match origin {
        None => true,
        Some(o) => {
            let lower = o.to_lowercase();
            match parse_origin(&lower) {
                Some(("http", host)) | Some(("https", host)) => {
                    matches!(host, "127.0.0.1" | "localhost" | "[::1]")
                }
                _ => false,
            }
        }
    }
}

/// Check a peer's protocol version against ours (same major, not older).
fn is_version_compatible(version: &str) -> bool {
    let Ok(ours) = semver::Version::parse(PROTOCOL_VERSION) else {
        return false;
    };
    match semver::Version::parse(version) {
        Ok(theirs) => theirs.major == ours.major && theirs >= ours,
        Err(_) => false,
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, context: ContentHandle) {
    let ws = match tokio_tungstenite::accept_hdr_async(
        stream,
        |req: &tokio_tungstenite::tungstenite::http::Request<()>,
         resp: tokio_tungstenite::tungstenite::http::Response<()>|
         -> std::result::Result<
            tokio_tungstenite::tungstenite::http::Response<()>,
            tokio_tungstenite::tungstenite::http::Response<Option<String>>,
        > {
            let origin = req.headers().get("origin").and_then(|v| v.to_str().ok());
            if !is_origin_allowed(origin) {
                tracing::warn!("Rejected WebSocket connection with origin: {:?}", origin);
                let mut rejection =
                    tokio_tungstenite::tungstenite::http::Response::new(Some(
                        "Forbidden origin".to_string(),
                    ));
                *rejection.status_mut() = StatusCode::FORBIDDEN;
                return Err(rejection);
            }
            Ok(resp)
        },
    )
    .await
    {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let (mut write, mut read) = ws.split();

    let hello = match tokio::time::timeout(HANDSHAKE_TIMEOUT, read.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            serde_json::from_str::<serde_json::Value>(text.as_str()).ok()
        }
        _ => None,
    };
    let Some(hello) = hello else {
        tracing::warn!("{} disconnected, timed out or sent invalid JSON before hello", peer);
        return;
    };

    if hello.get("type").and_then(|t| t.as_str()) != Some("hello") {
        tracing::warn!("Expected hello message from {}, got {}", peer, hello);
        return;
    }

    let version = hello
        .get("version")
        .and_then(|v| v.as_str())
        .unwrap_or("0.0.0");
    if !is_version_compatible(version) {
        tracing::warn!(
            "Rejected {} with protocol version {} (ours: {})",
            peer,
            version,
            PROTOCOL_VERSION
        );
        let err_msg = serde_json::json!({
            "type": "hello_error",
            "error": "version_mismatch",
            "message": format!(
                "Protocol version {} is not supported. Required: {}",
                version, PROTOCOL_VERSION
            ),
            "required_version": PROTOCOL_VERSION,
        });
        let _ = write.send(Message::Text(err_msg.to_string().into())).await;
        return;
    }

    let ack = serde_json::json!({ "type": "hello_ack", "version": PROTOCOL_VERSION });
    if write
        .send(Message::Text(ack.to_string().into()))
        .await
        .is_err()
    {
        tracing::warn!("Failed to send hello_ack to {}", peer);
        return;
    }

    tracing::info!("Controller connected from {}", peer);

    let (bridge_end, socket_end) = transport::pair();
    let bridge_task = tokio::spawn(ContentBridge::new(context).run(bridge_end));
    let (to_bridge, mut from_bridge) = socket_end.split();

    let write_handle = tokio::spawn(async move {
        while let Some(envelope) = from_bridge.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode envelope: {}", e);
                    continue;
                }
            };
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(text.as_str()) {
                Ok(envelope) => {
                    if to_bridge.send(envelope).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::error!("Invalid envelope from {}: {}", peer, e),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error from {}: {}", peer, e);
                break;
            }
            _ => {}
        }
    }

    tracing::info!("Controller {} disconnected", peer);

    // Closing the inbound side ends the bridge loop; in-flight replies have
    // nowhere to go once the socket is gone.
    drop(to_bridge);
    let _ = bridge_task.await;
    write_handle.abort();
}

/// Connect to a bridge server, perform the hello handshake, and return an
/// endpoint wired to the socket.
pub async fn connect(url: &str) -> Result<Endpoint> {
    let (mut ws, _) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
        BridgeError::Transport(format!(
            "Cannot connect to bridge at {}. Is `framebridge serve` running? ({})",
            url, e
        ))
    })?;

    let hello = serde_json::json!({
        "type": "hello",
        "role": "controller",
        "version": PROTOCOL_VERSION,
    });
    ws.send(Message::Text(hello.to_string().into()))
        .await
        .map_err(|e| BridgeError::Transport(format!("Send hello failed: {}", e)))?;

    match tokio::time::timeout(HANDSHAKE_TIMEOUT, ws.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            let ack: serde_json::Value = serde_json::from_str(text.as_str()).unwrap_or_default();
            if ack.get("type").and_then(|t| t.as_str()) != Some("hello_ack") {
                let reason = ack
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unexpected handshake reply");
                return Err(BridgeError::Transport(format!(
                    "Handshake rejected: {}",
                    reason
                )));
            }
        }
        Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
            return Err(BridgeError::Transport(
                "Handshake failed: connection closed".to_string(),
            ));
        }
        Ok(Some(Err(e))) => {
            return Err(BridgeError::Transport(format!("Handshake error: {}", e)));
        }
        Ok(Some(Ok(_))) => {
            return Err(BridgeError::Transport(
                "Unexpected message type during handshake".to_string(),
            ));
        }
        Err(_) => {
            return Err(BridgeError::Timeout(
                "bridge did not answer the hello handshake".to_string(),
            ));
        }
    }

    let (mut write, mut read) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Envelope>();

    tokio::spawn(async move {
        while let Some(envelope) = outbound_rx.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else {
                continue;
            };
            if write.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = write.close().await;
    });

    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<Envelope>(text.as_str()) {
                    Ok(envelope) => {
                        if inbound_tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::error!("Invalid envelope from bridge: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!("Bridge WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    Ok(Endpoint {
        sender: outbound_tx,
        receiver: inbound_rx,
    })
}

/// Check if something is listening on the bridge port.
pub async fn is_bridge_running(host: &str, port: u16) -> bool {
    TcpStream::connect(format!("{}:{}", host, port)).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_allowed() {
        assert!(is_origin_allowed(None));
        assert!(is_origin_allowed(Some("http://127.0.0.1")));
        assert!(is_origin_allowed(Some("http://127.0.0.1:8080")));
        assert!(is_origin_allowed(Some("http://localhost/")));
        assert!(is_origin_allowed(Some("https://localhost:3000")));
        assert!(is_origin_allowed(Some("http://[::1]:8080")));
        assert!(is_origin_allowed(Some("HTTP://LOCALHOST")));
    }

    #[test]
    fn test_origin_rejected() {
        assert!(!is_origin_allowed(Some("http://127.0.0.1.evil.com")));
        assert!(!is_origin_allowed(Some("http://localhost.evil.com")));
        assert!(!is_origin_allowed(Some("http://evil.com")));
        assert!(!is_origin_allowed(Some("chrome-extension://abcdef")));
        assert!(!is_origin_allowed(Some("not-a-url")));
        assert!(!is_origin_allowed(Some("")));
        assert!(!is_origin_allowed(Some("http://")));
        assert!(!is_origin_allowed(Some("http://[::1]evil")));
    }

    #[test]
    fn test_parse_origin() {
        assert_eq!(parse_origin("http://127.0.0.1"), Some(("http", "127.0.0.1")));
        assert_eq!(parse_origin("http://localhost:80/"), Some(("http", "localhost")));
        assert_eq!(parse_origin("http://[::1]:8080"), Some(("http", "[::1]")));
        assert_eq!(parse_origin("http://"), None);
        assert_eq!(parse_origin("not-a-url"), None);
    }

    #[test]
    fn test_version_compatibility() {
        assert!(is_version_compatible(PROTOCOL_VERSION));
        assert!(is_version_compatible("0.1.5"));
        assert!(!is_version_compatible("0.0.9"));
        assert!(!is_version_compatible("1.0.0"));
        assert!(!is_version_compatible("garbage"));
    }
}
