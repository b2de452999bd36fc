//! Integration tests for the bridge WebSocket server.
//!
//! These tests spin up a real server on a random port, connect raw and
//! library clients, and verify the hello handshake plus request routing.
//!
//! Run with: cargo test --test ws_bridge_test

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use framebridge::bridge::{websocket, Controller};
use framebridge::config::Config;
use framebridge::content::{ContentContext, ContentHandle, Document, Element};
use framebridge::protocol::PROTOCOL_VERSION;
use framebridge::BridgeError;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Find a free port by binding to port 0 and reading the assigned port.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a bridge server on `port` with a one-button page.
async fn start_bridge(port: u16) -> (ContentHandle, tokio::task::JoinHandle<()>) {
    let mut document = Document::default();
    document.title = "ws fixture".to_string();
    document.push(
        Element::new("button")
            .with_id("go")
            .with_rect(0.0, 0.0, 20.0, 20.0),
    );
    let context = ContentHandle::new(ContentContext::new(document, Config::default().worker_catalog()));

    let listener = websocket::bind("127.0.0.1", port).await.unwrap();
    let served = context.clone();
    let handle = tokio::spawn(async move {
        let _ = websocket::serve(listener, served).await;
    });
    (context, handle)
}

async fn ws_connect(port: u16) -> WsStream {
    let url = format!("ws://127.0.0.1:{}", port);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect to bridge");
    ws
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("Failed to send message");
}

/// Read one text message with a timeout. Returns None on timeout, close, or error.
async fn try_recv_json(ws: &mut WsStream, timeout_ms: u64) -> Option<serde_json::Value> {
    let read = async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(text.as_str()).ok(),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                _ => return None,
            }
        }
    };
    tokio::time::timeout(Duration::from_millis(timeout_ms), read)
        .await
        .ok()
        .flatten()
}

async fn connect_controller(port: u16) -> Controller {
    let endpoint = websocket::connect(&format!("ws://127.0.0.1:{}", port))
        .await
        .unwrap();
    Controller::new(endpoint)
}

mod handshake {
    use super::*;

    #[tokio::test]
    async fn no_hello_closes_connection() {
        let port = free_port().await;
        let (_context, _server) = start_bridge(port).await;

        let mut ws = ws_connect(port).await;
        send_json(&mut ws, json!({ "name": "jsonrpc", "data": {} })).await;

        assert!(try_recv_json(&mut ws, 2000).await.is_none());
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let port = free_port().await;
        let (_context, _server) = start_bridge(port).await;

        let mut ws = ws_connect(port).await;
        send_json(
            &mut ws,
            json!({ "type": "hello", "role": "controller", "version": "9.0.0" }),
        )
        .await;

        let reply = try_recv_json(&mut ws, 2000).await.unwrap();
        assert_eq!(reply["type"], "hello_error");
        assert_eq!(reply["error"], "version_mismatch");
        assert_eq!(reply["required_version"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn hello_is_acknowledged() {
        let port = free_port().await;
        let (_context, _server) = start_bridge(port).await;

        let mut ws = ws_connect(port).await;
        send_json(
            &mut ws,
            json!({ "type": "hello", "role": "controller", "version": PROTOCOL_VERSION }),
        )
        .await;

        let ack = try_recv_json(&mut ws, 2000).await.unwrap();
        assert_eq!(ack["type"], "hello_ack");
        assert_eq!(ack["version"], PROTOCOL_VERSION);
    }
}

mod routing {
    use super::*;

    #[tokio::test]
    async fn raw_request_gets_wire_response() {
        let port = free_port().await;
        let (_context, _server) = start_bridge(port).await;

        let mut ws = ws_connect(port).await;
        send_json(
            &mut ws,
            json!({ "type": "hello", "role": "controller", "version": PROTOCOL_VERSION }),
        )
        .await;
        try_recv_json(&mut ws, 2000).await.unwrap();

        send_json(
            &mut ws,
            json!({
                "name": "jsonrpc",
                "data": { "method": "evaluate", "params": ["1+1"], "id": 7 }
            }),
        )
        .await;

        let reply = try_recv_json(&mut ws, 2000).await.unwrap();
        assert_eq!(
            reply,
            json!({ "name": "jsonrpc", "data": { "result": 2, "error": null, "id": 7 } })
        );
    }

    #[tokio::test]
    async fn malformed_request_with_id_gets_an_error() {
        let port = free_port().await;
        let (_context, _server) = start_bridge(port).await;

        let mut ws = ws_connect(port).await;
        send_json(
            &mut ws,
            json!({ "type": "hello", "role": "controller", "version": PROTOCOL_VERSION }),
        )
        .await;
        try_recv_json(&mut ws, 2000).await.unwrap();

        send_json(&mut ws, json!({ "name": "jsonrpc", "data": { "id": 3 } })).await;

        let reply = try_recv_json(&mut ws, 2000).await.unwrap();
        assert_eq!(reply["data"]["id"], 3);
        assert!(reply["data"]["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn controller_round_trip() {
        let port = free_port().await;
        let (context, _server) = start_bridge(port).await;
        let controller = connect_controller(port).await;

        assert_eq!(
            controller.evaluate("document.title").await.unwrap(),
            json!("ws fixture")
        );

        controller
            .generate_mouse_click("document.getElementById('go')")
            .await
            .unwrap();
        let ctx = context.lock().await;
        let node = ctx.document.get_element_by_id("go").unwrap();
        assert_eq!(ctx.document.element(node).unwrap().click_count(), 1);
    }

    #[tokio::test]
    async fn workers_over_the_socket() {
        let port = free_port().await;
        let (context, _server) = start_bridge(port).await;
        let controller = connect_controller(port).await;

        // Unlisted urls run the default echo script.
        controller.create_worker("http://w/echo.js").await.unwrap();
        controller
            .post_message_to_worker("http://w/echo.js", json!("ping"))
            .await
            .unwrap();
        controller
            .post_message_to_worker_direct("http://w/echo.js", json!("pong"))
            .await
            .unwrap();
        controller.terminate_worker("http://w/echo.js").await.unwrap();
        assert!(context.worker_urls().await.is_empty());

        let err = controller
            .terminate_worker("http://w/echo.js")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Remote(ref m) if m.contains("http://w/echo.js")));
    }

    #[tokio::test]
    async fn two_controllers_share_one_context() {
        let port = free_port().await;
        let (_context, _server) = start_bridge(port).await;
        let first = connect_controller(port).await;
        let second = connect_controller(port).await;

        first.create_worker("http://w/shared.js").await.unwrap();
        second
            .post_message_to_worker("http://w/shared.js", json!(1))
            .await
            .unwrap();
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn is_bridge_running_reflects_the_listener() {
        let port = free_port().await;
        assert!(!websocket::is_bridge_running("127.0.0.1", port).await);

        let (_context, _server) = start_bridge(port).await;
        assert!(websocket::is_bridge_running("127.0.0.1", port).await);
    }

    #[tokio::test]
    async fn connect_without_server_fails() {
        let port = free_port().await;
        let err = websocket::connect(&format!("ws://127.0.0.1:{}", port))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Transport(_)), "{}", err);
    }
}
