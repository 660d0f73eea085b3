//! Test doubles for the integration tests.
//!
//! Two servers stand in for the real endpoint:
//! - a wiremock HTTP server answering the polling handshake, and
//! - a scripted WebSocket server accepting the upgraded connection and
//!   exchanging raw frames under test control.

use client_core::client::ClientConfig;
use client_core::session::SessionStore;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Session id every handshake double hands out.
pub const TEST_SID: &str = "sid-test-1234";

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Start an HTTP double that answers the full polling handshake.
pub async fn mock_handshake_server() -> MockServer {
    let server = MockServer::start().await;

    // Anonymous warm-up browse.
    Mock::given(method("GET"))
        .and(path_regex(r"^/search/"))
        .respond_with(ResponseTemplate::new(200).insert_header("set-cookie", "warmup=1; Path=/"))
        .mount(&server)
        .await;

    // Polling endpoint, first leg: session id behind the framing prefix.
    Mock::given(method("GET"))
        .and(path("/socket.io/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "handshake=ok; Path=/; HttpOnly")
                .set_body_string(format!("0{{\"sid\":\"{TEST_SID}\"}}")),
        )
        .mount(&server)
        .await;

    // Polling endpoint, second leg: anonymous-access acknowledgment.
    Mock::given(method("POST"))
        .and(path("/socket.io/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&server)
        .await;

    // Cookie finalization.
    Mock::given(method("GET"))
        .and(path("/api/auth/session"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    server
}

/// A WebSocket server double exchanging raw text frames under test control.
///
/// Accepts exactly one connection. Frames received from the client arrive in
/// order through [`recv_frame`](Self::recv_frame); frames passed to
/// [`send`](Self::send) go out on the connection.
pub struct ScriptedSocketServer {
    pub ws_base: Url,
    inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
}

impl ScriptedSocketServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind scripted socket server");
        let port = listener.local_addr().expect("local addr").port();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _addr) = listener.accept().await.expect("client connects");
            let ws_stream = accept_async(stream).await.expect("websocket handshake");
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    frame = outbound_rx.recv() => match frame {
                        Some(frame) => {
                            if write.send(Message::text(frame)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    message = read.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            let _ = inbound_tx.send(text.as_str().to_string());
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) => break,
                    },
                }
            }
        });

        let ws_base = Url::parse(&format!("ws://127.0.0.1:{port}")).expect("ws url");
        Self {
            ws_base,
            inbound: inbound_rx,
            outbound: outbound_tx,
        }
    }

    /// Push one raw frame to the connected client.
    pub fn send(&self, frame: &str) {
        self.outbound
            .send(frame.to_string())
            .expect("server task alive");
    }

    /// Next frame received from the client, in arrival order.
    pub async fn recv_frame(&mut self) -> String {
        tokio::time::timeout(FRAME_TIMEOUT, self.inbound.recv())
            .await
            .expect("frame within timeout")
            .expect("connection open")
    }

    /// Assert the client stays quiet for `window` (no frame sent).
    pub async fn expect_silence(&mut self, window: Duration) {
        let received = tokio::time::timeout(window, self.inbound.recv()).await;
        if let Ok(Some(frame)) = received {
            panic!("expected silence, client sent {frame:?}");
        }
    }

    /// Consume the two fixed control sends of the transport upgrade.
    pub async fn expect_upgrade_probe(&mut self) {
        assert_eq!(self.recv_frame().await, "2probe");
        assert_eq!(self.recv_frame().await, "5");
    }

    /// Receive a query envelope and split it into prefix and JSON body.
    pub async fn recv_query_envelope(&mut self) -> (u64, Value) {
        let frame = self.recv_frame().await;
        let digits: String = frame.chars().take_while(char::is_ascii_digit).collect();
        assert!(!digits.is_empty(), "envelope must carry a numeric prefix: {frame:?}");

        let prefix = digits.parse().expect("numeric prefix");
        let body = serde_json::from_str(&frame[digits.len()..]).expect("envelope body is JSON");
        (prefix, body)
    }
}

/// Client configuration pointing at the two doubles.
pub fn test_config(
    http: &MockServer,
    socket: &ScriptedSocketServer,
    store_dir: &TempDir,
) -> ClientConfig {
    ClientConfig {
        http_base: Url::parse(&http.uri()).expect("mock server uri"),
        ws_base: socket.ws_base.clone(),
        account: None,
        store: SessionStore::new(store_dir.path().join("session.json")),
        query_timeout: Duration::from_secs(5),
        connect_bound: Duration::from_secs(5),
    }
}
