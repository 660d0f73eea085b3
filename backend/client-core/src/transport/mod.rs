//! Persistent socket transport.
//!
//! Owns the upgraded WebSocket for the lifetime of the session. Two
//! background tasks run per connection: a writer draining an outbound
//! channel into the sink, and a receive loop decoding every inbound frame.
//! Keepalive pings are answered from the receive loop through the same
//! outbound channel, so a single writer owns the sink and ordering needs no
//! extra locking.
//!
//! On transport-level error the loops log, mark the connection disconnected
//! and stop; no automatic reconnect is attempted. Callers observe this
//! through [`TransportConnection::connected`].

use crate::coordinator::RequestCoordinator;
use crate::error::transport::TransportError;
use crate::frame::{self, IncomingEvent, KEEPALIVE_REPLY};
use crate::session::Session;
use crate::{API_CLIENT_HEADER, CLIENT_NAME_HEADER, USER_AGENT};

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, trace};
use tokio::net::TcpStream;
use tokio::spawn as TokioSpawn;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep as TokioSleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

/// Bound on the readiness wait when the caller does not pick one.
pub const DEFAULT_CONNECT_BOUND: Duration = Duration::from_secs(10);

const SOCKET_PATH: &str = "socket.io/";
const PROTOCOL_REVISION_PARAM: (&str, &str) = ("EIO", "4");
const SOCKET_TRANSPORT_PARAM: (&str, &str) = ("transport", "websocket");
const SID_PARAM: &str = "sid";

// Fixed control sends of the transport's own upgrade convention.
const PROBE_FRAME: &str = "2probe";
const UPGRADE_FRAME: &str = "5";

const OUTBOUND_BUFFER: usize = 32;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

enum Outbound {
    Frame(String),
    Close,
}

/// Handle to one upgraded socket connection.
pub struct TransportConnection {
    outbound: mpsc::Sender<Outbound>,
    connected: watch::Receiver<bool>,
}

impl TransportConnection {
    /// Connect, perform the probe upgrade, and start the background loops.
    ///
    /// Decoded events flow into `coordinator`; events arriving while no
    /// query is in flight are dropped there.
    pub async fn open(
        session: &Session,
        ws_base: &Url,
        coordinator: RequestCoordinator,
    ) -> Result<Self, TransportError> {
        let url = socket_url(ws_base, &session.sid)?;

        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            CLIENT_NAME_HEADER.0,
            HeaderValue::from_static(CLIENT_NAME_HEADER.1),
        );
        headers.insert(
            API_CLIENT_HEADER.0,
            HeaderValue::from_static(API_CLIENT_HEADER.1),
        );
        if !session.cookies.is_empty() {
            let cookie_header =
                HeaderValue::from_str(&session.cookies.header_value()).map_err(|e| {
                    TransportError::Connect {
                        message: format!("cookie header rejected: {e}"),
                        location: ErrorLocation::from(Location::caller()),
                    }
                })?;
            headers.insert(header::COOKIE, cookie_header);
        }

        let (ws_stream, _response) = connect_async(request).await?;
        info!("socket transport connected for session {}", session.sid);

        let (write, read) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        let (connected_tx, connected_rx) = watch::channel(true);

        // The upgrade probe and its confirmation go out first; the channel
        // preserves their order ahead of any query.
        for control in [PROBE_FRAME, UPGRADE_FRAME] {
            outbound_tx
                .send(Outbound::Frame(control.to_string()))
                .await
                .map_err(|_| TransportError::Send {
                    message: "outbound channel closed before upgrade".to_string(),
                    location: ErrorLocation::from(Location::caller()),
                })?;
        }

        TokioSpawn(write_loop(outbound_rx, write));
        TokioSpawn(receive_loop(
            read,
            outbound_tx.clone(),
            coordinator,
            connected_tx,
        ));

        Ok(Self {
            outbound: outbound_tx,
            connected: connected_rx,
        })
    }

    /// Readiness predicate: no query may be sent before this reports true.
    pub fn connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Block until the connection reports connected, bounded by `bound`.
    pub async fn wait_connected(&self, bound: Duration) -> Result<(), TransportError> {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(bound),
            ..Default::default()
        };

        loop {
            if self.connected() {
                return Ok(());
            }

            match backoff.next_backoff() {
                Some(delay) => {
                    trace!("transport not ready, retrying after {delay:?}");
                    TokioSleep(delay).await;
                }
                None => {
                    return Err(TransportError::Timeout {
                        waited_secs: bound.as_secs(),
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
            }
        }
    }

    /// Queue one encoded frame for sending.
    pub async fn send(&self, frame: String) -> Result<(), TransportError> {
        if !self.connected() {
            return Err(TransportError::NotConnected {
                message: "connection is closed".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| TransportError::Send {
                message: "writer task has stopped".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Send a close frame and let the loops wind down.
    pub async fn close(&self) {
        let _ = self.outbound.send(Outbound::Close).await;
    }
}

fn socket_url(ws_base: &Url, sid: &str) -> Result<Url, TransportError> {
    let mut url = ws_base
        .join(SOCKET_PATH)
        .map_err(|e| TransportError::Connect {
            message: format!("invalid socket url: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;
    url.query_pairs_mut()
        .append_pair(PROTOCOL_REVISION_PARAM.0, PROTOCOL_REVISION_PARAM.1)
        .append_pair(SOCKET_TRANSPORT_PARAM.0, SOCKET_TRANSPORT_PARAM.1)
        .append_pair(SID_PARAM, sid);
    Ok(url)
}

async fn write_loop(mut outbound: mpsc::Receiver<Outbound>, mut write: WsSink) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::Frame(text) => {
                if let Err(e) = write.send(Message::text(text)).await {
                    error!("transport send failed: {e}");
                    break;
                }
            }
            Outbound::Close => {
                let _ = write.send(Message::Close(None)).await;
                break;
            }
        }
    }

    debug!("writer loop ended");
}

async fn receive_loop(
    mut read: WsSource,
    outbound: mpsc::Sender<Outbound>,
    coordinator: RequestCoordinator,
    connected: watch::Sender<bool>,
) {
    while let Some(message) = read.next().await {
        match message {
            Ok(Message::Text(text)) => match frame::decode(text.as_str()) {
                Some(IncomingEvent::Keepalive) => {
                    if outbound
                        .send(Outbound::Frame(KEEPALIVE_REPLY.to_string()))
                        .await
                        .is_err()
                    {
                        error!("writer gone, cannot answer keepalive");
                        break;
                    }
                }
                Some(event) => {
                    coordinator.on_event(event).await;
                }
                None => {}
            },
            Ok(Message::Close(_)) => {
                info!("server closed the transport");
                break;
            }
            Ok(_) => trace!("ignoring non-text frame"),
            Err(e) => {
                error!("transport receive error: {e}");
                break;
            }
        }
    }

    connected.send_replace(false);
    info!("receive loop ended, connection closed");
}
