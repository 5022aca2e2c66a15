//! Push transports.

use super::messages::{decode_frame, ClientMessage, PushEvent};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// An open push connection.
///
/// `incoming` ends when the connection closes. Dropping `outgoing` or
/// aborting `task` closes it from this side.
pub struct PushConnection {
    pub outgoing: mpsc::UnboundedSender<ClientMessage>,
    pub incoming: mpsc::UnboundedReceiver<PushEvent>,
    pub task: JoinHandle<()>,
}

/// Opens push connections. The returned connection is ready to send.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn open(&self, token: &str) -> Result<PushConnection>;
}

/// WebSocket push transport.
#[derive(Clone, Debug)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn open(&self, token: &str) -> Result<PushConnection> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| SyncError::InvalidOperation("token is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws_stream, _) = connect_async(request).await?;
        tracing::debug!(url = %self.url, "push socket open");

        let (tx_out, rx_out) = mpsc::unbounded_channel();
        let (tx_in, rx_in) = mpsc::unbounded_channel();
        let task = tokio::spawn(handle_websocket(ws_stream, rx_out, tx_in));

        Ok(PushConnection {
            outgoing: tx_out,
            incoming: rx_in,
            task,
        })
    }
}

/// Pump frames between the socket and the connection channels until
/// either side closes.
async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<ClientMessage>,
    tx_in: mpsc::UnboundedSender<PushEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(message) = rx_out.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode push frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match decode_frame(&text) {
                Ok(event) => {
                    if tx_in.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "ignoring undecodable push frame"),
            },
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!(error = %e, "push socket error");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    let _ = send_task.await;
}
