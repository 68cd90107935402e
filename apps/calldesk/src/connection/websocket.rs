use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, trace};

use super::link::{ConnectError, Connector, Link};

/// Opens links over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Link, ConnectError> {
        let (ws_stream, response) =
            connect_async(url).await.map_err(|source| ConnectError::Handshake {
                url: url.to_string(),
                source,
            })?;
        debug!(
            target: "calldesk::connection",
            url,
            status = %response.status(),
            "websocket handshake complete"
        );

        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<String>();
        tokio::spawn(pump(ws_stream, rx_out, tx_in));

        Ok(Link {
            outbound: tx_out,
            inbound: rx_in,
        })
    }
}

async fn pump(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    tx_in: mpsc::UnboundedSender<String>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx_out.recv().await {
            if ws_sender.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        // Every sender dropped: the client is closing the link.
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if tx_in.send(text).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => {
                    if tx_in.send(text).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(target: "calldesk::connection", error = %err, "ignoring non-utf8 binary frame");
                }
            },
            Ok(Message::Close(frame)) => {
                trace!(target: "calldesk::connection", ?frame, "close frame received");
                break;
            }
            Err(err) => {
                debug!(target: "calldesk::connection", error = %err, "websocket read failed");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    let _ = send_task.await;
}
