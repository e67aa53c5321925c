//! WebSocket channel transport
//!
//! Bridges a tokio-tungstenite connection to the frame channels the
//! session works with. The credential rides as a `?token=` query
//! parameter, the form the server accepts for WebSocket upgrades where
//! headers are awkward to set.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::channel::{ChannelTransport, TransportLink};
use crate::error::SyncError;

const FRAME_BUFFER: usize = 64;

pub struct WsTransport {
    url: String,
}

impl WsTransport {
    /// `url` is the full WebSocket endpoint, e.g. `ws://localhost:3000/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl ChannelTransport for WsTransport {
    async fn open(&self, credential: &str) -> Result<TransportLink, SyncError> {
        let url = format!("{}?token={}", self.url, credential);
        let (socket, _response) = connect_async(&url).await.map_err(|err| {
            warn!(
                component = "ws",
                event = "ws.connect.failed",
                error = %err,
                "WebSocket connect failed"
            );
            SyncError::ChannelUnavailable
        })?;
        let (mut sink, mut stream) = socket.split();

        let (out_tx, mut out_rx) = mpsc::channel::<String>(FRAME_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<String>(FRAME_BUFFER);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!(
                            component = "ws",
                            event = "ws.connection.close_frame",
                            "Server sent close frame"
                        );
                        break;
                    }
                    // Ping/pong are handled by the library; binary frames
                    // are not part of this protocol
                    Ok(_) => continue,
                    Err(err) => {
                        debug!(
                            component = "ws",
                            event = "ws.connection.error",
                            error = %err,
                            "WebSocket read error"
                        );
                        break;
                    }
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
