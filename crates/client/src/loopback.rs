//! In-memory channel transport
//!
//! Backs the test suite: hands out pre-built [`TransportLink`]s and gives
//! the caller the server side of each, so tests can script the server's
//! behavior without a network.

use std::collections::VecDeque;

use async_trait::async_trait;
use deskline_protocol::{ClientAction, ServerEvent};
use tokio::sync::{mpsc, Mutex};

use crate::channel::{ChannelTransport, TransportLink};
use crate::error::SyncError;

const FRAME_BUFFER: usize = 64;

pub struct LoopbackTransport {
    links: Mutex<VecDeque<TransportLink>>,
}

/// The server half of a loopback link
pub struct ServerEnd {
    from_client: mpsc::Receiver<String>,
    to_client: mpsc::Sender<String>,
}

impl LoopbackTransport {
    /// A transport with exactly one link. A second physical open fails,
    /// which makes connection reuse observable in tests.
    pub fn single() -> (Self, ServerEnd) {
        let (link, server) = loopback_link();
        (
            Self {
                links: Mutex::new(VecDeque::from([link])),
            },
            server,
        )
    }

    /// A transport with two links, for disconnect/reconnect scenarios.
    pub fn pair_of_links() -> (Self, ServerEnd, ServerEnd) {
        let (first_link, first_server) = loopback_link();
        let (second_link, second_server) = loopback_link();
        (
            Self {
                links: Mutex::new(VecDeque::from([first_link, second_link])),
            },
            first_server,
            second_server,
        )
    }
}

#[async_trait]
impl ChannelTransport for LoopbackTransport {
    async fn open(&self, _credential: &str) -> Result<TransportLink, SyncError> {
        self.links
            .lock()
            .await
            .pop_front()
            .ok_or(SyncError::ChannelUnavailable)
    }
}

impl ServerEnd {
    /// Receive the next client action, or `None` once the client hung up.
    /// Frames that do not parse as actions panic — tests only send valid
    /// protocol traffic.
    pub async fn recv_action(&mut self) -> Option<ClientAction> {
        let frame = self.from_client.recv().await?;
        Some(serde_json::from_str(&frame).expect("client sent an invalid action frame"))
    }

    /// Try to receive an action without waiting.
    pub fn try_recv_action(&mut self) -> Option<ClientAction> {
        let frame = self.from_client.try_recv().ok()?;
        Some(serde_json::from_str(&frame).expect("client sent an invalid action frame"))
    }

    /// Push a server event to the client.
    pub async fn push_event(&self, event: &ServerEvent) {
        let frame = serde_json::to_string(event).expect("serialize server event");
        let _ = self.to_client.send(frame).await;
    }
}

fn loopback_link() -> (TransportLink, ServerEnd) {
    let (out_tx, out_rx) = mpsc::channel(FRAME_BUFFER);
    let (in_tx, in_rx) = mpsc::channel(FRAME_BUFFER);
    (
        TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        },
        ServerEnd {
            from_client: out_rx,
            to_client: in_tx,
        },
    )
}
