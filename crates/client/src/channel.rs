//! Channel session — lifecycle of the one real-time connection
//!
//! A session owns at most one live connection, authenticated with the
//! bearer credential. Inbound events fan out to every subscriber over a
//! broadcast channel; acknowledgments are correlated by `ack_id` and
//! resolved through oneshot channels, exactly once. Connection failures
//! surface as a state transition to `Disconnected`, never as panics or
//! surprise errors inside subscribers.
//!
//! Reconnection is not automatic and neither is topic re-join: dependents
//! watch [`ChannelSession::state_changes`] and re-assert membership
//! themselves after a reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deskline_protocol::{ClientAction, SendAck, ServerEvent};
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::SyncError;

const EVENT_FANOUT_CAPACITY: usize = 256;
const ACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection lifecycle state, observable through a watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// A live transport link: JSON frames in each direction. The transport
/// owns its own IO tasks; dropping `outbound` closes the write side.
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<String>,
}

/// Seam between the session and the wire. The WebSocket implementation
/// lives in [`crate::ws`]; tests use [`crate::loopback`].
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn open(&self, credential: &str) -> Result<TransportLink, SyncError>;
}

type PendingAcks = Arc<Mutex<HashMap<u64, oneshot::Sender<SendAck>>>>;

struct ActiveConnection {
    outbound: mpsc::Sender<String>,
    reader: JoinHandle<()>,
}

pub struct ChannelSession {
    transport: Arc<dyn ChannelTransport>,
    credential: String,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ServerEvent>,
    active: Mutex<Option<ActiveConnection>>,
    pending_acks: PendingAcks,
    next_ack_id: AtomicU64,
    next_generation: AtomicU64,
    /// Generation of the connection currently allowed to flip state.
    /// A reader that outlives its connection must not mark a newer one
    /// disconnected.
    current_generation: Arc<AtomicU64>,
}

impl ChannelSession {
    pub fn new(transport: Arc<dyn ChannelTransport>, credential: impl Into<String>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, _) = broadcast::channel(EVENT_FANOUT_CAPACITY);
        Self {
            transport,
            credential: credential.into(),
            state_tx,
            events_tx,
            active: Mutex::new(None),
            pending_acks: Arc::new(Mutex::new(HashMap::new())),
            next_ack_id: AtomicU64::new(1),
            next_generation: AtomicU64::new(0),
            current_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open the connection. Idempotent: while a connection is live or in
    /// progress, further calls return without side effects.
    pub async fn connect(&self) -> Result<(), SyncError> {
        let mut active = self.active.lock().await;
        if active.is_some() && self.state() != ConnectionState::Disconnected {
            debug!(
                component = "channel",
                event = "channel.connect.reused",
                "Connection already live, reusing"
            );
            return Ok(());
        }
        if let Some(stale) = active.take() {
            stale.reader.abort();
        }

        self.state_tx.send_replace(ConnectionState::Connecting);
        let link = match self.transport.open(&self.credential).await {
            Ok(link) => link,
            Err(err) => {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                warn!(
                    component = "channel",
                    event = "channel.connect.failed",
                    error = %err,
                    "Transport open failed"
                );
                return Err(err);
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.current_generation.store(generation, Ordering::Relaxed);

        let reader = tokio::spawn(read_loop(
            link.inbound,
            self.events_tx.clone(),
            self.pending_acks.clone(),
            self.state_tx.clone(),
            generation,
            self.current_generation.clone(),
        ));

        *active = Some(ActiveConnection {
            outbound: link.outbound,
            reader,
        });
        self.state_tx.send_replace(ConnectionState::Connected);
        debug!(
            component = "channel",
            event = "channel.connect.opened",
            generation,
            "Connection established"
        );
        Ok(())
    }

    /// Release the connection. A later `connect` starts fresh.
    /// Outstanding acknowledgment waiters fail with `ChannelUnavailable`.
    pub async fn disconnect(&self) {
        let mut active = self.active.lock().await;
        if let Some(conn) = active.take() {
            conn.reader.abort();
        }
        self.current_generation.store(0, Ordering::Relaxed);
        self.state_tx.send_replace(ConnectionState::Disconnected);
        self.pending_acks.lock().await.clear();
        debug!(
            component = "channel",
            event = "channel.disconnected",
            "Connection released"
        );
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe connection state transitions (for re-join after reconnect)
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to server-pushed events. Every receiver sees every event;
    /// dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events_tx.subscribe()
    }

    /// Send an action without expecting an acknowledgment. Fails locally
    /// with [`SyncError::ChannelUnavailable`] while disconnected rather
    /// than silently queueing.
    pub async fn emit(&self, action: &ClientAction) -> Result<(), SyncError> {
        if self.state() != ConnectionState::Connected {
            return Err(SyncError::ChannelUnavailable);
        }
        let frame = serde_json::to_string(action).map_err(|err| {
            warn!(
                component = "channel",
                event = "channel.emit.serialize_failed",
                error = %err,
                "Failed to serialize action"
            );
            SyncError::ChannelUnavailable
        })?;

        let outbound = {
            let active = self.active.lock().await;
            match active.as_ref() {
                Some(conn) => conn.outbound.clone(),
                None => return Err(SyncError::ChannelUnavailable),
            }
        };
        outbound.send(frame).await.map_err(|_| {
            self.state_tx.send_replace(ConnectionState::Disconnected);
            SyncError::ChannelUnavailable
        })
    }

    /// Send an action that wants an acknowledgment. The closure receives
    /// the allocated `ack_id` to embed in the action; the returned future
    /// resolves exactly once with the server's answer.
    pub async fn emit_with_ack<F>(&self, build: F) -> Result<SendAck, SyncError>
    where
        F: FnOnce(u64) -> ClientAction,
    {
        let ack_id = self.next_ack_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending_acks.lock().await.insert(ack_id, tx);

        if let Err(err) = self.emit(&build(ack_id)).await {
            self.pending_acks.lock().await.remove(&ack_id);
            return Err(err);
        }

        match tokio::time::timeout(ACK_TIMEOUT, rx).await {
            Ok(Ok(ack)) => Ok(ack),
            // Pending map cleared: the connection dropped under us
            Ok(Err(_)) => Err(SyncError::ChannelUnavailable),
            Err(_) => {
                self.pending_acks.lock().await.remove(&ack_id);
                Err(SyncError::AckFailed("acknowledgment timed out".to_string()))
            }
        }
    }
}

/// Drains inbound frames for one connection: acknowledgments resolve their
/// pending oneshot, everything else fans out to subscribers. When the
/// transport closes, the session is marked disconnected (unless a newer
/// connection has replaced this one) and ack waiters are failed.
async fn read_loop(
    mut inbound: mpsc::Receiver<String>,
    events_tx: broadcast::Sender<ServerEvent>,
    pending_acks: PendingAcks,
    state_tx: watch::Sender<ConnectionState>,
    generation: u64,
    current_generation: Arc<AtomicU64>,
) {
    while let Some(frame) = inbound.recv().await {
        let event: ServerEvent = match serde_json::from_str(&frame) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    component = "channel",
                    event = "channel.frame.parse_failed",
                    error = %err,
                    payload_bytes = frame.len(),
                    "Failed to parse server event"
                );
                continue;
            }
        };

        match event {
            ServerEvent::SendAck { ack_id, ack } => {
                match pending_acks.lock().await.remove(&ack_id) {
                    Some(tx) => {
                        let _ = tx.send(ack);
                    }
                    None => debug!(
                        component = "channel",
                        event = "channel.ack.unmatched",
                        ack_id,
                        "Acknowledgment with no waiter"
                    ),
                }
            }
            other => {
                // No receivers is fine; subscribers come and go
                let _ = events_tx.send(other);
            }
        }
    }

    if current_generation.load(Ordering::Relaxed) == generation {
        state_tx.send_replace(ConnectionState::Disconnected);
        pending_acks.lock().await.clear();
        debug!(
            component = "channel",
            event = "channel.transport.closed",
            generation,
            "Transport closed, session disconnected"
        );
    }
}
