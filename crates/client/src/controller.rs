//! Session controller
//!
//! Composes the identity, channel, list, and thread components. It is the
//! only component that issues outbound channel actions and REST calls, and
//! the only one with user-driven entry points. It owns the channel session
//! for the lifetime of the authenticated view: created here, released by
//! [`SessionController::shutdown`] — never reached through globals.
//!
//! All methods take `&mut self`, so every handler runs to completion
//! against the in-memory models before the next one starts; the epoch and
//! dedup guards in the models cover the orderings the network can still
//! produce.

use std::sync::Arc;

use deskline_protocol::{ChatMessage, ClientAction, ServerEvent, Ticket};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::channel::{ChannelSession, ChannelTransport, ConnectionState};
use crate::error::SyncError;
use crate::identity;
use crate::rest::TicketApi;
use crate::thread::MessageThread;
use crate::ticket_list::TicketList;

pub struct SessionController<A: TicketApi> {
    api: A,
    channel: ChannelSession,
    events: broadcast::Receiver<ServerEvent>,
    viewer_id: Option<String>,
    list: TicketList,
    thread: MessageThread,
}

impl<A: TicketApi> SessionController<A> {
    /// Build a controller for one authenticated view. A malformed
    /// credential disables sender attribution but nothing else — the
    /// claims are display-only, never an authorization input.
    pub fn new(
        api: A,
        transport: Arc<dyn ChannelTransport>,
        credential: impl Into<String>,
    ) -> Self {
        let credential = credential.into();
        let viewer_id = match identity::user_id_from_credential(&credential) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(
                    component = "controller",
                    event = "controller.identity.unavailable",
                    error = %err,
                    "Credential has no usable identity; attribution disabled"
                );
                None
            }
        };
        let channel = ChannelSession::new(transport, credential);
        let events = channel.subscribe();
        Self {
            api,
            channel,
            events,
            viewer_id,
            list: TicketList::new(),
            thread: MessageThread::new(),
        }
    }

    /// Connect, join the list topic, and load the ticket snapshot.
    pub async fn start(&mut self) -> Result<(), SyncError> {
        self.channel.connect().await?;
        self.channel.emit(&ClientAction::JoinTicketList).await?;
        let tickets = self.api.list_tickets().await?;
        self.list.load_snapshot(tickets);
        info!(
            component = "controller",
            event = "controller.started",
            tickets = self.list.len(),
            "Session started"
        );
        Ok(())
    }

    /// Release the channel connection. Call on view teardown.
    pub async fn shutdown(&mut self) {
        self.channel.disconnect().await;
    }

    /// Reconnect (idempotent) and re-assert topic membership after a
    /// connection loss, then reload the snapshot and the selected thread.
    /// Topic joins do not survive a reconnect on the server side, so they
    /// must be re-issued explicitly.
    pub async fn resync(&mut self) -> Result<(), SyncError> {
        self.channel.connect().await?;
        self.channel.emit(&ClientAction::JoinTicketList).await?;
        let tickets = self.api.list_tickets().await?;
        self.list.load_snapshot(tickets);

        if let Some(ticket_id) = self.thread.selected_ticket().map(str::to_string) {
            self.channel
                .emit(&ClientAction::JoinTicket {
                    ticket_id: ticket_id.clone(),
                })
                .await?;
            let epoch = self.thread.current_epoch();
            let messages = self.api.list_messages(&ticket_id).await?;
            if let Err(SyncError::StaleResult) =
                self.thread
                    .load_history(epoch, messages, self.viewer_id.as_deref())
            {
                debug!(
                    component = "controller",
                    event = "controller.resync.superseded",
                    ticket_id = %ticket_id,
                    "Selection changed during resync, history discarded"
                );
            }
        }
        Ok(())
    }

    /// Switch the active ticket: leave the old topic (best-effort), join
    /// the new one immediately, then fetch history. The join is not gated
    /// on the history response — events arriving first are reconciled by
    /// the thread model's ticket filter and id dedup.
    pub async fn select_ticket(&mut self, ticket_id: &str) -> Result<(), SyncError> {
        if let Some(previous) = self.thread.selected_ticket() {
            if previous != ticket_id {
                let leave = ClientAction::LeaveTicket {
                    ticket_id: previous.to_string(),
                };
                if let Err(err) = self.channel.emit(&leave).await {
                    debug!(
                        component = "controller",
                        event = "controller.leave.failed",
                        ticket_id = %previous,
                        error = %err,
                        "Best-effort leave not delivered"
                    );
                }
            }
        }

        let epoch = self.thread.begin_selection(ticket_id);
        if let Err(err) = self
            .channel
            .emit(&ClientAction::JoinTicket {
                ticket_id: ticket_id.to_string(),
            })
            .await
        {
            warn!(
                component = "controller",
                event = "controller.join.failed",
                ticket_id = %ticket_id,
                error = %err,
                "Join not delivered; membership resumes on resync"
            );
        }

        let messages = self.api.list_messages(ticket_id).await?;
        match self
            .thread
            .load_history(epoch, messages, self.viewer_id.as_deref())
        {
            Ok(()) => Ok(()),
            Err(SyncError::StaleResult) => {
                debug!(
                    component = "controller",
                    event = "controller.history.superseded",
                    ticket_id = %ticket_id,
                    "Discarded history for a superseded selection"
                );
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    /// Optimistic send: append locally, emit with an ack, resolve on the
    /// answer. Rejected locally — with no emit — for empty drafts or when
    /// no ticket is selected. On failure the draft stays visible, marked
    /// failed, so the user can retry.
    pub async fn send_message(&mut self, text: &str) -> Result<(), SyncError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SyncError::EmptyDraft);
        }
        let ticket_id = self
            .thread
            .selected_ticket()
            .ok_or(SyncError::NoSelection)?
            .to_string();

        let sender_id = self.viewer_id.clone().unwrap_or_default();
        let draft = ChatMessage::draft(ticket_id, sender_id, content);
        let handle = self.thread.append_optimistic(draft.clone());

        let ack = match self
            .channel
            .emit_with_ack(move |ack_id| ClientAction::SendMessage {
                ack_id,
                message: draft,
            })
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                self.thread.fail_optimistic(handle);
                return Err(err);
            }
        };

        self.thread.resolve_optimistic(handle, &ack)
    }

    /// Close a ticket through the REST API, then drop it locally. Clears
    /// the selection when it pointed at the removed ticket. User
    /// confirmation is the frontend's concern.
    pub async fn delete_ticket(&mut self, ticket_id: &str) -> Result<(), SyncError> {
        self.api.close_ticket(ticket_id).await?;
        self.list.remove(ticket_id);
        if self.thread.selected_ticket() == Some(ticket_id) {
            self.thread.clear_selection();
        }
        info!(
            component = "controller",
            event = "controller.ticket.deleted",
            ticket_id = %ticket_id,
            "Ticket closed"
        );
        Ok(())
    }

    /// Create a ticket and insert it locally. The server also streams a
    /// `new_ticket` event to the list topic; the list model's id dedup
    /// makes that echo a no-op.
    pub async fn create_ticket(
        &mut self,
        title: &str,
        initial_message: &str,
    ) -> Result<Ticket, SyncError> {
        let ticket = self.api.create_ticket(title, initial_message).await?;
        self.list.apply_created(ticket.clone());
        Ok(ticket)
    }

    /// Wait for the next server event, fold it into the models, and hand
    /// it back for display. Returns `None` once the event stream is gone.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => {
                    self.apply_event(&event);
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        component = "controller",
                        event = "controller.events.lagged",
                        skipped,
                        "Event stream lagged; consider a resync"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Fold one server event into the models. [`Self::next_event`] does
    /// this internally; frontends that run their own receive loop (from
    /// [`Self::subscribe`]) call it directly.
    pub fn apply_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::NewTicket { ticket } => {
                if !self.list.apply_created(ticket.clone()) {
                    debug!(
                        component = "controller",
                        event = "controller.ticket.duplicate",
                        ticket_id = %ticket.id,
                        "Streamed ticket already known"
                    );
                }
            }
            ServerEvent::NewMessage { message } => {
                let viewer = self.viewer_id.as_deref();
                if !self
                    .list
                    .apply_activity(&message.ticket_id, &message.sender_id, viewer)
                {
                    debug!(
                        component = "controller",
                        event = "controller.activity.unknown_ticket",
                        ticket_id = %message.ticket_id,
                        "Activity for a ticket not in the local list, dropped"
                    );
                }
                self.thread.append_incoming(message.clone(), viewer);
            }
            // Acks are resolved inside the channel session; nothing to do here
            ServerEvent::SendAck { .. } => {}
            ServerEvent::Error { code, message } => {
                warn!(
                    component = "controller",
                    event = "controller.server.error",
                    code = %code,
                    message = %message,
                    "Server reported an error"
                );
            }
        }
    }

    /// A fresh event receiver, for frontends that want to select over the
    /// stream alongside their own input sources.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.channel.subscribe()
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.viewer_id.as_deref()
    }

    pub fn list(&self) -> &TicketList {
        &self.list
    }

    pub fn thread(&self) -> &MessageThread {
        &self.thread
    }

    pub fn selected_ticket(&self) -> Option<&str> {
        self.thread.selected_ticket()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn connection_state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.channel.state_changes()
    }
}
