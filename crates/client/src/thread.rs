//! Message thread model
//!
//! Maintains the ordered message history for the currently selected ticket
//! only; messages for other tickets are never retained here (the list model
//! just needs the fact that activity happened). Pure and synchronous, like
//! the ticket list model.
//!
//! Thread order is local insertion order. The server is the source of truth
//! for persisted order on the next full history load; no timestamp
//! re-sorting happens here.

use std::collections::HashSet;

use deskline_protocol::{ChatMessage, SendAck};

use crate::error::SyncError;

/// Monotonic counter guarding against stale history responses. Minted by
/// [`MessageThread::begin_selection`]; a history load tagged with an older
/// epoch is discarded on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionEpoch(u64);

/// Handle to a pending optimistic send, used to resolve it once the
/// server acknowledgment arrives.
#[derive(Debug, Clone, Copy)]
pub struct PendingHandle {
    local_key: u64,
}

/// Who authored a message, from the viewer's perspective
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Me,
    Other,
}

/// Two-phase delivery state for thread entries. Locally originated sends
/// start `Pending` and move to `Confirmed` exactly once; `Confirmed` never
/// reverts. `Failed` keeps the draft content visible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Confirmed,
    Failed,
}

/// One message as displayed in the thread
#[derive(Debug, Clone)]
pub struct ThreadEntry {
    /// Stable local ordering key, assigned before the server ID exists
    pub local_key: u64,
    pub message: ChatMessage,
    pub sender: Sender,
    pub delivery: Delivery,
}

/// Outcome of routing an incoming message event into the thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// Message ID already present — idempotent merge, nothing changed
    Duplicate,
    /// Message belongs to a ticket other than the current selection
    OtherTicket,
}

#[derive(Default)]
pub struct MessageThread {
    selected: Option<String>,
    epoch: u64,
    entries: Vec<ThreadEntry>,
    seen_ids: HashSet<String>,
    next_local_key: u64,
}

impl MessageThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new selection, clearing the previous thread. Returns the
    /// epoch that the eventual history response must present.
    pub fn begin_selection(&mut self, ticket_id: &str) -> SelectionEpoch {
        self.epoch += 1;
        self.selected = Some(ticket_id.to_string());
        self.entries.clear();
        self.seen_ids.clear();
        SelectionEpoch(self.epoch)
    }

    /// Drop the selection entirely (ticket deleted, view closed).
    pub fn clear_selection(&mut self) {
        self.epoch += 1;
        self.selected = None;
        self.entries.clear();
        self.seen_ids.clear();
    }

    pub fn selected_ticket(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// The epoch of the current selection, for reloading history without
    /// discarding the thread first (reconnect resync).
    pub fn current_epoch(&self) -> SelectionEpoch {
        SelectionEpoch(self.epoch)
    }

    /// Replace the thread from a REST history response.
    ///
    /// Unconfirmed optimistic entries survive the replacement — the history
    /// fetch raced a local send and must not lose the draft. Returns
    /// [`SyncError::StaleResult`] if the selection changed while the
    /// request was in flight; the response is discarded.
    pub fn load_history(
        &mut self,
        epoch: SelectionEpoch,
        messages: Vec<ChatMessage>,
        viewer_id: Option<&str>,
    ) -> Result<(), SyncError> {
        if epoch.0 != self.epoch {
            return Err(SyncError::StaleResult);
        }

        let unconfirmed: Vec<ThreadEntry> = self
            .entries
            .drain(..)
            .filter(|entry| entry.delivery != Delivery::Confirmed)
            .collect();
        self.seen_ids.clear();

        for message in messages {
            if let Some(id) = &message.id {
                if !self.seen_ids.insert(id.clone()) {
                    continue;
                }
            }
            let sender = attribution(&message.sender_id, viewer_id);
            let local_key = self.take_key();
            self.entries.push(ThreadEntry {
                local_key,
                message,
                sender,
                delivery: Delivery::Confirmed,
            });
        }

        self.entries.extend(unconfirmed);
        Ok(())
    }

    /// Merge a streamed message event. Deduplicates by server ID and
    /// filters by the current selection — events for other tickets only
    /// matter to the list model and are reported as [`AppendOutcome::OtherTicket`].
    pub fn append_incoming(&mut self, message: ChatMessage, viewer_id: Option<&str>) -> AppendOutcome {
        if self.selected.as_deref() != Some(message.ticket_id.as_str()) {
            return AppendOutcome::OtherTicket;
        }
        if let Some(id) = &message.id {
            if !self.seen_ids.insert(id.clone()) {
                return AppendOutcome::Duplicate;
            }
        }
        let sender = attribution(&message.sender_id, viewer_id);
        let local_key = self.take_key();
        self.entries.push(ThreadEntry {
            local_key,
            message,
            sender,
            delivery: Delivery::Confirmed,
        });
        AppendOutcome::Appended
    }

    /// Append a locally authored draft before the server has seen it.
    /// The entry has no server ID yet; the returned handle resolves it.
    pub fn append_optimistic(&mut self, draft: ChatMessage) -> PendingHandle {
        let local_key = self.take_key();
        self.entries.push(ThreadEntry {
            local_key,
            message: draft,
            sender: Sender::Me,
            delivery: Delivery::Pending,
        });
        PendingHandle { local_key }
    }

    /// Resolve an optimistic send from its acknowledgment.
    ///
    /// Success attaches the server ID and timestamp and confirms the entry;
    /// the ID is recorded so a later `new_message` echo of the same message
    /// is a no-op. Failure marks the entry `Failed` and keeps the content.
    /// A handle whose entry is already confirmed is ignored — the
    /// transition is exactly-once and never reverts.
    pub fn resolve_optimistic(
        &mut self,
        handle: PendingHandle,
        ack: &SendAck,
    ) -> Result<(), SyncError> {
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.local_key == handle.local_key)
        else {
            // Selection changed while the ack was in flight
            return Err(SyncError::StaleResult);
        };
        if entry.delivery == Delivery::Confirmed {
            return Ok(());
        }

        if ack.success {
            if let Some(id) = &ack.message_id {
                entry.message.id = Some(id.clone());
                self.seen_ids.insert(id.clone());
            }
            if let Some(created_at) = &ack.created_at {
                entry.message.created_at = Some(created_at.clone());
            }
            entry.delivery = Delivery::Confirmed;
            Ok(())
        } else {
            entry.delivery = Delivery::Failed;
            Err(SyncError::AckFailed(
                ack.error
                    .clone()
                    .unwrap_or_else(|| "send rejected".to_string()),
            ))
        }
    }

    /// Mark a pending entry failed without an acknowledgment (the emit
    /// itself failed locally). The draft content stays visible for retry.
    pub fn fail_optimistic(&mut self, handle: PendingHandle) {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.local_key == handle.local_key)
        {
            if entry.delivery == Delivery::Pending {
                entry.delivery = Delivery::Failed;
            }
        }
    }

    pub fn entries(&self) -> &[ThreadEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn take_key(&mut self) -> u64 {
        self.next_local_key += 1;
        self.next_local_key
    }
}

fn attribution(sender_id: &str, viewer_id: Option<&str>) -> Sender {
    if viewer_id == Some(sender_id) {
        Sender::Me
    } else {
        Sender::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_protocol::MessageKind;

    fn message(id: &str, ticket_id: &str, sender_id: &str, content: &str) -> ChatMessage {
        ChatMessage {
            id: Some(id.to_string()),
            ticket_id: ticket_id.to_string(),
            sender_id: sender_id.to_string(),
            content: content.to_string(),
            kind: MessageKind::Text,
            created_at: Some("2025-01-10T09:00:00Z".to_string()),
        }
    }

    fn ok_ack(message_id: &str) -> SendAck {
        SendAck {
            success: true,
            message_id: Some(message_id.to_string()),
            created_at: Some("2025-01-10T09:01:00Z".to_string()),
            error: None,
        }
    }

    #[test]
    fn history_load_attributes_senders() {
        let mut thread = MessageThread::new();
        let epoch = thread.begin_selection("t-1");
        thread
            .load_history(
                epoch,
                vec![
                    message("m-1", "t-1", "u-1", "hi"),
                    message("m-2", "t-1", "u-2", "hello"),
                ],
                Some("u-1"),
            )
            .unwrap();

        assert_eq!(thread.len(), 2);
        assert_eq!(thread.entries()[0].sender, Sender::Me);
        assert_eq!(thread.entries()[1].sender, Sender::Other);
        assert!(thread
            .entries()
            .iter()
            .all(|e| e.delivery == Delivery::Confirmed));
    }

    #[test]
    fn stale_history_response_is_discarded() {
        let mut thread = MessageThread::new();
        let epoch_a = thread.begin_selection("t-a");
        let epoch_b = thread.begin_selection("t-b");

        // A's delayed response arrives after B became the selection
        let result = thread.load_history(epoch_a, vec![message("m-1", "t-a", "u-2", "old")], None);
        assert!(matches!(result, Err(SyncError::StaleResult)));
        assert!(thread.is_empty());

        thread
            .load_history(epoch_b, vec![message("m-2", "t-b", "u-2", "new")], None)
            .unwrap();
        assert_eq!(thread.len(), 1);
        assert_eq!(thread.entries()[0].message.ticket_id, "t-b");
    }

    #[test]
    fn incoming_dedups_by_id() {
        let mut thread = MessageThread::new();
        let epoch = thread.begin_selection("t-1");
        thread
            .load_history(epoch, vec![message("m-1", "t-1", "u-2", "hi")], Some("u-1"))
            .unwrap();

        assert_eq!(
            thread.append_incoming(message("m-1", "t-1", "u-2", "hi"), Some("u-1")),
            AppendOutcome::Duplicate
        );
        assert_eq!(thread.len(), 1);

        assert_eq!(
            thread.append_incoming(message("m-2", "t-1", "u-2", "again"), Some("u-1")),
            AppendOutcome::Appended
        );
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn incoming_for_other_ticket_is_not_retained() {
        let mut thread = MessageThread::new();
        let epoch = thread.begin_selection("t-1");
        thread.load_history(epoch, vec![], Some("u-1")).unwrap();

        assert_eq!(
            thread.append_incoming(message("m-9", "t-2", "u-2", "elsewhere"), Some("u-1")),
            AppendOutcome::OtherTicket
        );
        assert!(thread.is_empty());
    }

    #[test]
    fn incoming_with_no_selection_is_not_retained() {
        let mut thread = MessageThread::new();
        assert_eq!(
            thread.append_incoming(message("m-1", "t-1", "u-2", "hi"), None),
            AppendOutcome::OtherTicket
        );
        assert!(thread.is_empty());
    }

    #[test]
    fn optimistic_roundtrip_confirms_exactly_once() {
        let mut thread = MessageThread::new();
        thread.begin_selection("t-1");

        let handle = thread.append_optimistic(ChatMessage::draft("t-1", "u-1", "hi"));
        assert_eq!(thread.entries()[0].delivery, Delivery::Pending);
        assert!(thread.entries()[0].message.id.is_none());

        thread.resolve_optimistic(handle, &ok_ack("42")).unwrap();
        let entry = &thread.entries()[0];
        assert_eq!(entry.delivery, Delivery::Confirmed);
        assert_eq!(entry.message.id.as_deref(), Some("42"));
        assert_eq!(entry.message.created_at.as_deref(), Some("2025-01-10T09:01:00Z"));

        // The server's echo of the same message must not duplicate it
        assert_eq!(
            thread.append_incoming(message("42", "t-1", "u-1", "hi"), Some("u-1")),
            AppendOutcome::Duplicate
        );
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn confirmed_never_reverts() {
        let mut thread = MessageThread::new();
        thread.begin_selection("t-1");
        let handle = thread.append_optimistic(ChatMessage::draft("t-1", "u-1", "hi"));
        thread.resolve_optimistic(handle, &ok_ack("42")).unwrap();

        let failed = SendAck {
            success: false,
            message_id: None,
            created_at: None,
            error: Some("late failure".to_string()),
        };
        thread.resolve_optimistic(handle, &failed).unwrap();
        assert_eq!(thread.entries()[0].delivery, Delivery::Confirmed);
    }

    #[test]
    fn failed_ack_keeps_draft_content() {
        let mut thread = MessageThread::new();
        thread.begin_selection("t-1");
        let handle = thread.append_optimistic(ChatMessage::draft("t-1", "u-1", "keep me"));

        let failed = SendAck {
            success: false,
            message_id: None,
            created_at: None,
            error: Some("ticket closed".to_string()),
        };
        let result = thread.resolve_optimistic(handle, &failed);
        assert!(matches!(result, Err(SyncError::AckFailed(_))));

        let entry = &thread.entries()[0];
        assert_eq!(entry.delivery, Delivery::Failed);
        assert_eq!(entry.message.content, "keep me");
    }

    #[test]
    fn resolve_after_reselection_is_stale() {
        let mut thread = MessageThread::new();
        thread.begin_selection("t-1");
        let handle = thread.append_optimistic(ChatMessage::draft("t-1", "u-1", "hi"));

        thread.begin_selection("t-2");
        assert!(matches!(
            thread.resolve_optimistic(handle, &ok_ack("42")),
            Err(SyncError::StaleResult)
        ));
        assert!(thread.is_empty());
    }

    #[test]
    fn history_load_preserves_pending_entries() {
        let mut thread = MessageThread::new();
        let epoch = thread.begin_selection("t-1");
        let handle = thread.append_optimistic(ChatMessage::draft("t-1", "u-1", "in flight"));

        thread
            .load_history(epoch, vec![message("m-1", "t-1", "u-2", "earlier")], Some("u-1"))
            .unwrap();

        assert_eq!(thread.len(), 2);
        assert_eq!(thread.entries()[0].message.id.as_deref(), Some("m-1"));
        assert_eq!(thread.entries()[1].delivery, Delivery::Pending);

        // The handle still resolves after the reload
        thread.resolve_optimistic(handle, &ok_ack("m-2")).unwrap();
        assert_eq!(thread.entries()[1].delivery, Delivery::Confirmed);
    }

    #[test]
    fn idempotent_history_merge_keeps_length() {
        let mut thread = MessageThread::new();
        let epoch = thread.begin_selection("t-1");
        let history = vec![
            message("m-1", "t-1", "u-2", "one"),
            message("m-2", "t-1", "u-2", "two"),
        ];
        thread.load_history(epoch, history.clone(), Some("u-1")).unwrap();

        for msg in history {
            thread.append_incoming(msg, Some("u-1"));
        }
        assert_eq!(thread.len(), 2);
    }
}
