//! Core types shared across the protocol

use serde::{Deserialize, Serialize};

/// Ticket status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Pending,
    Closed,
}

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    System,
}

/// A support ticket as seen in list views
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub title: String,
    pub status: TicketStatus,
    /// Whether the most recent message on this ticket came from the
    /// viewer. False drives the awaiting-reply highlight in list views.
    #[serde(default)]
    pub is_last_sender_me: bool,
    /// Server-side last-activity timestamp (ISO 8601), the initial sort key
    pub updated_at: String,
}

/// A chat message within a ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-issued ID. `None` for a locally authored draft that has not
    /// been acknowledged yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ticket_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl ChatMessage {
    /// Build a text draft for an optimistic send
    pub fn draft(
        ticket_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            ticket_id: ticket_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            kind: MessageKind::Text,
            created_at: None,
        }
    }
}

/// Acknowledgment payload for an action that requested one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAck {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_defaults_is_last_sender_me() {
        let json = r#"{
          "id":"t-1",
          "title":"Login broken",
          "status":"open",
          "updated_at":"2025-01-10T09:00:00Z"
        }"#;
        let ticket: Ticket = serde_json::from_str(json).expect("parse ticket");
        assert_eq!(ticket.id, "t-1");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert!(!ticket.is_last_sender_me);
    }

    #[test]
    fn draft_has_no_id_or_timestamp() {
        let draft = ChatMessage::draft("t-1", "u-1", "hello");
        assert!(draft.id.is_none());
        assert!(draft.created_at.is_none());
        assert_eq!(draft.kind, MessageKind::Text);

        let json = serde_json::to_string(&draft).expect("serialize");
        assert!(!json.contains("\"id\""));
        assert!(!json.contains("created_at"));
    }
}
