//! Server → Client events

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, SendAck, Ticket};

/// Events pushed from the server to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A ticket was created (delivered on the ticket-list topic)
    NewTicket {
        ticket: Ticket,
    },
    /// A message was persisted (delivered on the list topic for reordering
    /// and on the ticket topic for thread display)
    NewMessage {
        message: ChatMessage,
    },
    /// Acknowledgment for a client action that carried an `ack_id`
    SendAck {
        ack_id: u64,
        #[serde(flatten)]
        ack: SendAck,
    },
    /// Server-side failure not tied to a specific action
    Error {
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::ServerEvent;
    use crate::types::TicketStatus;

    #[test]
    fn roundtrip_new_ticket() {
        let json = r#"{
          "type":"new_ticket",
          "ticket":{
            "id":"t-3",
            "title":"Payment failed",
            "status":"open",
            "updated_at":"2025-01-11T12:00:00Z"
          }
        }"#;

        let parsed: ServerEvent = serde_json::from_str(json).expect("parse new_ticket");
        match &parsed {
            ServerEvent::NewTicket { ticket } => {
                assert_eq!(ticket.id, "t-3");
                assert_eq!(ticket.status, TicketStatus::Open);
            }
            other => panic!("unexpected variant: {:?}", other),
        }

        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let _: ServerEvent = serde_json::from_str(&serialized).expect("reparse");
    }

    #[test]
    fn roundtrip_new_message() {
        let json = r#"{
          "type":"new_message",
          "message":{
            "id":"m-42",
            "ticket_id":"t-3",
            "sender_id":"u-2",
            "content":"any update?",
            "kind":"text",
            "created_at":"2025-01-11T12:05:00Z"
          }
        }"#;

        let parsed: ServerEvent = serde_json::from_str(json).expect("parse new_message");
        match parsed {
            ServerEvent::NewMessage { message } => {
                assert_eq!(message.id.as_deref(), Some("m-42"));
                assert_eq!(message.ticket_id, "t-3");
                assert_eq!(message.sender_id, "u-2");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn send_ack_flattens_payload() {
        let json = r#"{
          "type":"send_ack",
          "ack_id":7,
          "success":true,
          "message_id":"m-100",
          "created_at":"2025-01-11T12:06:00Z"
        }"#;

        let parsed: ServerEvent = serde_json::from_str(json).expect("parse send_ack");
        match parsed {
            ServerEvent::SendAck { ack_id, ack } => {
                assert_eq!(ack_id, 7);
                assert!(ack.success);
                assert_eq!(ack.message_id.as_deref(), Some("m-100"));
                assert!(ack.error.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn send_ack_failure_carries_error() {
        let json = r#"{"type":"send_ack","ack_id":8,"success":false,"error":"ticket closed"}"#;
        let parsed: ServerEvent = serde_json::from_str(json).expect("parse failed ack");
        match parsed {
            ServerEvent::SendAck { ack_id, ack } => {
                assert_eq!(ack_id, 8);
                assert!(!ack.success);
                assert_eq!(ack.error.as_deref(), Some("ticket closed"));
                assert!(ack.message_id.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }
}
