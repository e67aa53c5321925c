//! Client → Server actions

use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Actions sent from the client to the server over the real-time channel.
///
/// The channel transport is plain JSON frames, so acknowledgments are
/// correlated explicitly: an action that wants one carries a
/// client-assigned `ack_id` and the server answers with a matching
/// [`crate::ServerEvent::SendAck`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAction {
    // Topic membership
    JoinTicketList,
    JoinTicket {
        ticket_id: String,
    },
    LeaveTicket {
        ticket_id: String,
    },

    // Messaging
    SendMessage {
        ack_id: u64,
        message: ChatMessage,
    },
}

#[cfg(test)]
mod tests {
    use super::ClientAction;
    use crate::types::{ChatMessage, MessageKind};

    #[test]
    fn join_ticket_list_is_bare() {
        let action = ClientAction::JoinTicketList;
        let json = serde_json::to_string(&action).expect("serialize");
        assert_eq!(json, r#"{"type":"join_ticket_list"}"#);
    }

    #[test]
    fn roundtrip_join_ticket() {
        let json = r#"{"type":"join_ticket","ticket_id":"t-9"}"#;
        let parsed: ClientAction = serde_json::from_str(json).expect("parse join_ticket");
        match &parsed {
            ClientAction::JoinTicket { ticket_id } => assert_eq!(ticket_id, "t-9"),
            other => panic!("unexpected variant: {:?}", other),
        }

        let serialized = serde_json::to_string(&parsed).expect("serialize");
        let _: ClientAction = serde_json::from_str(&serialized).expect("reparse");
    }

    #[test]
    fn roundtrip_send_message() {
        let json = r#"{
          "type":"send_message",
          "ack_id":7,
          "message":{
            "ticket_id":"t-1",
            "sender_id":"u-1",
            "content":"hi there",
            "kind":"text"
          }
        }"#;

        let parsed: ClientAction = serde_json::from_str(json).expect("parse send_message");
        match &parsed {
            ClientAction::SendMessage { ack_id, message } => {
                assert_eq!(*ack_id, 7);
                assert_eq!(message.ticket_id, "t-1");
                assert_eq!(message.content, "hi there");
                assert_eq!(message.kind, MessageKind::Text);
                assert!(message.id.is_none());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn send_message_serializes_draft_without_id() {
        let action = ClientAction::SendMessage {
            ack_id: 1,
            message: ChatMessage::draft("t-2", "u-2", "ping"),
        };
        let json = serde_json::to_string(&action).expect("serialize");
        assert!(json.contains(r#""type":"send_message""#));
        assert!(!json.contains(r#""id""#));
    }
}
