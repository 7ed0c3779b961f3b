use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Group, Message};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayEvent {
    /// Server confirms the connection is established and joined
    Ready {
        connection_id: Uuid,
        username: String,
    },

    /// Group membership changed (someone joined or left the conversation)
    UpdatedGroup { group: Group },

    /// The full conversation thread, oldest first. Sent only to the
    /// connecting client; any messages it had not read are marked read
    /// before this event is emitted.
    ReceiveMessageThread { messages: Vec<Message> },

    /// A new message was posted to the conversation
    NewMessage { message: Message },

    /// Lightweight notification for a recipient who is online but not
    /// viewing this conversation. Carries sender identity only, never content.
    NewMessageNotification {
        sender_username: String,
        sender_display_name: String,
    },

    /// An operation failed; the reason is safe to show to the user
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GatewayCommand {
    /// Send a message to the other party of the open conversation
    SendMessage {
        recipient_username: String,
        content: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_names_are_kebab_case() {
        let event = GatewayEvent::NewMessageNotification {
            sender_username: "alice".into(),
            sender_display_name: "Alice".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "new-message-notification");

        let event = GatewayEvent::UpdatedGroup {
            group: Group {
                name: "alice-bob".into(),
                members: vec![],
            },
        };
        assert_eq!(serde_json::to_value(&event).unwrap()["type"], "updated-group");

        let event = GatewayEvent::ReceiveMessageThread { messages: vec![] };
        assert_eq!(
            serde_json::to_value(&event).unwrap()["type"],
            "receive-message-thread"
        );
    }

    #[test]
    fn send_message_command_round_trips() {
        let raw = r#"{"type":"send-message","data":{"recipient_username":"bob","content":"hi"}}"#;
        let cmd: GatewayCommand = serde_json::from_str(raw).unwrap();
        let GatewayCommand::SendMessage {
            recipient_username,
            content,
        } = cmd;
        assert_eq!(recipient_username, "bob");
        assert_eq!(content, "hi");
    }
}
