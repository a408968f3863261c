use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::models::Message;

/// Events sent FROM server TO client over the WebSocket gateway.
///
/// Frames are `{"type": "<event>", "data": {...}}` with camelCase names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms the authenticated identity of this connection
    Ready { user_id: Uuid, username: String },

    /// This connection is now a member of the room shared with `peer_id`
    Joined { room_id: String, peer_id: Uuid },

    /// This connection left the room shared with `peer_id`
    Left { room_id: String, peer_id: Uuid },

    /// A message was persisted in a room this connection has joined
    MessageReceived {
        message_payload: Message,
        sender_info: Option<serde_json::Value>,
        chat: ChatRef,
    },

    /// A participant marked messages as seen
    MessagesSeen {
        chat_id: Uuid,
        user_id: Uuid,
        message_ids: Vec<Uuid>,
    },

    /// A command from this connection was rejected
    Error {
        code: ErrorKind,
        message: String,
        command: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRef {
    pub chat_id: Uuid,
    pub participants: [Uuid; 2],
}

/// Commands sent FROM client TO server over WebSocket.
///
/// Identifiers arrive as strings so malformed ids can be reported back as
/// `INVALID_IDENTIFIER` instead of failing the whole frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Open the conversation with `peer_id` on this connection
    JoinChat { self_id: String, peer_id: String },

    /// Close the conversation with `peer_id` on this connection
    LeaveChat { self_id: String, peer_id: String },

    /// Persist a message and broadcast it to the pair's room
    SendMessage {
        sender_info: Option<serde_json::Value>,
        sender_id: String,
        receiver_id: String,
        text: String,
    },

    /// Record read receipts for messages in a chat
    MarkSeen {
        chat_id: String,
        message_ids: Vec<String>,
    },
}

impl GatewayCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat { .. } => "joinChat",
            Self::LeaveChat { .. } => "leaveChat",
            Self::SendMessage { .. } => "sendMessage",
            Self::MarkSeen { .. } => "markSeen",
        }
    }
}
