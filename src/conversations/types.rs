//! JSON shapes shared by the API server and the conversation client.

use crate::orm::{messages, users};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A member of a conversation as seen by the viewer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: i32,
    pub name: String,
    /// Only populated for the viewer's own entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Participant {
    pub fn from_user(user: users::Model, viewer_id: i32) -> Self {
        Self {
            email: (user.id == viewer_id).then(|| user.email),
            avatar: user.avatar_key.map(|key| crate::web::uploads::upload_url(&key)),
            id: user.id,
            name: user.name,
        }
    }
}

/// Denormalized snapshot of the newest message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub sent_at: NaiveDateTime,
    pub sender_id: i32,
}

impl From<messages::Model> for LastMessage {
    fn from(message: messages::Model) -> Self {
        Self {
            content: message.content,
            sent_at: message.sent_at,
            sender_id: message.sender_id,
        }
    }
}

/// Conversation record as returned by `GET /api/conversations`.
///
/// Optional fields default when absent so that older or partial server
/// responses still decode; a missing `unreadCount` counts as zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: i32,
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub is_archived: Option<bool>,
    #[serde(default)]
    pub property_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A single message in a conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i32,
    pub conversation_id: i32,
    pub sender_id: i32,
    pub content: String,
    pub sent_at: NaiveDateTime,
    pub is_read: bool,
    pub read_at: Option<NaiveDateTime>,
}

impl From<messages::Model> for Message {
    fn from(message: messages::Model) -> Self {
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            content: message.content,
            sent_at: message.sent_at,
            is_read: message.is_read,
            read_at: message.read_at,
        }
    }
}

/// Pushed to the other participants whenever a message is appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageEvent {
    pub conversation_id: i32,
    pub message_id: i32,
    pub sender_id: i32,
    pub content: String,
    pub sent_at: NaiveDateTime,
}

impl From<&messages::Model> for NewMessageEvent {
    fn from(message: &messages::Model) -> Self {
        Self {
            conversation_id: message.conversation_id,
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            sent_at: message.sent_at,
        }
    }
}
