//! Wire model shared with the REST backend.
//!
//! These structures mirror the JSON the backend returns. Fields the backend
//! may omit are `Option` with `#[serde(default)]` so partial payloads decode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConversationId, MessageId, UserId};

/// A user the signed-in user can chat with.
///
/// `last_message` and `last_message_time` are derived by the client (latest
/// message preview) and never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// User identifier.
    pub id: UserId,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Avatar image location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Last time the user was seen connected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Content of the latest message exchanged with this contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Timestamp of the latest message exchanged with this contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,
}

impl Contact {
    /// Contact with no timestamps or preview.
    pub fn new(
        id: impl Into<UserId>,
        full_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            full_name: full_name.into(),
            email: email.into(),
            avatar_url: None,
            last_seen: None,
            last_message: None,
            last_message_time: None,
        }
    }

    /// Most recent of `last_message_time` and `last_seen`.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message_time.max(self.last_seen)
    }
}

/// A text or image message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned or provisional identifier.
    pub id: MessageId,
    /// Conversation the message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text content (may be empty for image-only messages).
    #[serde(default)]
    pub content: String,
    /// Attached image location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Creation time. Timelines are ordered by this field.
    pub created_at: DateTime<Utc>,
    /// Whether the recipient has read the message.
    #[serde(default)]
    pub is_read: bool,
}

impl Message {
    /// Build a provisional (optimistic) message.
    pub fn provisional(
        seq: u64,
        conversation_id: ConversationId,
        sender_id: UserId,
        content: String,
        image_url: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::Provisional(seq),
            conversation_id,
            sender_id,
            content,
            image_url,
            created_at,
            is_read: false,
        }
    }

    /// True if this entry has not been confirmed by the server.
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }
}

/// Body of a persist-message request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Text content.
    pub content: String,
    /// Attached image location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Canonical thread between exactly two participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned identifier.
    pub id: ConversationId,
    /// Both participants.
    #[serde(default, alias = "participants")]
    pub participant_ids: Vec<UserId>,
}

/// Pagination metadata accompanying a message page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number.
    #[serde(default)]
    pub page: u32,
    /// Page size requested.
    #[serde(default)]
    pub limit: u32,
    /// Total messages in the conversation, if the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// One page of conversation history.
///
/// The server does not guarantee any order within `messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    /// Messages in server order.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Pagination metadata.
    #[serde(default)]
    pub pagination: Pagination,
}

impl MessagePage {
    /// Newest message by `created_at`, regardless of server order.
    pub fn newest(&self) -> Option<&Message> {
        self.messages.iter().max_by_key(|m| m.created_at)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn message_decodes_with_optional_fields_missing() {
        let json = r#"{
            "id": "m1",
            "conversation_id": "c1",
            "sender_id": "u1",
            "content": "hi",
            "created_at": "2024-05-01T10:00:00Z"
        }"#;

        let message: Message = serde_json::from_str(json).unwrap();

        assert_eq!(message.id, MessageId::server("m1"));
        assert_eq!(message.image_url, None);
        assert!(!message.is_read);
        assert!(!message.is_provisional());
    }

    #[test]
    fn conversation_accepts_participants_alias() {
        let json = r#"{"id": "c9", "participants": ["a", "b"]}"#;
        let conversation: Conversation = serde_json::from_str(json).unwrap();

        assert_eq!(conversation.id, ConversationId::from("c9"));
        assert_eq!(conversation.participant_ids, vec![UserId::from("a"), UserId::from("b")]);
    }

    #[test]
    fn last_activity_takes_the_later_timestamp() {
        let mut contact = Contact::new("u1", "Ana", "ana@example.com");
        assert_eq!(contact.last_activity(), None);

        let seen = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let messaged = Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap();

        contact.last_seen = Some(seen);
        assert_eq!(contact.last_activity(), Some(seen));

        contact.last_message_time = Some(messaged);
        assert_eq!(contact.last_activity(), Some(messaged));
    }

    #[test]
    fn page_newest_ignores_server_order() {
        let at = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();
        let message = |id: &str, h| Message {
            id: MessageId::server(id),
            conversation_id: "c1".into(),
            sender_id: "u1".into(),
            content: id.to_string(),
            image_url: None,
            created_at: at(h),
            is_read: false,
        };

        let page = MessagePage {
            messages: vec![message("b", 9), message("c", 12), message("a", 8)],
            pagination: Pagination::default(),
        };

        assert_eq!(page.newest().map(|m| m.content.as_str()), Some("c"));
    }
}
