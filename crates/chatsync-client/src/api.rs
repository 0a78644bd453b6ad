//! Backend requests and responses.
//!
//! The engine never talks to the network; it describes the call it needs as an
//! [`ApiRequest`] and the caller feeds the outcome back as an [`ApiResponse`].

use chatsync_core::{
    ApiError, Contact, Conversation, ConversationId, Message, MessagePage, NewMessage,
    ParticipantPair, UserId,
};

/// A REST call the engine wants performed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiRequest {
    /// `GET /conversations/between/{user_a}/{user_b}`
    FindConversation {
        /// First participant.
        user_a: UserId,
        /// Second participant.
        user_b: UserId,
    },

    /// `POST /conversations`
    CreateConversation {
        /// Both participants.
        participants: ParticipantPair,
    },

    /// `GET /messages/conversation/{conversation_id}?page&limit`
    FetchMessages {
        /// Conversation to read.
        conversation_id: ConversationId,
        /// 1-based page.
        page: u32,
        /// Page size.
        limit: u32,
    },

    /// `POST /messages`
    PersistMessage(NewMessage),

    /// `PATCH /messages/{user_id}/read`
    MarkRead {
        /// Reader.
        user_id: UserId,
        /// Conversation whose messages are marked.
        conversation_id: ConversationId,
    },

    /// `GET /users`
    ListUsers,

    /// `GET /users/search?term=`
    SearchUsers {
        /// Search term, already trimmed.
        term: String,
    },
}

impl ApiRequest {
    /// Lookup request for a participant pair.
    pub fn find_conversation(pair: &ParticipantPair) -> Self {
        let [a, b] = pair.members();
        Self::FindConversation { user_a: a.clone(), user_b: b.clone() }
    }

    /// Discriminant without payload.
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::FindConversation { .. } => RequestKind::FindConversation,
            Self::CreateConversation { .. } => RequestKind::CreateConversation,
            Self::FetchMessages { .. } => RequestKind::FetchMessages,
            Self::PersistMessage(_) => RequestKind::PersistMessage,
            Self::MarkRead { .. } => RequestKind::MarkRead,
            Self::ListUsers => RequestKind::ListUsers,
            Self::SearchUsers { .. } => RequestKind::SearchUsers,
        }
    }
}

/// Request discriminant, used for logging and fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// [`ApiRequest::FindConversation`]
    FindConversation,
    /// [`ApiRequest::CreateConversation`]
    CreateConversation,
    /// [`ApiRequest::FetchMessages`]
    FetchMessages,
    /// [`ApiRequest::PersistMessage`]
    PersistMessage,
    /// [`ApiRequest::MarkRead`]
    MarkRead,
    /// [`ApiRequest::ListUsers`]
    ListUsers,
    /// [`ApiRequest::SearchUsers`]
    SearchUsers,
}

/// Decoded body of a successful call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiResponse {
    /// Conversation lookup or creation.
    Conversation(Conversation),
    /// One page of history.
    Messages(MessagePage),
    /// The persisted message.
    Message(Message),
    /// User list or search result.
    Users(Vec<Contact>),
    /// No meaningful body.
    Empty,
}

impl ApiResponse {
    /// Extract a conversation or fail with [`ApiError::Decode`].
    pub fn into_conversation(self) -> Result<Conversation, ApiError> {
        match self {
            Self::Conversation(conversation) => Ok(conversation),
            other => Err(other.mismatch("conversation")),
        }
    }

    /// Extract a message page or fail with [`ApiError::Decode`].
    pub fn into_messages(self) -> Result<MessagePage, ApiError> {
        match self {
            Self::Messages(page) => Ok(page),
            other => Err(other.mismatch("message page")),
        }
    }

    /// Extract a single message or fail with [`ApiError::Decode`].
    pub fn into_message(self) -> Result<Message, ApiError> {
        match self {
            Self::Message(message) => Ok(message),
            other => Err(other.mismatch("message")),
        }
    }

    /// Extract a user list or fail with [`ApiError::Decode`].
    pub fn into_users(self) -> Result<Vec<Contact>, ApiError> {
        match self {
            Self::Users(users) => Ok(users),
            other => Err(other.mismatch("user list")),
        }
    }

    fn mismatch(&self, expected: &str) -> ApiError {
        let got = match self {
            Self::Conversation(_) => "conversation",
            Self::Messages(_) => "message page",
            Self::Message(_) => "message",
            Self::Users(_) => "user list",
            Self::Empty => "empty body",
        };
        ApiError::Decode(format!("expected {expected}, got {got}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_response_is_a_decode_error() {
        let err = ApiResponse::Empty.into_messages().unwrap_err();
        assert_eq!(err, ApiError::Decode("expected message page, got empty body".into()));
    }

    #[test]
    fn lookup_uses_normalized_member_order() {
        let pair = ParticipantPair::new("zoe".into(), "adam".into());
        let request = ApiRequest::find_conversation(&pair);

        assert_eq!(request, ApiRequest::FindConversation {
            user_a: "adam".into(),
            user_b: "zoe".into(),
        });
        assert_eq!(request.kind(), RequestKind::FindConversation);
    }
}
