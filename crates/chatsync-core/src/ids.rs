//! Strongly-typed identifiers.
//!
//! The backend hands out opaque string identifiers. Wrapping them keeps a
//! user id from being passed where a conversation id is expected, and lets
//! [`MessageId`] distinguish server-assigned ids from client-generated
//! provisional ones.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque user identifier assigned by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque conversation identifier assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    /// Wrap a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the server returned an empty identifier.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Prefix that marks a provisional id in its string form.
const PROVISIONAL_PREFIX: &str = "optimistic-";

/// Message identifier.
///
/// Either the stable id the server assigned on persist, or a provisional id
/// the client generated for an optimistic entry. Provisional ids never reach
/// the server and are superseded once the authoritative record is known.
///
/// Server ids order before provisional ones; timelines use this to break
/// `created_at` ties deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageId {
    /// Server-assigned stable identifier.
    Server(String),
    /// Client-generated placeholder, unique within one engine instance.
    Provisional(u64),
}

impl MessageId {
    /// Wrap a server-assigned identifier.
    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(id.into())
    }

    /// True for client-generated placeholders.
    pub fn is_provisional(&self) -> bool {
        matches!(self, Self::Provisional(_))
    }
}

impl From<String> for MessageId {
    fn from(raw: String) -> Self {
        if let Some(seq) = raw.strip_prefix(PROVISIONAL_PREFIX)
            && let Ok(seq) = seq.parse()
        {
            return Self::Provisional(seq);
        }
        Self::Server(raw)
    }
}

impl From<MessageId> for String {
    fn from(id: MessageId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => f.write_str(id),
            Self::Provisional(seq) => write!(f, "{PROVISIONAL_PREFIX}{seq}"),
        }
    }
}

/// Unordered pair of conversation participants.
///
/// Exactly one conversation exists per pair, so the pair is normalized:
/// `ParticipantPair::new(a, b) == ParticipantPair::new(b, a)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantPair {
    low: UserId,
    high: UserId,
}

impl ParticipantPair {
    /// Normalize two participants into a pair.
    pub fn new(a: UserId, b: UserId) -> Self {
        if a <= b { Self { low: a, high: b } } else { Self { low: b, high: a } }
    }

    /// Both participants in normalized order.
    pub fn members(&self) -> [&UserId; 2] {
        [&self.low, &self.high]
    }

    /// True if `user` is one of the participants.
    pub fn contains(&self, user: &UserId) -> bool {
        &self.low == user || &self.high == user
    }
}
