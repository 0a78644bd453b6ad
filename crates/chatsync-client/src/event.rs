//! Client events and actions.

use std::fmt;

use chatsync_core::{ApiError, Contact, ConversationId, Message, UserId};
use chrono::{DateTime, Utc};

use crate::api::{ApiRequest, ApiResponse};

/// Correlates a [`ClientAction::Request`] with its [`ClientEvent::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies one conversation feed subscription.
///
/// A fresh id is allocated on every subscribe, so events from a torn-down
/// subscription can never be mistaken for events of its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

/// Connection status reported by the change-feed for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Channel is established and delivering events.
    Subscribed,
    /// Channel was closed by the server or the connection dropped.
    Closed,
    /// Channel failed; the transport is reconnecting.
    Errored,
}

/// Presence channel payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    /// Full set of currently connected users.
    Sync(Vec<UserId>),
    /// A user connected.
    Join(UserId),
    /// A user disconnected.
    Leave(UserId),
}

/// Inbound change-feed traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// Status change of a conversation subscription.
    Status {
        /// Subscription the status belongs to.
        subscription: SubscriptionId,
        /// New status.
        status: ChannelStatus,
    },

    /// A message row was inserted.
    Insert {
        /// Subscription that delivered the event.
        subscription: SubscriptionId,
        /// `conversation_id` of the inserted row.
        conversation_id: ConversationId,
    },

    /// Status change of the presence channel.
    PresenceStatus(ChannelStatus),

    /// Presence update.
    Presence(PresenceEvent),
}

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Executing requests and feeding back their outcome
/// - Forwarding change-feed and presence traffic
/// - Driving time forward via ticks
/// - Forwarding application intents (select contact, send message, etc.)
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (`tokio::time::Instant`) environments.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// A user signed in. Opens the presence channel.
    SignedIn {
        /// Authenticated user.
        user_id: UserId,
    },

    /// The user signed out. Tears down every channel and forgets all state.
    SignedOut,

    /// Switch the active conversation to the one shared with `contact`.
    SelectContact(Contact),

    /// Refresh the timeline of `conversation_id`.
    ///
    /// Ignored unless `conversation_id` is the active conversation.
    Load {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Show the loading spinner while fetching.
        initial: bool,
    },

    /// Append a provisional message to the active timeline.
    AppendOptimistic(Message),

    /// Send a message to the active contact.
    Send {
        /// Recipient; must be the active contact.
        receiver_id: UserId,
        /// Text content.
        content: String,
        /// Attached image location.
        image_url: Option<String>,
    },

    /// Mark the active conversation read (best effort).
    MarkRead,

    /// Reload the full contact list.
    LoadContacts,

    /// Search contacts. A blank term reloads the full list.
    SearchContacts {
        /// Search term.
        term: String,
    },

    /// A request finished.
    Completed {
        /// Ticket from the originating [`ClientAction::Request`].
        ticket: Ticket,
        /// Outcome.
        result: Result<ApiResponse, ApiError>,
    },

    /// Change-feed or presence traffic.
    Feed(FeedEvent),

    /// Time tick for timeout processing and scheduled reconciliation.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// The owner is going away. Releases every channel.
    Teardown,
}

/// Self-announcement sent on the presence channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceAnnouncement {
    /// Announcing user.
    pub user_id: UserId,
    /// Wall-clock time of the announcement.
    pub online_at: DateTime<Utc>,
}

/// Why a send did not end up on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// Nobody is signed in.
    NotSignedIn,
    /// The receiver is not the active contact.
    NoActiveConversation,
    /// The conversation could not be resolved.
    ConversationUnavailable(ApiError),
    /// The active contact changed before the conversation was resolved.
    Superseded,
    /// The persist call failed.
    Rejected(ApiError),
    /// The server acknowledged the message but refreshes never showed it.
    NotConfirmed,
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSignedIn => f.write_str("not signed in"),
            Self::NoActiveConversation => f.write_str("receiver is not the active contact"),
            Self::ConversationUnavailable(err) => write!(f, "conversation unavailable: {err}"),
            Self::Superseded => f.write_str("contact changed before the message was sent"),
            Self::Rejected(err) => write!(f, "{err}"),
            Self::NotConfirmed => f.write_str("message never appeared in the conversation"),
        }
    }
}

/// Recoverable, user-visible failure.
///
/// The engine never returns errors; everything it cannot absorb silently is
/// reported as a notice and the state is left consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// The conversation with `contact_id` could not be resolved. Reselecting the
    /// contact retries.
    ConversationUnavailable {
        /// Contact that was being opened.
        contact_id: UserId,
        /// Underlying failure.
        error: ApiError,
    },

    /// The initial history fetch failed.
    LoadFailed {
        /// Conversation that failed to load.
        conversation_id: ConversationId,
        /// Underlying failure.
        error: ApiError,
    },

    /// A message was not sent.
    SendFailed {
        /// Content of the failed message.
        content: String,
        /// Reason.
        reason: SendFailure,
    },

    /// The contact list could not be fetched.
    ContactsUnavailable {
        /// Underlying failure.
        error: ApiError,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConversationUnavailable { contact_id, error } => {
                write!(f, "conversation with {contact_id} unavailable: {error}")
            },
            Self::LoadFailed { conversation_id, error } => {
                write!(f, "failed to load conversation {conversation_id}: {error}")
            },
            Self::SendFailed { content, reason } => {
                write!(f, "message {content:?} not sent: {reason}")
            },
            Self::ContactsUnavailable { error } => write!(f, "contacts unavailable: {error}"),
        }
    }
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Perform a backend call and report it back as [`ClientEvent::Completed`].
    Request {
        /// Correlation ticket.
        ticket: Ticket,
        /// Call to perform.
        request: ApiRequest,
    },

    /// Open a change-feed subscription for inserts into `conversation_id`.
    Subscribe {
        /// Id to tag the subscription's events with.
        subscription: SubscriptionId,
        /// Filter.
        conversation_id: ConversationId,
    },

    /// Close a change-feed subscription.
    Unsubscribe {
        /// Subscription to close.
        subscription: SubscriptionId,
    },

    /// Open the presence channel.
    JoinPresence {
        /// Signed-in user.
        user_id: UserId,
    },

    /// Close the presence channel.
    LeavePresence,

    /// Announce ourselves on the presence channel.
    Track(PresenceAnnouncement),

    /// Surface a recoverable failure to the user.
    Notify(Notice),

    /// Observable state changed; re-read the snapshot.
    Render,
}
