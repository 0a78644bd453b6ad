//! Client
//!
//! Action-based chat synchronization engine. Reconciles optimistic sends,
//! paginated history and change-feed notifications into one consistent,
//! chronologically ordered timeline for the active conversation.
//!
//! # Architecture
//!
//! The engine is Sans-IO. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute. Network calls leave the engine as
//! [`ClientAction::Request`] and come back as [`ClientEvent::Completed`], so
//! responses may arrive in any order; a freshness check at the head of every
//! completion handler discards results for abandoned contacts.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine owning the active conversation
//! - [`Resolver`]: Get-or-create of the canonical conversation per pair
//! - [`Timeline`]: Ordered message list with optimistic entries
//! - `Subscriptions`: Conversation feed lifecycle and the online-user map
//! - [`Roster`]: Contact list, previews and the derived sort/activity view
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides
//! [`transport::HttpTransport`], a REST client for the chat backend.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod api;
mod client;
mod config;
mod event;
mod resolver;
mod roster;
mod state;
mod subscription;
mod timeline;

#[cfg(feature = "transport")]
pub mod transport;

pub use api::{ApiRequest, ApiResponse, RequestKind};
pub use chatsync_core::{
    ApiError, Contact, Conversation, ConversationId, Environment, Message, MessageId, MessagePage,
    NewMessage, Pagination, ParticipantPair, UserId,
};
pub use client::Client;
pub use config::ClientConfig;
pub use event::{
    ChannelStatus, ClientAction, ClientEvent, FeedEvent, Notice, PresenceAnnouncement,
    PresenceEvent, SendFailure, SubscriptionId, Ticket,
};
pub use resolver::{Resolver, Stage, Step};
pub use roster::{Roster, RosterEntry, is_active, sort_entries};
pub use state::Snapshot;
pub use subscription::FeedState;
pub use timeline::Timeline;
