//! Core types for chatsync
//!
//! Shared vocabulary for every layer of the chat synchronization engine: the
//! wire model exchanged with the REST backend, the [`env::Environment`]
//! abstraction that decouples engine logic from clocks, and the [`ApiError`]
//! taxonomy that every collaborator reports failures with.
//!
//! # Components
//!
//! - [`ids`]: Strongly-typed identifiers (users, conversations, messages)
//! - [`model`]: Contacts, messages, conversations and message pages
//! - [`env`]: Time abstraction for deterministic simulation
//! - [`error`]: Failure classification for network and server errors

#![forbid(unsafe_code)]

pub mod env;
pub mod error;
pub mod ids;
pub mod model;

pub use env::Environment;
pub use error::ApiError;
pub use ids::{ConversationId, MessageId, ParticipantPair, UserId};
pub use model::{Contact, Conversation, Message, MessagePage, NewMessage, Pagination};
