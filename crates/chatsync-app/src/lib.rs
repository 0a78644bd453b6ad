//! Application runtime for chatsync
//!
//! Drives the Sans-IO [`chatsync_client::Client`] from a single owning task.
//! The engine decides; this crate performs its I/O and feeds the outcomes back
//! in, so the same orchestration runs in production and in simulation.
//!
//! # Components
//!
//! - [`Backend`]: Executes engine requests (REST in production)
//! - [`ChangeFeed`]: Conversation insert feed and presence channel
//! - [`Runtime`]: The actor loop owning the engine
//! - [`ChatHandle`]: Cloneable handle for UIs (intents in, snapshots out)

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod backend;
mod command;
mod config;
mod env;
mod error;
mod feed;
mod handle;
mod runtime;

pub use backend::Backend;
pub use config::RuntimeConfig;
pub use env::SystemEnv;
pub use error::RuntimeError;
pub use feed::{ChangeFeed, DetachedFeed};
pub use handle::ChatHandle;
pub use runtime::Runtime;
