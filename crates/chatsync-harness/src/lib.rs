//! Deterministic simulation harness for chatsync.
//!
//! Runs the production runtime and engine against an in-memory server on
//! tokio's paused clock, so latency, reordering and failures are reproducible
//! from a seed.
//!
//! # Components
//!
//! - [`SimEnv`]: Virtual monotonic and wall clocks
//! - [`SimServer`]: REST backend, change feed and presence in one process
//! - [`SimFeed`]: A client's feed connection to the server
//! - [`SimClient`]: A running runtime wired to the server
//!
//! # Invariant Testing
//!
//! The `invariants` module checks published client state after every step.
//! Use [`InvariantRegistry::standard()`] for the full set.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_feed;
pub mod sim_server;
pub mod world;

pub use invariants::{
    ClientSnapshot, Invariant, InvariantRegistry, InvariantResult, ProvisionalFromSelf,
    RosterExcludesSelf, RosterOrdered, SystemSnapshot, TimelineOrdered,
    TimelineScopedToConversation, UniqueMessageIds, Violation,
};
pub use sim_env::SimEnv;
pub use sim_feed::SimFeed;
pub use sim_server::{Absence, Fault, SimConfig, SimServer};
pub use world::{SimClient, assert_invariants};
