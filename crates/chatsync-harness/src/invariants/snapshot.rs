//! Observable state snapshots for invariant checking.
//!
//! Invariants operate on copies of published state rather than live engines,
//! so a check always sees one consistent point in time.

use chatsync_client::Snapshot;

/// Snapshot of every simulated client.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-client state.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no clients).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single client.
    pub fn single(name: impl Into<String>, state: Snapshot) -> Self {
        Self { clients: vec![ClientSnapshot { name: name.into(), state }] }
    }

    /// Add a client snapshot.
    pub fn add_client(&mut self, name: impl Into<String>, state: Snapshot) {
        self.clients.push(ClientSnapshot { name: name.into(), state });
    }
}

/// One client's published state.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// Label used in violation messages.
    pub name: String,
    /// Published engine state.
    pub state: Snapshot,
}
