//! Simulated clients wired to a shared [`SimServer`].

use chatsync_app::{ChatHandle, Runtime, RuntimeConfig, RuntimeError};
use chatsync_client::{ClientConfig, Contact, Snapshot};
use tokio::task::JoinHandle;

use crate::{InvariantRegistry, SimServer, SystemSnapshot};

/// One running client: its handle and the runtime task.
#[derive(Debug)]
pub struct SimClient {
    /// Label used in invariant reports.
    pub name: String,
    /// Intent and snapshot handle.
    pub handle: ChatHandle,
    task: JoinHandle<()>,
}

impl SimClient {
    /// Start a runtime for `name` against `server` and sign it in.
    ///
    /// Must be called inside a tokio runtime. The client shares the server's
    /// clock, so their timestamps are comparable.
    pub async fn start(server: &SimServer, name: &str) -> Result<Self, RuntimeError> {
        Self::start_with(server, name, ClientConfig::default(), RuntimeConfig::default()).await
    }

    /// [`start`](Self::start) with explicit configuration.
    pub async fn start_with(
        server: &SimServer,
        name: &str,
        client_config: ClientConfig,
        runtime_config: RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let (runtime, handle) = Runtime::new(
            server.env(),
            client_config,
            runtime_config,
            server.clone(),
            server.connect_feed(),
        );
        let task = tokio::spawn(runtime.run());
        handle.sign_in(name).await?;
        Ok(Self { name: name.to_string(), handle, task })
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.handle.snapshot()
    }

    /// Select `contact_id` and wait until its history is loaded.
    pub async fn open(&self, contact_id: &str) -> Result<Snapshot, RuntimeError> {
        let contact = Contact::new(contact_id, contact_id, format!("{contact_id}@example.com"));
        self.handle.select_contact(contact).await?;
        self.handle
            .wait_for(|s| {
                s.active_contact.as_ref().is_some_and(|c| c.id.as_str() == contact_id)
                    && s.active_conversation_id.is_some()
                    && !s.is_loading
                    && !s.is_initial_load
            })
            .await
    }

    /// Shut the runtime down and wait for it to finish.
    pub async fn stop(self) -> Result<(), RuntimeError> {
        self.handle.shutdown().await?;
        self.task.await.map_err(|_| RuntimeError::Closed)
    }
}

/// Check `registry` against every client, panicking on violation.
pub fn assert_invariants(registry: &InvariantRegistry, clients: &[&SimClient], context: &str) {
    let mut system = SystemSnapshot::empty();
    for client in clients {
        system.add_client(client.name.clone(), client.snapshot());
    }
    registry.assert_all(&system, context);
}
