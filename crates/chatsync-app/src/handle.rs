//! Cloneable front door to a running [`Runtime`](crate::Runtime).

use chatsync_client::{Contact, ConversationId, Message, Notice, Snapshot, UserId};
use tokio::sync::{broadcast, mpsc, watch};

use crate::{command::Command, error::RuntimeError};

/// Handle for UIs and tools.
///
/// Intents are queued to the runtime; their effects become visible through
/// [`snapshot`](Self::snapshot), [`watch`](Self::watch) and
/// [`notices`](Self::notices). Every method fails with
/// [`RuntimeError::Closed`] once the runtime has stopped.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
    notices: broadcast::Sender<Notice>,
}

impl ChatHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<Command>,
        snapshots: watch::Receiver<Snapshot>,
        notices: broadcast::Sender<Notice>,
    ) -> Self {
        Self { commands, snapshots, notices }
    }

    /// Sign in as `user_id`.
    pub async fn sign_in(&self, user_id: impl Into<UserId>) -> Result<(), RuntimeError> {
        self.submit(Command::SignIn(user_id.into())).await
    }

    /// Sign out and drop all session state.
    pub async fn sign_out(&self) -> Result<(), RuntimeError> {
        self.submit(Command::SignOut).await
    }

    /// Make the conversation with `contact` the active one.
    pub async fn select_contact(&self, contact: Contact) -> Result<(), RuntimeError> {
        self.submit(Command::SelectContact(contact)).await
    }

    /// Refresh the active conversation. `initial` shows the loading state.
    pub async fn load(
        &self,
        conversation_id: ConversationId,
        initial: bool,
    ) -> Result<(), RuntimeError> {
        self.submit(Command::Load { conversation_id, initial }).await
    }

    /// Insert a locally created message into the active timeline.
    pub async fn append_optimistic(&self, message: Message) -> Result<(), RuntimeError> {
        self.submit(Command::AppendOptimistic(message)).await
    }

    /// Send a message to the active contact.
    pub async fn send_message(
        &self,
        receiver_id: impl Into<UserId>,
        content: impl Into<String>,
        image_url: Option<String>,
    ) -> Result<(), RuntimeError> {
        let command =
            Command::Send { receiver_id: receiver_id.into(), content: content.into(), image_url };
        self.submit(command).await
    }

    /// Mark the active conversation read.
    pub async fn mark_read(&self) -> Result<(), RuntimeError> {
        self.submit(Command::MarkRead).await
    }

    /// Fetch the contact list.
    pub async fn load_contacts(&self) -> Result<(), RuntimeError> {
        self.submit(Command::LoadContacts).await
    }

    /// Search contacts. A blank term lists everyone.
    pub async fn search_contacts(&self, term: impl Into<String>) -> Result<(), RuntimeError> {
        self.submit(Command::SearchContacts(term.into())).await
    }

    /// Release every channel and stop the runtime.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.submit(Command::Shutdown).await
    }

    /// Latest published state.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver that is notified on every publish.
    pub fn watch(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Subscribe to notices published from now on.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Wait until a published snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&Snapshot) -> bool,
    ) -> Result<Snapshot, RuntimeError> {
        let mut snapshots = self.snapshots.clone();
        let snapshot =
            snapshots.wait_for(predicate).await.map_err(|_| RuntimeError::Closed)?.clone();
        Ok(snapshot)
    }

    async fn submit(&self, command: Command) -> Result<(), RuntimeError> {
        self.commands.send(command).await.map_err(|_| RuntimeError::Closed)
    }
}
