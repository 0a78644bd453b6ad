//! Intents sent from handles to the runtime.

use chatsync_client::{ClientEvent, Contact, ConversationId, Message, UserId};

/// User intent. Engine-internal events (completions, feed traffic, ticks) are
/// produced by the runtime itself and cannot be injected through a handle.
#[derive(Debug)]
pub(crate) enum Command {
    SignIn(UserId),
    SignOut,
    SelectContact(Contact),
    Load { conversation_id: ConversationId, initial: bool },
    AppendOptimistic(Message),
    Send { receiver_id: UserId, content: String, image_url: Option<String> },
    MarkRead,
    LoadContacts,
    SearchContacts(String),
    Shutdown,
}

impl Command {
    /// Engine event for this intent, or `None` for [`Command::Shutdown`].
    pub(crate) fn into_event<I>(self) -> Option<ClientEvent<I>> {
        Some(match self {
            Self::SignIn(user_id) => ClientEvent::SignedIn { user_id },
            Self::SignOut => ClientEvent::SignedOut,
            Self::SelectContact(contact) => ClientEvent::SelectContact(contact),
            Self::Load { conversation_id, initial } => {
                ClientEvent::Load { conversation_id, initial }
            },
            Self::AppendOptimistic(message) => ClientEvent::AppendOptimistic(message),
            Self::Send { receiver_id, content, image_url } => {
                ClientEvent::Send { receiver_id, content, image_url }
            },
            Self::MarkRead => ClientEvent::MarkRead,
            Self::LoadContacts => ClientEvent::LoadContacts,
            Self::SearchContacts(term) => ClientEvent::SearchContacts { term },
            Self::Shutdown => return None,
        })
    }
}
