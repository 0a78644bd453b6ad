//! Observable engine state.

use std::collections::HashMap;

use chatsync_core::{Contact, ConversationId, Message, UserId};

use crate::{roster::RosterEntry, subscription::FeedState};

/// Point-in-time copy of everything a UI renders.
///
/// Derived fields (roster order and `active` flags) are computed when the
/// snapshot is taken, so a snapshot taken later may differ without any event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Signed-in user.
    pub user_id: Option<UserId>,
    /// Selected contact.
    pub active_contact: Option<Contact>,
    /// Conversation resolved for the selected contact.
    pub active_conversation_id: Option<ConversationId>,
    /// Timeline of the active conversation, oldest first.
    pub messages: Vec<Message>,
    /// A spinner-visible load is in progress.
    pub is_loading: bool,
    /// No load has been accepted since the contact was selected.
    pub is_initial_load: bool,
    /// Online flags from the presence channel.
    pub online_users: HashMap<UserId, bool>,
    /// Sorted roster.
    pub contacts: Vec<RosterEntry>,
    /// A roster fetch is in progress.
    pub contacts_loading: bool,
    /// Conversation feed state.
    pub feed: FeedState,
}

impl Snapshot {
    /// Roster row for `contact_id`.
    pub fn contact(&self, contact_id: &UserId) -> Option<&RosterEntry> {
        self.contacts.iter().find(|entry| &entry.contact.id == contact_id)
    }

    /// Messages whose content equals `content`.
    pub fn messages_with_content<'a>(
        &'a self,
        content: &'a str,
    ) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages.iter().filter(move |m| m.content == content)
    }
}
