//! Change feed connected to a [`SimServer`].

use chatsync_app::ChangeFeed;
use chatsync_client::{ConversationId, FeedEvent, PresenceAnnouncement, SubscriptionId, UserId};
use tokio::sync::mpsc;

use crate::SimServer;

/// One client's feed connection. Dropping it disconnects from the server,
/// which also ends the client's presence.
#[derive(Debug)]
pub struct SimFeed {
    server: SimServer,
    id: u64,
    events: mpsc::UnboundedReceiver<FeedEvent>,
}

impl SimFeed {
    pub(crate) fn new(
        server: SimServer,
        id: u64,
        events: mpsc::UnboundedReceiver<FeedEvent>,
    ) -> Self {
        Self { server, id, events }
    }
}

impl ChangeFeed for SimFeed {
    fn subscribe(&mut self, subscription: SubscriptionId, conversation_id: ConversationId) {
        self.server.feed_subscribe(self.id, subscription, conversation_id);
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.server.feed_unsubscribe(self.id, subscription);
    }

    fn join_presence(&mut self, user_id: UserId) {
        self.server.feed_join_presence(self.id, user_id);
    }

    fn leave_presence(&mut self) {
        self.server.feed_leave_presence(self.id);
    }

    fn track(&mut self, announcement: PresenceAnnouncement) {
        self.server.feed_track(self.id, announcement.user_id);
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }
}

impl Drop for SimFeed {
    fn drop(&mut self) {
        self.server.feed_disconnect(self.id);
    }
}
