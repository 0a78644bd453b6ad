//! Change-feed abstraction.
//!
//! The engine asks for subscriptions through actions and learns about channel
//! state and traffic through [`FeedEvent`]s. A [`ChangeFeed`] is the transport
//! side of that contract. Commands are fire-and-forget: failures surface later
//! as `Errored` status events, never as return values.

use std::{collections::VecDeque, future::Future};

use chatsync_client::{
    ChannelStatus, ConversationId, FeedEvent, PresenceAnnouncement, PresenceEvent, SubscriptionId,
    UserId,
};
use tracing::debug;

/// Realtime channel transport.
pub trait ChangeFeed: Send + 'static {
    /// Open the insert feed for `conversation_id`, tagging its traffic with
    /// `subscription`.
    fn subscribe(&mut self, subscription: SubscriptionId, conversation_id: ConversationId);

    /// Tear down `subscription`. Later traffic tagged with it may still arrive.
    fn unsubscribe(&mut self, subscription: SubscriptionId);

    /// Open the presence channel keyed by `user_id`.
    fn join_presence(&mut self, user_id: UserId);

    /// Close the presence channel.
    fn leave_presence(&mut self);

    /// Announce ourselves on the presence channel.
    fn track(&mut self, announcement: PresenceAnnouncement);

    /// Next event from any channel.
    ///
    /// Must be cancel safe: the runtime polls it inside `select!`. `None`
    /// means the feed has nothing more to deliver right now.
    fn next_event(&mut self) -> impl Future<Output = Option<FeedEvent>> + Send;
}

/// Feed with no server behind it.
///
/// Acknowledges every subscription and echoes our own presence, but never
/// delivers inserts. Suits one-shot tools and backends without a realtime
/// endpoint; the timeline still converges through explicit loads.
#[derive(Debug, Default)]
pub struct DetachedFeed {
    pending: VecDeque<FeedEvent>,
}

impl DetachedFeed {
    /// Create an idle feed.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeFeed for DetachedFeed {
    fn subscribe(&mut self, subscription: SubscriptionId, _conversation_id: ConversationId) {
        self.pending
            .push_back(FeedEvent::Status { subscription, status: ChannelStatus::Subscribed });
    }

    fn unsubscribe(&mut self, subscription: SubscriptionId) {
        self.pending.retain(|event| {
            !matches!(event, FeedEvent::Status { subscription: s, .. } if *s == subscription)
        });
    }

    fn join_presence(&mut self, user_id: UserId) {
        debug!(user = %user_id, "detached presence join");
        self.pending.push_back(FeedEvent::PresenceStatus(ChannelStatus::Subscribed));
    }

    fn leave_presence(&mut self) {
        self.pending.retain(|event| {
            !matches!(event, FeedEvent::PresenceStatus(_) | FeedEvent::Presence(_))
        });
    }

    fn track(&mut self, announcement: PresenceAnnouncement) {
        self.pending.push_back(FeedEvent::Presence(PresenceEvent::Join(announcement.user_id)));
    }

    async fn next_event(&mut self) -> Option<FeedEvent> {
        match self.pending.pop_front() {
            Some(event) => Some(event),
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn subscribe_is_acknowledged() {
        let mut feed = DetachedFeed::new();
        feed.subscribe(SubscriptionId(3), "c1".into());

        assert_eq!(
            feed.next_event().await,
            Some(FeedEvent::Status {
                subscription: SubscriptionId(3),
                status: ChannelStatus::Subscribed
            })
        );
    }

    #[tokio::test]
    async fn unsubscribe_drops_undelivered_ack() {
        let mut feed = DetachedFeed::new();
        feed.subscribe(SubscriptionId(1), "c1".into());
        feed.unsubscribe(SubscriptionId(1));
        feed.join_presence("me".into());

        assert_eq!(
            feed.next_event().await,
            Some(FeedEvent::PresenceStatus(ChannelStatus::Subscribed))
        );
    }

    #[tokio::test]
    async fn track_echoes_own_presence() {
        let mut feed = DetachedFeed::new();
        feed.track(PresenceAnnouncement { user_id: "me".into(), online_at: Utc::now() });

        assert_eq!(
            feed.next_event().await,
            Some(FeedEvent::Presence(PresenceEvent::Join("me".into())))
        );
    }
}
