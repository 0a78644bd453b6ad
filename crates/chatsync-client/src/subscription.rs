//! Change-feed subscriptions and presence.
//!
//! Owns the lifecycle of at most one conversation feed and the long-lived
//! presence channel, and the online-user map presence traffic builds.
//!
//! # Conversation feed
//!
//! ```text
//! Unsubscribed --open--> Subscribing --Subscribed--> Subscribed
//!      ^                   ^    |                        |
//!      |                   |    +-------close------------+---> Unsubscribed
//!      |                   +---- Errored / Closed -------+
//! ```
//!
//! Opening a feed always tears down the previous one first, and every open
//! allocates a fresh [`SubscriptionId`], so traffic from a torn-down feed is
//! recognizable and dropped. Reconnecting is the transport's job: an errored
//! subscription waits in `Subscribing` for the next `Subscribed` ack, and that
//! ack asks for a refresh to cover events missed during the gap.

use std::collections::HashMap;

use chatsync_core::{ConversationId, UserId};

use crate::event::{ChannelStatus, ClientAction, PresenceEvent, SubscriptionId};

/// Conversation feed state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FeedState {
    /// No feed open.
    #[default]
    Unsubscribed,
    /// Subscribe requested, waiting for the ack.
    Subscribing {
        /// Subscription id.
        subscription: SubscriptionId,
        /// Filter.
        conversation_id: ConversationId,
        /// The feed was live before and dropped; events may have been missed.
        resumed: bool,
    },
    /// Feed is live.
    Subscribed {
        /// Subscription id.
        subscription: SubscriptionId,
        /// Filter.
        conversation_id: ConversationId,
    },
}

/// Presence channel state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresenceState {
    /// Not joined.
    #[default]
    Left,
    /// Join requested or reconnecting.
    Joining,
    /// Channel is live.
    Joined,
}

/// What a conversation feed status change means for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusOutcome {
    /// Status for a feed that is no longer current, or no state change.
    Ignored,
    /// The feed is live. `refresh` is set when it came back after a drop.
    Live {
        /// Conversation to refresh to cover the gap.
        refresh: Option<ConversationId>,
    },
    /// The live feed dropped; the transport is reconnecting.
    Interrupted,
}

/// Subscription manager.
#[derive(Debug, Default)]
pub struct Subscriptions {
    feed: FeedState,
    next_subscription: u64,
    presence: PresenceState,
    online: HashMap<UserId, bool>,
}

impl Subscriptions {
    /// Create a manager with nothing open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current conversation feed state.
    pub fn feed(&self) -> &FeedState {
        &self.feed
    }

    /// Online flag per user id seen on the presence channel.
    pub fn online_users(&self) -> &HashMap<UserId, bool> {
        &self.online
    }

    /// True if presence last reported `user` as connected.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.get(user).copied().unwrap_or(false)
    }

    /// Open a feed for `conversation_id`, tearing down the current one.
    pub fn open(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        let mut actions: Vec<ClientAction> = self.close().into_iter().collect();

        let subscription = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;

        self.feed = FeedState::Subscribing {
            subscription,
            conversation_id: conversation_id.clone(),
            resumed: false,
        };
        actions.push(ClientAction::Subscribe { subscription, conversation_id });
        actions
    }

    /// Tear down the current feed, if any.
    pub fn close(&mut self) -> Option<ClientAction> {
        match std::mem::take(&mut self.feed) {
            FeedState::Unsubscribed => None,
            FeedState::Subscribing { subscription, .. }
            | FeedState::Subscribed { subscription, .. } => {
                Some(ClientAction::Unsubscribe { subscription })
            },
        }
    }

    /// Apply a status change reported for `subscription`.
    pub fn on_status(
        &mut self,
        subscription: SubscriptionId,
        status: ChannelStatus,
    ) -> StatusOutcome {
        match (&self.feed, status) {
            (
                FeedState::Subscribing { subscription: current, conversation_id, resumed },
                ChannelStatus::Subscribed,
            ) if *current == subscription => {
                let refresh = resumed.then(|| conversation_id.clone());
                let conversation_id = conversation_id.clone();
                self.feed = FeedState::Subscribed { subscription, conversation_id };
                StatusOutcome::Live { refresh }
            },
            (
                FeedState::Subscribed { subscription: current, conversation_id },
                ChannelStatus::Errored | ChannelStatus::Closed,
            ) if *current == subscription => {
                self.feed = FeedState::Subscribing {
                    subscription,
                    conversation_id: conversation_id.clone(),
                    resumed: true,
                };
                StatusOutcome::Interrupted
            },
            _ => StatusOutcome::Ignored,
        }
    }

    /// True if an insert tagged with `subscription` belongs to the current
    /// feed and matches its filter.
    pub fn accepts_insert(
        &self,
        subscription: SubscriptionId,
        conversation_id: &ConversationId,
    ) -> bool {
        match &self.feed {
            FeedState::Subscribing { subscription: current, conversation_id: filter, .. }
            | FeedState::Subscribed { subscription: current, conversation_id: filter } => {
                *current == subscription && filter == conversation_id
            },
            FeedState::Unsubscribed => false,
        }
    }

    /// Open the presence channel for `user_id`.
    pub fn join_presence(&mut self, user_id: UserId) -> ClientAction {
        self.presence = PresenceState::Joining;
        ClientAction::JoinPresence { user_id }
    }

    /// Close the presence channel and forget who is online.
    pub fn leave_presence(&mut self) -> Option<ClientAction> {
        self.online.clear();
        match std::mem::take(&mut self.presence) {
            PresenceState::Left => None,
            PresenceState::Joining | PresenceState::Joined => Some(ClientAction::LeavePresence),
        }
    }

    /// Apply a presence channel status change.
    ///
    /// Returns true when the channel just became live and we should announce
    /// ourselves. Every ack announces, so a reconnect re-announces.
    pub fn on_presence_status(&mut self, status: ChannelStatus) -> bool {
        match (self.presence, status) {
            (PresenceState::Left, _) => false,
            (_, ChannelStatus::Subscribed) => {
                self.presence = PresenceState::Joined;
                true
            },
            (_, ChannelStatus::Errored | ChannelStatus::Closed) => {
                self.presence = PresenceState::Joining;
                false
            },
        }
    }

    /// Apply presence traffic. Returns users that were just seen connected.
    ///
    /// A sync replaces the known set: users absent from it are marked offline.
    pub fn apply_presence(&mut self, event: PresenceEvent) -> Vec<UserId> {
        if self.presence == PresenceState::Left {
            return Vec::new();
        }
        match event {
            PresenceEvent::Sync(online) => {
                for flag in self.online.values_mut() {
                    *flag = false;
                }
                for user in &online {
                    self.online.insert(user.clone(), true);
                }
                online
            },
            PresenceEvent::Join(user) => {
                self.online.insert(user.clone(), true);
                vec![user]
            },
            PresenceEvent::Leave(user) => {
                self.online.insert(user, false);
                Vec::new()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscribe_id(actions: &[ClientAction]) -> SubscriptionId {
        actions
            .iter()
            .find_map(|a| match a {
                ClientAction::Subscribe { subscription, .. } => Some(*subscription),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn open_tears_down_previous_feed_first() {
        let mut subs = Subscriptions::new();
        let first = subscribe_id(&subs.open("c1".into()));

        let actions = subs.open("c2".into());

        assert_eq!(actions[0], ClientAction::Unsubscribe { subscription: first });
        assert!(matches!(
            &actions[1],
            ClientAction::Subscribe { conversation_id, .. } if conversation_id.as_str() == "c2"
        ));
    }

    #[test]
    fn ack_for_torn_down_feed_is_ignored() {
        let mut subs = Subscriptions::new();
        let old = subscribe_id(&subs.open("c1".into()));
        subs.open("c2".into());

        assert_eq!(subs.on_status(old, ChannelStatus::Subscribed), StatusOutcome::Ignored);
        assert!(!subs.accepts_insert(old, &"c1".into()));
    }

    #[test]
    fn first_ack_does_not_refresh() {
        let mut subs = Subscriptions::new();
        let id = subscribe_id(&subs.open("c1".into()));

        assert_eq!(subs.on_status(id, ChannelStatus::Subscribed), StatusOutcome::Live {
            refresh: None
        });
        assert!(matches!(subs.feed(), FeedState::Subscribed { .. }));
    }

    #[test]
    fn reconnect_ack_requests_gap_refresh() {
        let mut subs = Subscriptions::new();
        let id = subscribe_id(&subs.open("c1".into()));
        subs.on_status(id, ChannelStatus::Subscribed);

        assert_eq!(subs.on_status(id, ChannelStatus::Errored), StatusOutcome::Interrupted);
        assert_eq!(subs.on_status(id, ChannelStatus::Errored), StatusOutcome::Ignored);
        assert_eq!(subs.on_status(id, ChannelStatus::Subscribed), StatusOutcome::Live {
            refresh: Some("c1".into())
        });
    }

    #[test]
    fn insert_must_match_subscription_and_filter() {
        let mut subs = Subscriptions::new();
        let id = subscribe_id(&subs.open("c1".into()));

        assert!(subs.accepts_insert(id, &"c1".into()));
        assert!(!subs.accepts_insert(id, &"c2".into()));

        subs.close();
        assert!(!subs.accepts_insert(id, &"c1".into()));
    }

    #[test]
    fn sync_then_leave_marks_user_offline() {
        let mut subs = Subscriptions::new();
        subs.join_presence("me".into());

        subs.apply_presence(PresenceEvent::Sync(vec!["x".into()]));
        assert!(subs.is_online(&"x".into()));

        subs.apply_presence(PresenceEvent::Leave("x".into()));
        assert_eq!(subs.online_users().get(&"x".into()), Some(&false));
    }

    #[test]
    fn sync_replaces_known_set() {
        let mut subs = Subscriptions::new();
        subs.join_presence("me".into());
        subs.apply_presence(PresenceEvent::Join("x".into()));

        subs.apply_presence(PresenceEvent::Sync(vec!["y".into()]));

        assert!(!subs.is_online(&"x".into()));
        assert!(subs.is_online(&"y".into()));
    }

    #[test]
    fn every_presence_ack_announces() {
        let mut subs = Subscriptions::new();
        subs.join_presence("me".into());

        assert!(subs.on_presence_status(ChannelStatus::Subscribed));
        assert!(!subs.on_presence_status(ChannelStatus::Errored));
        assert!(subs.on_presence_status(ChannelStatus::Subscribed));

        assert_eq!(subs.leave_presence(), Some(ClientAction::LeavePresence));
        assert!(!subs.on_presence_status(ChannelStatus::Subscribed));
    }
}
