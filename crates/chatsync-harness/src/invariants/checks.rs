//! Standard invariant checks.

use std::collections::HashSet;

use chatsync_client::sort_entries;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Timeline is sorted by `(created_at, id)`.
pub struct TimelineOrdered;

impl Invariant for TimelineOrdered {
    fn name(&self) -> &'static str {
        "TimelineOrdered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for pair in client.state.messages.windows(2) {
                if (pair[0].created_at, &pair[0].id) > (pair[1].created_at, &pair[1].id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "client {}: {} ({}) before {} ({})",
                            client.name,
                            pair[0].id,
                            pair[0].created_at,
                            pair[1].id,
                            pair[1].created_at
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// No message id appears twice in a timeline.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "UniqueMessageIds"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            for message in &client.state.messages {
                if !seen.insert(&message.id) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("client {}: duplicate id {}", client.name, message.id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every timeline entry belongs to the active conversation, and there is no
/// timeline without one.
pub struct TimelineScopedToConversation;

impl Invariant for TimelineScopedToConversation {
    fn name(&self) -> &'static str {
        "TimelineScopedToConversation"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let active = client.state.active_conversation_id.as_ref();
            if let Some(stray) =
                client.state.messages.iter().find(|m| Some(&m.conversation_id) != active)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: message {} of {} shown while {:?} is active",
                        client.name, stray.id, stray.conversation_id, active
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Provisional entries are always our own.
pub struct ProvisionalFromSelf;

impl Invariant for ProvisionalFromSelf {
    fn name(&self) -> &'static str {
        "ProvisionalFromSelf"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let user = client.state.user_id.as_ref();
            if let Some(foreign) = client
                .state
                .messages
                .iter()
                .find(|m| m.is_provisional() && Some(&m.sender_id) != user)
            {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "client {}: provisional {} from {}",
                        client.name, foreign.id, foreign.sender_id
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The roster never lists the signed-in user.
pub struct RosterExcludesSelf;

impl Invariant for RosterExcludesSelf {
    fn name(&self) -> &'static str {
        "RosterExcludesSelf"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let Some(user) = &client.state.user_id else {
                continue;
            };
            if client.state.contact(user).is_some() {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: roster lists {user}", client.name),
                });
            }
        }
        Ok(())
    }
}

/// The roster view is in display order.
pub struct RosterOrdered;

impl Invariant for RosterOrdered {
    fn name(&self) -> &'static str {
        "RosterOrdered"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut sorted = client.state.contacts.clone();
            sort_entries(&mut sorted);
            if sorted != client.state.contacts {
                let order: Vec<&str> =
                    client.state.contacts.iter().map(|e| e.contact.id.as_str()).collect();
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("client {}: roster out of order {order:?}", client.name),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chatsync_client::{Message, MessageId, Snapshot};
    use chrono::{TimeZone, Utc};

    use super::*;

    fn message(id: &str, secs: u32) -> Message {
        Message {
            id: MessageId::server(id),
            conversation_id: "c1".into(),
            sender_id: "bob".into(),
            content: id.to_string(),
            image_url: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, secs).unwrap(),
            is_read: false,
        }
    }

    fn with_messages(messages: Vec<Message>) -> SystemSnapshot {
        SystemSnapshot::single("ana", Snapshot {
            user_id: Some("ana".into()),
            active_conversation_id: Some("c1".into()),
            messages,
            ..Snapshot::default()
        })
    }

    #[test]
    fn out_of_order_timeline_is_flagged() {
        let state = with_messages(vec![message("m2", 2), message("m1", 1)]);
        assert!(TimelineOrdered.check(&state).is_err());
        assert!(TimelineOrdered.check(&with_messages(vec![message("m1", 1)])).is_ok());
    }

    #[test]
    fn duplicate_ids_are_flagged() {
        let state = with_messages(vec![message("m1", 1), message("m1", 1)]);
        assert!(UniqueMessageIds.check(&state).is_err());
    }

    #[test]
    fn foreign_conversation_rows_are_flagged() {
        let mut stray = message("m1", 1);
        stray.conversation_id = "c2".into();
        assert!(TimelineScopedToConversation.check(&with_messages(vec![stray])).is_err());
    }

    #[test]
    fn foreign_provisional_is_flagged() {
        let mut provisional = message("m1", 1);
        provisional.id = MessageId::Provisional(0);
        assert!(ProvisionalFromSelf.check(&with_messages(vec![provisional])).is_err());
    }
}
