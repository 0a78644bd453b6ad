//! Contact roster.
//!
//! Holds the last fetched contact list with its message previews. The sorted
//! view and the "active" flag are derived on demand from the contacts, the
//! online-user map and the current time; neither is stored.

use std::{cmp::Ordering, collections::HashMap};

use chatsync_core::{Contact, Message, UserId};
use chrono::{DateTime, TimeDelta, Utc};

/// One row of the derived roster view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    /// Contact with previews applied.
    pub contact: Contact,
    /// Presence reports the contact as connected.
    pub online: bool,
    /// Display heuristic: online, or recently messaged, or recently seen.
    pub active: bool,
}

/// Activity heuristic.
///
/// A contact is active if it is online, its last message is younger than
/// `message_window`, or it was seen within `seen_window`.
pub fn is_active(
    contact: &Contact,
    online: bool,
    now: DateTime<Utc>,
    message_window: TimeDelta,
    seen_window: TimeDelta,
) -> bool {
    let within =
        |at: Option<DateTime<Utc>>, window: TimeDelta| at.is_some_and(|t| now - t <= window);

    online
        || within(contact.last_message_time, message_window)
        || within(contact.last_seen, seen_window)
}

fn roster_order(a: &RosterEntry, b: &RosterEntry) -> Ordering {
    b.online
        .cmp(&a.online)
        .then_with(|| match (a.contact.last_activity(), b.contact.last_activity()) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.contact.full_name.cmp(&b.contact.full_name),
        })
        .then_with(|| a.contact.id.cmp(&b.contact.id))
}

/// Sort roster rows: online first, then most recent activity, then contacts
/// without any timestamp alphabetically by name.
pub fn sort_entries(entries: &mut [RosterEntry]) {
    entries.sort_by(roster_order);
}

/// Contact list state.
#[derive(Debug, Default)]
pub struct Roster {
    contacts: Vec<Contact>,
    loading: bool,
    generation: u64,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Contacts in fetch order.
    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    /// A fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Generation of the newest fetch.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a fetch, superseding any outstanding one. Returns its generation.
    pub fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.loading = true;
        self.generation
    }

    /// Install a fetch result. `self_id` is filtered out.
    ///
    /// Previews already known for a contact are kept. Returns false if the
    /// fetch was superseded.
    pub fn accept(
        &mut self,
        generation: u64,
        contacts: Vec<Contact>,
        self_id: Option<&UserId>,
    ) -> bool {
        if generation != self.generation {
            return false;
        }
        let mut previous: HashMap<UserId, Contact> =
            self.contacts.drain(..).map(|c| (c.id.clone(), c)).collect();

        self.contacts = contacts
            .into_iter()
            .filter(|c| Some(&c.id) != self_id)
            .map(|mut contact| {
                if let Some(old) = previous.remove(&contact.id) {
                    contact.last_message = contact.last_message.or(old.last_message);
                    contact.last_message_time = contact.last_message_time.or(old.last_message_time);
                    contact.last_seen = contact.last_seen.max(old.last_seen);
                }
                contact
            })
            .collect();
        self.loading = false;
        true
    }

    /// Record a failed fetch: the list is cleared. Returns false if the fetch
    /// was superseded.
    pub fn fail(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }
        self.contacts.clear();
        self.loading = false;
        true
    }

    /// Set the last-message preview of `contact_id`.
    ///
    /// An older message never replaces a newer preview. Returns true if the
    /// preview changed.
    pub fn set_preview(&mut self, contact_id: &UserId, message: &Message) -> bool {
        let Some(contact) = self.contacts.iter_mut().find(|c| &c.id == contact_id) else {
            return false;
        };
        if contact.last_message_time.is_some_and(|t| t > message.created_at) {
            return false;
        }
        let content = preview_text(message);
        if contact.last_message_time == Some(message.created_at)
            && contact.last_message.as_deref() == Some(content.as_str())
        {
            return false;
        }
        contact.last_message = Some(content);
        contact.last_message_time = Some(message.created_at);
        true
    }

    /// Mark `users` as seen at `now`. Returns true if any contact changed.
    pub fn mark_seen(&mut self, users: &[UserId], now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for contact in self.contacts.iter_mut().filter(|c| users.contains(&c.id)) {
            contact.last_seen = Some(now);
            changed = true;
        }
        changed
    }

    /// Forget every contact and supersede outstanding fetches.
    pub fn clear(&mut self) {
        self.contacts.clear();
        self.loading = false;
        self.generation += 1;
    }

    /// Sorted view with derived online and active flags.
    pub fn view(
        &self,
        online: &HashMap<UserId, bool>,
        now: DateTime<Utc>,
        message_window: TimeDelta,
        seen_window: TimeDelta,
    ) -> Vec<RosterEntry> {
        let mut entries: Vec<RosterEntry> = self
            .contacts
            .iter()
            .map(|contact| {
                let online = online.get(&contact.id).copied().unwrap_or(false);
                RosterEntry {
                    active: is_active(contact, online, now, message_window, seen_window),
                    online,
                    contact: contact.clone(),
                }
            })
            .collect();
        sort_entries(&mut entries);
        entries
    }
}

fn preview_text(message: &Message) -> String {
    if message.content.is_empty() && message.image_url.is_some() {
        "[image]".to_string()
    } else {
        message.content.clone()
    }
}

#[cfg(test)]
mod tests {
    use chatsync_core::MessageId;
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, name: &str, online: bool) -> RosterEntry {
        RosterEntry { contact: Contact::new(id, name, ""), online, active: online }
    }

    fn message(content: &str, created_at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::server("m"),
            conversation_id: "c".into(),
            sender_id: "u".into(),
            content: content.to_string(),
            image_url: None,
            created_at,
            is_read: false,
        }
    }

    #[test]
    fn online_then_recent_then_alphabetical() {
        let mut seen = entry("1", "Zed", false);
        seen.contact.last_seen = Some(now());
        let mut entries = vec![
            entry("4", "Bob", false),
            entry("3", "Ana", false),
            seen,
            entry("2", "Yan", true),
        ];

        sort_entries(&mut entries);

        let order: Vec<&str> = entries.iter().map(|e| e.contact.id.as_str()).collect();
        assert_eq!(order, ["2", "1", "3", "4"]);
    }

    #[test]
    fn newer_activity_sorts_first() {
        let mut old = entry("old", "A", false);
        old.contact.last_message_time = Some(now() - TimeDelta::hours(2));
        let mut new = entry("new", "B", false);
        new.contact.last_seen = Some(now() - TimeDelta::minutes(1));
        let mut entries = vec![old, new];

        sort_entries(&mut entries);

        assert_eq!(entries[0].contact.id.as_str(), "new");
    }

    #[test]
    fn activity_windows() {
        let mut contact = Contact::new("1", "A", "");
        let (messages, seen) = (TimeDelta::minutes(30), TimeDelta::minutes(5));

        assert!(!is_active(&contact, false, now(), messages, seen));
        assert!(is_active(&contact, true, now(), messages, seen));

        contact.last_seen = Some(now() - TimeDelta::minutes(6));
        assert!(!is_active(&contact, false, now(), messages, seen));

        contact.last_message_time = Some(now() - TimeDelta::minutes(29));
        assert!(is_active(&contact, false, now(), messages, seen));
    }

    #[test]
    fn accept_filters_self_and_keeps_previews() {
        let mut roster = Roster::new();
        let generation = roster.begin();
        let contacts = vec![Contact::new("me", "Me", ""), Contact::new("b", "B", "")];
        roster.accept(generation, contacts, Some(&"me".into()));
        roster.set_preview(&"b".into(), &message("hey", now()));

        let generation = roster.begin();
        assert!(roster.accept(generation, vec![Contact::new("b", "B", "")], Some(&"me".into())));

        assert_eq!(roster.contacts().len(), 1);
        assert_eq!(roster.contacts()[0].last_message.as_deref(), Some("hey"));
    }

    #[test]
    fn superseded_fetch_is_ignored() {
        let mut roster = Roster::new();
        let stale = roster.begin();
        let current = roster.begin();

        assert!(!roster.accept(stale, vec![Contact::new("a", "A", "")], None));
        assert!(roster.is_loading());
        assert!(roster.fail(current));
        assert!(!roster.is_loading());
    }

    #[test]
    fn older_preview_never_replaces_newer() {
        let mut roster = Roster::new();
        let generation = roster.begin();
        roster.accept(generation, vec![Contact::new("b", "B", "")], None);

        assert!(roster.set_preview(&"b".into(), &message("new", now())));
        assert!(!roster.set_preview(&"b".into(), &message("old", now() - TimeDelta::minutes(1))));
        assert_eq!(roster.contacts()[0].last_message.as_deref(), Some("new"));
    }

    #[test]
    fn view_derives_flags() {
        let mut roster = Roster::new();
        let generation = roster.begin();
        let contacts = vec![Contact::new("a", "A", ""), Contact::new("b", "B", "")];
        roster.accept(generation, contacts, None);
        let online = HashMap::from([(UserId::from("b"), true)]);

        let view = roster.view(&online, now(), TimeDelta::minutes(30), TimeDelta::minutes(5));

        assert_eq!(view[0].contact.id.as_str(), "b");
        assert!(view[0].online && view[0].active);
        assert!(!view[1].active);
    }
}
