//! Message timeline of the active conversation.
//!
//! # Invariants
//!
//! - Messages are ordered by `created_at`, ties broken by id (server ids
//!   before provisional ones), so the same data always renders the same way
//!   regardless of the order the server returned it in
//! - No two entries share an id

use std::{cmp::Ordering, collections::HashSet};

use chatsync_core::{Message, MessageId};

fn chronological(a: &Message, b: &Message) -> Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Ordered message list.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    messages: Vec<Message>,
}

impl Timeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Newest entry.
    pub fn newest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// True if an entry with `id` is present.
    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Append a provisional entry.
    ///
    /// Locally generated timestamps are current, so this lands at the end in
    /// practice; an entry with an older timestamp is still inserted in order.
    pub fn append_optimistic(&mut self, message: Message) {
        if self.contains(&message.id) {
            return;
        }
        let at = self.messages.partition_point(|m| chronological(m, &message).is_le());
        self.messages.insert(at, message);
    }

    /// Replace the contents with an authoritative page plus entries the caller
    /// wants kept alive across the refresh (sends not yet confirmed).
    ///
    /// Duplicates are dropped, the first occurrence wins, authoritative entries
    /// before carried ones.
    pub fn replace(&mut self, authoritative: Vec<Message>, carried: Vec<Message>) {
        let mut seen = HashSet::new();
        let mut merged: Vec<Message> = authoritative
            .into_iter()
            .chain(carried)
            .filter(|m| seen.insert(m.id.clone()))
            .collect();
        merged.sort_by(chronological);
        self.messages = merged;
    }

    /// Replace the provisional entry with the server's record.
    ///
    /// If a refresh already delivered the record, the provisional entry is just
    /// removed. Returns false if neither entry changed.
    pub fn supersede(&mut self, provisional: &MessageId, record: Message) -> bool {
        let removed = self.remove(provisional).is_some();
        if self.contains(&record.id) {
            return removed;
        }
        let at = self.messages.partition_point(|m| chronological(m, &record).is_le());
        self.messages.insert(at, record);
        true
    }

    /// Remove the entry with `id`.
    pub fn remove(&mut self, id: &MessageId) -> Option<Message> {
        let at = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(at))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, secs).unwrap()
    }

    fn server(id: &str, secs: u32) -> Message {
        Message {
            id: MessageId::server(id),
            conversation_id: "c1".into(),
            sender_id: "bob".into(),
            content: id.to_string(),
            image_url: None,
            created_at: at(secs),
            is_read: false,
        }
    }

    fn provisional(seq: u64, secs: u32) -> Message {
        Message::provisional(seq, "c1".into(), "alice".into(), "hi".into(), None, at(secs))
    }

    fn ids(timeline: &Timeline) -> Vec<String> {
        timeline.messages().iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn replace_sorts_server_pages() {
        let mut timeline = Timeline::new();
        timeline.replace(vec![server("c", 30), server("a", 10), server("b", 20)], vec![]);

        assert_eq!(ids(&timeline), ["a", "b", "c"]);
    }

    #[test]
    fn replace_drops_duplicate_rows() {
        let mut timeline = Timeline::new();
        timeline.replace(vec![server("a", 10), server("a", 10), server("b", 20)], vec![]);

        assert_eq!(ids(&timeline), ["a", "b"]);
    }

    #[test]
    fn equal_timestamps_render_identically_for_any_server_order() {
        let mut first = Timeline::new();
        first.replace(vec![server("x", 5), server("y", 5), server("z", 5)], vec![]);

        let mut second = Timeline::new();
        second.replace(vec![server("z", 5), server("x", 5), server("y", 5)], vec![]);

        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn carried_entries_survive_replace() {
        let mut timeline = Timeline::new();
        timeline.append_optimistic(provisional(0, 40));

        timeline.replace(vec![server("a", 10)], vec![provisional(0, 40)]);

        assert_eq!(ids(&timeline), ["a", "optimistic-0"]);
    }

    #[test]
    fn optimistic_append_goes_to_the_end() {
        let mut timeline = Timeline::new();
        timeline.replace(vec![server("a", 10), server("b", 20)], vec![]);

        timeline.append_optimistic(provisional(0, 20));

        assert_eq!(ids(&timeline), ["a", "b", "optimistic-0"]);
    }

    #[test]
    fn supersede_swaps_provisional_for_record() {
        let mut timeline = Timeline::new();
        timeline.replace(vec![server("a", 10)], vec![]);
        timeline.append_optimistic(provisional(0, 20));

        assert!(timeline.supersede(&MessageId::Provisional(0), server("m9", 21)));

        assert_eq!(ids(&timeline), ["a", "m9"]);
    }

    #[test]
    fn supersede_after_refresh_only_removes_provisional() {
        let mut timeline = Timeline::new();
        timeline.replace(vec![server("m9", 21)], vec![provisional(0, 20)]);

        assert!(timeline.supersede(&MessageId::Provisional(0), server("m9", 21)));

        assert_eq!(ids(&timeline), ["m9"]);
    }

    #[test]
    fn supersede_without_changes_reports_false() {
        let mut timeline = Timeline::new();
        timeline.replace(vec![server("m9", 21)], vec![]);

        assert!(!timeline.supersede(&MessageId::Provisional(3), server("m9", 21)));
        assert_eq!(timeline.len(), 1);
    }
}
