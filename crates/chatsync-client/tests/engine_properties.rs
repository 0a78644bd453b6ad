//! Property tests for ordering and staleness.

mod common;

use std::collections::BTreeSet;

use chatsync_client::RequestKind;
use common::{Harness, at, message, page, ticket};
use proptest::prelude::*;

const CONTACTS: [&str; 3] = ["ana", "bob", "cid"];

fn conversation_of(contact: &str) -> String {
    format!("conv-{contact}")
}

proptest! {
    #[test]
    fn timeline_is_chronological_for_any_page_order(
        rows in proptest::collection::vec((0i64..20, 0u8..12), 0..24)
            .prop_flat_map(|rows| Just(rows).prop_shuffle())
    ) {
        let mut h = Harness::new();
        let load = ticket(&h.open("bob", "c1"), RequestKind::FetchMessages);
        let page_rows = rows
            .iter()
            .map(|(secs, id)| message(&format!("m{id}"), "c1", &format!("{id}"), at(*secs)))
            .collect();

        h.complete(load, page(page_rows));

        let messages = h.client.messages();
        let distinct: BTreeSet<u8> = rows.iter().map(|(_, id)| *id).collect();
        prop_assert_eq!(messages.len(), distinct.len());
        let strictly_ordered = messages.windows(2).all(|pair| {
            (pair[0].created_at, &pair[0].id) < (pair[1].created_at, &pair[1].id)
        });
        prop_assert!(strictly_ordered);
    }

    #[test]
    fn only_the_last_selection_reaches_the_timeline(
        (picks, order) in proptest::collection::vec(0..CONTACTS.len(), 1..8)
            .prop_flat_map(|picks| {
                let n = picks.len();
                (Just(picks), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
            })
    ) {
        let mut h = Harness::new();
        let mut loads = Vec::new();
        for &pick in &picks {
            let contact = CONTACTS[pick];
            let conversation = conversation_of(contact);
            let actions = h.open(contact, &conversation);
            loads.push((ticket(&actions, RequestKind::FetchMessages), conversation));
        }

        for index in order {
            let (load, conversation) = &loads[index];
            let row = message(&format!("{conversation}-m"), conversation, conversation, at(1));
            h.complete(*load, page(vec![row]));
        }

        let last = conversation_of(CONTACTS[picks[picks.len() - 1]]);
        prop_assert_eq!(h.client.active_conversation_id().map(|c| c.as_str()), Some(last.as_str()));
        prop_assert_eq!(h.contents(), vec![last]);
        prop_assert!(!h.client.is_loading());
    }
}
