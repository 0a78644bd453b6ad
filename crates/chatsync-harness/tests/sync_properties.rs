//! Property tests: random operation sequences against a chaotic server.
//!
//! Each case runs on its own paused-clock runtime. After the operations the
//! clock is run forward until every request, reconcile and refresh has
//! settled, then the client's timeline is compared with the server's rows.

use std::{future::Future, time::Duration};

use chatsync_client::{Contact, ConversationId};
use chatsync_harness::{
    InvariantRegistry, SimClient, SimConfig, SimEnv, SimServer, assert_invariants,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    /// Ana sends a message to the selected contact.
    Send,
    /// Bob's message lands on the server directly.
    PeerInsert,
    /// Ana reselects a contact.
    Select(usize),
    /// Let virtual time pass.
    Pause(u64),
}

const CONTACTS: [&str; 2] = ["bob", "cid"];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Send),
        3 => Just(Op::PeerInsert),
        1 => (0..CONTACTS.len()).prop_map(Op::Select),
        2 => (0u64..400).prop_map(Op::Pause),
    ]
}

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
        .block_on(future)
}

fn chaotic_server(seed: u64) -> SimServer {
    let server = SimServer::with_config(
        SimEnv::new(),
        SimConfig::chaotic(seed, Duration::from_millis(250)),
    );
    for id in ["ana", "bob", "cid"] {
        server.add_user(Contact::new(id, id, format!("{id}@example.com")));
    }
    server
}

fn contact(id: &str) -> Contact {
    Contact::new(id, id, format!("{id}@example.com"))
}

/// Runs `ops` and returns the conversation that should be on screen.
async fn drive(server: &SimServer, ana: &SimClient, ops: &[Op]) -> ConversationId {
    let registry = InvariantRegistry::standard();
    let conversations: Vec<ConversationId> =
        CONTACTS.iter().map(|peer| server.seed_conversation("ana", peer)).collect();
    let mut selected = 0;
    ana.handle.select_contact(contact(CONTACTS[selected])).await.unwrap();

    for (step, op) in ops.iter().enumerate() {
        match op {
            Op::Send => {
                let content = format!("ana-{step}");
                ana.handle.send_message(CONTACTS[selected], content, None).await.unwrap();
            },
            Op::PeerInsert => {
                let peer = CONTACTS[selected];
                server
                    .insert_message(&conversations[selected], peer, &format!("{peer}-{step}"))
                    .unwrap();
            },
            Op::Select(index) => {
                selected = *index;
                ana.handle.select_contact(contact(CONTACTS[selected])).await.unwrap();
            },
            Op::Pause(millis) => tokio::time::sleep(Duration::from_millis(*millis)).await,
        }
        tokio::task::yield_now().await;
        assert_invariants(&registry, &[ana], &format!("step {step}: {op:?}"));
    }
    conversations[selected].clone()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn timeline_converges_to_server_rows(
        seed in any::<u64>(),
        ops in proptest::collection::vec(op(), 1..24),
    ) {
        block_on(async {
            let registry = InvariantRegistry::standard();
            let server = chaotic_server(seed);
            let ana = SimClient::start(&server, "ana").await.unwrap();

            let conversation = drive(&server, &ana, &ops).await;
            tokio::time::sleep(Duration::from_secs(30)).await;

            let snapshot = ana.snapshot();
            assert_eq!(snapshot.active_conversation_id.as_ref(), Some(&conversation));
            assert!(snapshot.messages.iter().all(|m| !m.is_provisional()));
            let shown: Vec<_> = snapshot.messages.iter().map(|m| m.id.clone()).collect();
            let stored: Vec<_> = server.messages(&conversation).into_iter().map(|m| m.id).collect();
            assert_eq!(shown, stored, "seed {seed}");
            assert_invariants(&registry, &[&ana], "settled");

            ana.stop().await.unwrap();
        });
    }

    #[test]
    fn every_send_is_stored_or_reported(
        seed in any::<u64>(),
        sends in 1usize..8,
    ) {
        block_on(async {
            let server = chaotic_server(seed);
            let ana = SimClient::start(&server, "ana").await.unwrap();
            let mut notices = ana.handle.notices();
            let conversation = ana.open("bob").await.unwrap().active_conversation_id.unwrap();

            for n in 0..sends {
                ana.handle.send_message("bob", format!("note {n}"), None).await.unwrap();
            }
            tokio::time::sleep(Duration::from_secs(30)).await;

            let stored = server.messages(&conversation).len();
            let mut reported = 0;
            while notices.try_recv().is_ok() {
                reported += 1;
            }
            assert_eq!(stored + reported, sends, "seed {seed}");
            assert_eq!(ana.snapshot().messages.len(), stored);

            ana.stop().await.unwrap();
        });
    }
}
