//! Property tests for identifiers and the wire model.

use chatsync_core::{Message, MessageId, ParticipantPair, UserId};
use proptest::prelude::*;

proptest! {
    #[test]
    fn pair_normalization_ignores_argument_order(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
        let forward = ParticipantPair::new(UserId::new(a.clone()), UserId::new(b.clone()));
        let reverse = ParticipantPair::new(UserId::new(b.clone()), UserId::new(a.clone()));

        prop_assert_eq!(&forward, &reverse);
        prop_assert!(forward.contains(&UserId::new(a)));
        prop_assert!(forward.contains(&UserId::new(b)));
    }

    #[test]
    fn provisional_ids_parse_back_from_wire_form(seq in any::<u64>()) {
        let raw = MessageId::Provisional(seq).to_string();
        prop_assert_eq!(MessageId::from(raw), MessageId::Provisional(seq));
    }

    #[test]
    fn server_ids_order_before_provisional_ids(id in "[a-f0-9]{8}", seq in any::<u64>()) {
        prop_assert!(MessageId::server(id) < MessageId::Provisional(seq));
    }
}

#[test]
fn message_page_decodes_backend_payload() {
    let json = r#"{
        "messages": [
            {
                "id": "m2",
                "conversation_id": "c1",
                "sender_id": "bob",
                "content": "",
                "image_url": "https://cdn.example.com/cat.png",
                "created_at": "2024-05-01T10:01:00.123Z",
                "is_read": true
            },
            {
                "id": "m1",
                "conversation_id": "c1",
                "sender_id": "alice",
                "content": "hello",
                "created_at": "2024-05-01T10:00:00Z"
            }
        ],
        "pagination": {"page": 1, "limit": 50, "total": 2}
    }"#;

    let page: chatsync_core::MessagePage = serde_json::from_str(json).unwrap();

    assert_eq!(page.messages.len(), 2);
    assert_eq!(page.pagination.total, Some(2));
    assert_eq!(page.newest().map(|m| m.id.clone()), Some(MessageId::server("m2")));

    let image: &Message = &page.messages[0];
    assert!(image.is_read);
    assert_eq!(image.image_url.as_deref(), Some("https://cdn.example.com/cat.png"));
}

#[test]
fn message_page_without_pagination_still_decodes() {
    let page: chatsync_core::MessagePage = serde_json::from_str(r#"{"messages": []}"#).unwrap();
    assert!(page.messages.is_empty());
    assert_eq!(page.pagination.total, None);
}
