//! Shared fixtures for engine tests: a manually advanced clock and helpers
//! that play the server's part by completing tickets by hand.

#![allow(dead_code)]

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use chatsync_client::{
    ApiError, ApiResponse, Client, ClientAction, ClientConfig, ClientEvent, Contact, Conversation,
    Environment, Message, MessageId, MessagePage, Notice, Pagination, RequestKind, SubscriptionId,
    Ticket,
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};

/// Clock that only moves when told to.
#[derive(Clone)]
pub struct ManualEnv {
    origin: Instant,
    base: DateTime<Utc>,
    offset: Arc<Mutex<Duration>>,
}

impl ManualEnv {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            base: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub fn base(&self) -> DateTime<Utc> {
        self.base
    }
}

impl Environment for ManualEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.base + TimeDelta::from_std(*self.offset.lock().unwrap()).unwrap()
    }
}

pub const ME: &str = "me";

pub struct Harness {
    pub env: ManualEnv,
    pub client: Client<ManualEnv>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let env = ManualEnv::new();
        let mut client = Client::new(env.clone(), config);
        client.handle(ClientEvent::SignedIn { user_id: ME.into() });
        Self { env, client }
    }

    pub fn handle(&mut self, event: ClientEvent) -> Vec<ClientAction> {
        self.client.handle(event)
    }

    pub fn complete(
        &mut self,
        ticket: Ticket,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        self.client.handle(ClientEvent::Completed { ticket, result })
    }

    pub fn advance(&mut self, by: Duration) -> Vec<ClientAction> {
        self.env.advance(by);
        let now = self.env.now();
        self.client.handle(ClientEvent::Tick { now })
    }

    pub fn select(&mut self, contact_id: &str) -> Vec<ClientAction> {
        self.handle(ClientEvent::SelectContact(Contact::new(contact_id, contact_id, "")))
    }

    /// Select `contact_id` and answer the lookup with `conversation_id`.
    /// Returns the actions of the lookup completion (subscribe + initial load).
    pub fn open(&mut self, contact_id: &str, conversation_id: &str) -> Vec<ClientAction> {
        let actions = self.select(contact_id);
        let lookup = ticket(&actions, RequestKind::FindConversation);
        self.complete(lookup, conversation(conversation_id))
    }

    pub fn contents(&self) -> Vec<String> {
        self.client.messages().iter().map(|m| m.content.clone()).collect()
    }
}

pub fn request_tickets(actions: &[ClientAction], kind: RequestKind) -> Vec<Ticket> {
    actions
        .iter()
        .filter_map(|action| match action {
            ClientAction::Request { ticket, request } if request.kind() == kind => Some(*ticket),
            _ => None,
        })
        .collect()
}

pub fn ticket(actions: &[ClientAction], kind: RequestKind) -> Ticket {
    let tickets = request_tickets(actions, kind);
    assert_eq!(tickets.len(), 1, "expected one {kind:?} request in {actions:#?}");
    tickets[0]
}

pub fn notices(actions: &[ClientAction]) -> Vec<Notice> {
    actions
        .iter()
        .filter_map(|action| match action {
            ClientAction::Notify(notice) => Some(notice.clone()),
            _ => None,
        })
        .collect()
}

pub fn subscription(actions: &[ClientAction]) -> SubscriptionId {
    actions
        .iter()
        .find_map(|action| match action {
            ClientAction::Subscribe { subscription, .. } => Some(*subscription),
            _ => None,
        })
        .expect("subscribe action")
}

pub fn conversation(id: &str) -> Result<ApiResponse, ApiError> {
    Ok(ApiResponse::Conversation(Conversation {
        id: id.into(),
        participant_ids: vec![ME.into()],
    }))
}

pub fn page(messages: Vec<Message>) -> Result<ApiResponse, ApiError> {
    Ok(ApiResponse::Messages(MessagePage { messages, pagination: Pagination::default() }))
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 11, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

pub fn message(
    id: &str,
    conversation_id: &str,
    content: &str,
    created_at: DateTime<Utc>,
) -> Message {
    Message {
        id: MessageId::server(id),
        conversation_id: conversation_id.into(),
        sender_id: "bob".into(),
        content: content.to_string(),
        image_url: None,
        created_at,
        is_read: false,
    }
}
