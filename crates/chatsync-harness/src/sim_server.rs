//! In-memory chat backend for simulation.
//!
//! `SimServer` plays every remote collaborator of the engine at once: the REST
//! API (as a [`Backend`]), the row-insert change feed and the presence channel
//! (through [`SimFeed`]s it hands out). All state sits behind one lock and no
//! lock is held across an await.
//!
//! Adversarial behavior is opt-in through [`SimConfig`] and the fault queue:
//! seeded latency jitter (which reorders responses), shuffled and duplicated
//! page rows, duplicate insert delivery, absence reported as a server error,
//! injected failures, hung requests and feed interruptions.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chatsync_app::Backend;
use chatsync_client::{
    ApiError, ApiRequest, ApiResponse, ChannelStatus, Contact, Conversation, ConversationId,
    Environment, FeedEvent, Message, MessageId, MessagePage, NewMessage, Pagination,
    ParticipantPair, PresenceEvent, RequestKind, SubscriptionId, UserId,
};
use rand::{Rng, SeedableRng, seq::SliceRandom};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{SimEnv, sim_feed::SimFeed};

/// How the server reports a conversation lookup that finds nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Absence {
    /// `404`.
    #[default]
    NotFound,
    /// `500`, as some backends do for an empty single-row select.
    ServerError,
}

/// Server behavior knobs.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// RNG seed. Same seed, same run.
    pub seed: u64,
    /// Minimum response latency.
    pub min_latency: Duration,
    /// Maximum response latency. Spread between min and max reorders
    /// responses of concurrent requests.
    pub max_latency: Duration,
    /// Return page rows in random order.
    pub shuffle_pages: bool,
    /// Repeat a random row in every non-empty page.
    pub duplicate_rows: bool,
    /// Deliver every insert notification twice.
    pub duplicate_inserts: bool,
    /// Lookup absence reporting.
    pub absence: Absence,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            min_latency: Duration::from_millis(5),
            max_latency: Duration::from_millis(5),
            shuffle_pages: false,
            duplicate_rows: false,
            duplicate_inserts: false,
            absence: Absence::NotFound,
        }
    }
}

impl SimConfig {
    /// Every adversarial knob on, with latency jitter up to `max_latency`.
    pub fn chaotic(seed: u64, max_latency: Duration) -> Self {
        Self {
            seed,
            min_latency: Duration::from_millis(1),
            max_latency,
            shuffle_pages: true,
            duplicate_rows: true,
            duplicate_inserts: true,
            absence: Absence::ServerError,
        }
    }
}

/// Injected outcome for the next request of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with this error without touching state.
    Fail(ApiError),
    /// Never answer.
    Hang,
}

/// One connected feed.
#[derive(Debug)]
struct FeedLink {
    events: mpsc::UnboundedSender<FeedEvent>,
    subscriptions: HashMap<SubscriptionId, ConversationId>,
    presence: Option<UserId>,
}

impl FeedLink {
    fn deliver(&self, event: FeedEvent) {
        if self.events.send(event).is_err() {
            trace!("feed receiver gone");
        }
    }
}

#[derive(Debug)]
struct ServerState {
    config: SimConfig,
    rng: ChaCha8Rng,
    users: Vec<Contact>,
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    next_conversation: u64,
    next_message: u64,
    faults: HashMap<RequestKind, VecDeque<Fault>>,
    log: Vec<ApiRequest>,
    feeds: HashMap<u64, FeedLink>,
    next_feed: u64,
    online: HashSet<UserId>,
    interrupted: bool,
}

impl ServerState {
    fn latency(&mut self) -> Duration {
        let (min, max) = (self.config.min_latency, self.config.max_latency);
        if max <= min { min } else { self.rng.gen_range(min..=max) }
    }

    fn take_fault(&mut self, kind: RequestKind) -> Option<Fault> {
        self.faults.get_mut(&kind).and_then(VecDeque::pop_front)
    }

    fn find_conversation(&self, pair: &ParticipantPair) -> Option<&Conversation> {
        self.conversations.iter().find(|conversation| {
            conversation.participant_ids.len() == 2
                && conversation.participant_ids.iter().all(|id| pair.contains(id))
        })
    }

    fn apply(&mut self, request: ApiRequest, env: &SimEnv) -> Result<ApiResponse, ApiError> {
        match request {
            ApiRequest::FindConversation { user_a, user_b } => {
                let pair = ParticipantPair::new(user_a, user_b);
                match self.find_conversation(&pair) {
                    Some(conversation) => Ok(ApiResponse::Conversation(conversation.clone())),
                    None => Err(match self.config.absence {
                        Absence::NotFound => ApiError::NotFound,
                        Absence::ServerError => ApiError::Server {
                            status: 500,
                            message: "JSON object requested, multiple (or no) rows returned"
                                .to_string(),
                        },
                    }),
                }
            },
            ApiRequest::CreateConversation { participants } => {
                if let Some(existing) = self.find_conversation(&participants) {
                    return Ok(ApiResponse::Conversation(existing.clone()));
                }
                self.next_conversation += 1;
                let [a, b] = participants.members();
                let conversation = Conversation {
                    id: ConversationId::new(format!("conv-{}", self.next_conversation)),
                    participant_ids: vec![a.clone(), b.clone()],
                };
                self.conversations.push(conversation.clone());
                Ok(ApiResponse::Conversation(conversation))
            },
            ApiRequest::FetchMessages { conversation_id, page, limit } => {
                Ok(ApiResponse::Messages(self.page(&conversation_id, page, limit)))
            },
            ApiRequest::PersistMessage(new) => self.persist(new, env).map(ApiResponse::Message),
            ApiRequest::MarkRead { user_id, conversation_id } => {
                for message in &mut self.messages {
                    if message.conversation_id == conversation_id && message.sender_id != user_id {
                        message.is_read = true;
                    }
                }
                Ok(ApiResponse::Empty)
            },
            ApiRequest::ListUsers => Ok(ApiResponse::Users(self.users.clone())),
            ApiRequest::SearchUsers { term } => {
                let term = term.to_lowercase();
                let users = self
                    .users
                    .iter()
                    .filter(|user| {
                        user.full_name.to_lowercase().contains(&term)
                            || user.email.to_lowercase().contains(&term)
                    })
                    .cloned()
                    .collect();
                Ok(ApiResponse::Users(users))
            },
        }
    }

    /// Newest-first page, the way the REST API orders it.
    fn page(&mut self, conversation_id: &ConversationId, page: u32, limit: u32) -> MessagePage {
        let mut rows: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, &b.id).cmp(&(a.created_at, &a.id)));
        let total = rows.len() as u64;

        let skip = page.saturating_sub(1) as usize * limit as usize;
        let mut rows: Vec<Message> = rows.into_iter().skip(skip).take(limit as usize).collect();

        if self.config.duplicate_rows && !rows.is_empty() {
            let index = self.rng.gen_range(0..rows.len());
            rows.push(rows[index].clone());
        }
        if self.config.shuffle_pages {
            rows.shuffle(&mut self.rng);
        }
        MessagePage { messages: rows, pagination: Pagination { page, limit, total: Some(total) } }
    }

    fn persist(&mut self, new: NewMessage, env: &SimEnv) -> Result<Message, ApiError> {
        let Some(conversation) =
            self.conversations.iter().find(|c| c.id == new.conversation_id)
        else {
            return Err(ApiError::Rejected {
                status: 409,
                message: format!("conversation {} does not exist", new.conversation_id),
            });
        };
        if !conversation.participant_ids.contains(&new.sender_id) {
            return Err(ApiError::Rejected {
                status: 403,
                message: format!("{} is not a participant", new.sender_id),
            });
        }

        self.next_message += 1;
        let message = Message {
            id: MessageId::server(format!("msg-{:04}", self.next_message)),
            conversation_id: new.conversation_id,
            sender_id: new.sender_id,
            content: new.content,
            image_url: new.image_url,
            created_at: env.wall_clock(),
            is_read: false,
        };
        self.messages.push(message.clone());
        self.notify_insert(&message.conversation_id);
        Ok(message)
    }

    fn notify_insert(&self, conversation_id: &ConversationId) {
        if self.interrupted {
            debug!(conversation = %conversation_id, "insert lost to interruption");
            return;
        }
        let copies = if self.config.duplicate_inserts { 2 } else { 1 };
        for link in self.feeds.values() {
            for (subscription, filter) in &link.subscriptions {
                if filter != conversation_id {
                    continue;
                }
                for _ in 0..copies {
                    link.deliver(FeedEvent::Insert {
                        subscription: *subscription,
                        conversation_id: conversation_id.clone(),
                    });
                }
            }
        }
    }

    fn broadcast_presence(&self, event: &PresenceEvent) {
        for link in self.feeds.values().filter(|link| link.presence.is_some()) {
            link.deliver(FeedEvent::Presence(event.clone()));
        }
    }

    fn sorted_online(&self) -> Vec<UserId> {
        let mut online: Vec<UserId> = self.online.iter().cloned().collect();
        online.sort();
        online
    }
}

/// Shared in-memory server. Clones share state.
#[derive(Debug, Clone)]
pub struct SimServer {
    env: SimEnv,
    state: Arc<Mutex<ServerState>>,
}

impl SimServer {
    /// Empty server with default (benign) behavior.
    pub fn new(env: SimEnv) -> Self {
        Self::with_config(env, SimConfig::default())
    }

    /// Empty server with `config`.
    pub fn with_config(env: SimEnv, config: SimConfig) -> Self {
        let state = ServerState {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            config,
            users: Vec::new(),
            conversations: Vec::new(),
            messages: Vec::new(),
            next_conversation: 0,
            next_message: 0,
            faults: HashMap::new(),
            log: Vec::new(),
            feeds: HashMap::new(),
            next_feed: 0,
            online: HashSet::new(),
            interrupted: false,
        };
        Self { env, state: Arc::new(Mutex::new(state)) }
    }

    /// The server's clock.
    pub fn env(&self) -> SimEnv {
        self.env
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a user.
    pub fn add_user(&self, contact: Contact) {
        self.state().users.push(contact);
    }

    /// Create (or return) the conversation between `a` and `b` directly.
    pub fn seed_conversation(&self, a: &str, b: &str) -> ConversationId {
        let participants = ParticipantPair::new(a.into(), b.into());
        match self.state().apply(ApiRequest::CreateConversation { participants }, &self.env) {
            Ok(ApiResponse::Conversation(conversation)) => conversation.id,
            _ => ConversationId::new(""),
        }
    }

    /// Insert a row as if another client had sent it, notifying feeds.
    pub fn insert_message(
        &self,
        conversation_id: &ConversationId,
        sender: &str,
        content: &str,
    ) -> Result<Message, ApiError> {
        let new = NewMessage {
            conversation_id: conversation_id.clone(),
            sender_id: sender.into(),
            content: content.to_string(),
            image_url: None,
        };
        self.state().persist(new, &self.env)
    }

    /// Queue `fault` for the next request of `kind`.
    pub fn inject(&self, kind: RequestKind, fault: Fault) {
        self.state().faults.entry(kind).or_default().push_back(fault);
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state().log.clone()
    }

    /// Number of requests of `kind` received so far.
    pub fn request_count(&self, kind: RequestKind) -> usize {
        self.state().log.iter().filter(|request| request.kind() == kind).count()
    }

    /// Stored rows of `conversation_id`, oldest first.
    pub fn messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut rows: Vec<Message> = self
            .state()
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        rows
    }

    /// All conversations.
    pub fn conversations(&self) -> Vec<Conversation> {
        self.state().conversations.clone()
    }

    /// Users currently tracked on the presence channel.
    pub fn online(&self) -> Vec<UserId> {
        self.state().sorted_online()
    }

    /// Drop every channel: subscriptions report `Errored` and inserts are
    /// lost until [`resume_feeds`](Self::resume_feeds).
    pub fn interrupt_feeds(&self) {
        let mut state = self.state();
        state.interrupted = true;
        for link in state.feeds.values() {
            for subscription in link.subscriptions.keys() {
                link.deliver(FeedEvent::Status {
                    subscription: *subscription,
                    status: ChannelStatus::Errored,
                });
            }
            if link.presence.is_some() {
                link.deliver(FeedEvent::PresenceStatus(ChannelStatus::Errored));
            }
        }
    }

    /// Reconnect every channel interrupted by
    /// [`interrupt_feeds`](Self::interrupt_feeds).
    pub fn resume_feeds(&self) {
        let mut state = self.state();
        state.interrupted = false;
        for link in state.feeds.values() {
            for subscription in link.subscriptions.keys() {
                link.deliver(FeedEvent::Status {
                    subscription: *subscription,
                    status: ChannelStatus::Subscribed,
                });
            }
            if link.presence.is_some() {
                link.deliver(FeedEvent::PresenceStatus(ChannelStatus::Subscribed));
            }
        }
    }

    /// Open a new feed connection.
    pub fn connect_feed(&self) -> SimFeed {
        let (events, receiver) = mpsc::unbounded_channel();
        let mut state = self.state();
        state.next_feed += 1;
        let id = state.next_feed;
        state.feeds.insert(id, FeedLink { events, subscriptions: HashMap::new(), presence: None });
        SimFeed::new(self.clone(), id, receiver)
    }

    pub(crate) fn feed_subscribe(
        &self,
        feed: u64,
        subscription: SubscriptionId,
        conversation_id: ConversationId,
    ) {
        let mut state = self.state();
        let interrupted = state.interrupted;
        let Some(link) = state.feeds.get_mut(&feed) else {
            return;
        };
        link.subscriptions.insert(subscription, conversation_id);
        if !interrupted {
            link.deliver(FeedEvent::Status { subscription, status: ChannelStatus::Subscribed });
        }
    }

    pub(crate) fn feed_unsubscribe(&self, feed: u64, subscription: SubscriptionId) {
        if let Some(link) = self.state().feeds.get_mut(&feed) {
            link.subscriptions.remove(&subscription);
        }
    }

    pub(crate) fn feed_join_presence(&self, feed: u64, user_id: UserId) {
        let mut state = self.state();
        let interrupted = state.interrupted;
        let Some(link) = state.feeds.get_mut(&feed) else {
            return;
        };
        link.presence = Some(user_id);
        if !interrupted {
            link.deliver(FeedEvent::PresenceStatus(ChannelStatus::Subscribed));
        }
    }

    pub(crate) fn feed_track(&self, feed: u64, user_id: UserId) {
        let mut state = self.state();
        if state.feeds.get(&feed).is_none_or(|link| link.presence.is_none()) {
            return;
        }
        state.online.insert(user_id.clone());
        state.broadcast_presence(&PresenceEvent::Join(user_id));
        let sync = PresenceEvent::Sync(state.sorted_online());
        if let Some(link) = state.feeds.get(&feed) {
            link.deliver(FeedEvent::Presence(sync));
        }
    }

    pub(crate) fn feed_leave_presence(&self, feed: u64) {
        let mut state = self.state();
        let Some(user_id) = state.feeds.get_mut(&feed).and_then(|link| link.presence.take())
        else {
            return;
        };
        let still_present =
            state.feeds.values().any(|link| link.presence.as_ref() == Some(&user_id));
        if !still_present && state.online.remove(&user_id) {
            state.broadcast_presence(&PresenceEvent::Leave(user_id));
        }
    }

    pub(crate) fn feed_disconnect(&self, feed: u64) {
        self.feed_leave_presence(feed);
        self.state().feeds.remove(&feed);
    }
}

impl Backend for SimServer {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let (delay, fault) = {
            let mut state = self.state();
            state.log.push(request.clone());
            (state.latency(), state.take_fault(request.kind()))
        };
        tokio::time::sleep(delay).await;

        match fault {
            Some(Fault::Fail(error)) => {
                debug!(kind = ?request.kind(), %error, "injected failure");
                Err(error)
            },
            Some(Fault::Hang) => {
                debug!(kind = ?request.kind(), "injected hang");
                std::future::pending().await
            },
            None => self.state().apply(request, &self.env),
        }
    }
}
