//! Client state machine.
//!
//! The `Client` owns the active conversation and everything derived from it.
//! Each handler starts with a freshness check: a completion is applied only if
//! its ticket is still in flight, the contact generation it was issued under is
//! still current, and (for conversation-scoped work) its conversation is still
//! the active one. Stale results are dropped without touching state.

use std::collections::{HashMap, HashSet};

use chatsync_core::{
    ApiError, Contact, ConversationId, Environment, Message, MessageId, NewMessage,
    ParticipantPair, UserId,
};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiRequest, ApiResponse},
    config::ClientConfig,
    event::{
        ClientAction, ClientEvent, FeedEvent, Notice, PresenceAnnouncement, SendFailure, Ticket,
    },
    resolver::{Resolver, Stage, Step},
    roster::Roster,
    state::Snapshot,
    subscription::{StatusOutcome, Subscriptions},
    timeline::Timeline,
};

/// Session-wide selection state.
#[derive(Debug, Default)]
struct ActiveState {
    contact: Option<Contact>,
    conversation_id: Option<ConversationId>,
    is_loading: bool,
    is_initial_load: bool,
    /// Bumped on every contact change; the cancellation token of all work
    /// issued on behalf of a selection.
    generation: u64,
}

/// A send waiting for its conversation to be resolved.
#[derive(Debug)]
struct Draft {
    receiver_id: UserId,
    content: String,
    image_url: Option<String>,
}

/// Who is waiting on a conversation resolution.
#[derive(Debug)]
enum Waiter {
    Select { generation: u64 },
    Send { generation: u64, draft: Draft },
}

/// What an in-flight request is for.
#[derive(Debug)]
enum Purpose {
    Resolve { pair: ParticipantPair, stage: Stage },
    Load { generation: u64, conversation_id: ConversationId, initial: bool, seq: u64 },
    Persist { provisional: MessageId, receiver_id: UserId },
    MarkRead { conversation_id: ConversationId },
    Contacts { generation: u64 },
    PreviewLookup { generation: u64, contact_id: UserId },
    PreviewFetch { generation: u64, contact_id: UserId },
}

struct InFlight<I> {
    purpose: Purpose,
    issued_at: I,
}

#[derive(Debug)]
enum Delivery {
    /// Persist call outstanding.
    Pending(Message),
    /// Server returned `record`; waiting for a refresh to contain it.
    Acknowledged {
        record: Message,
        /// Loads issued up to this sequence number predate the ack.
        after_load: u64,
        misses: u32,
    },
}

#[derive(Debug)]
struct OutgoingSend {
    provisional: MessageId,
    conversation_id: ConversationId,
    delivery: Delivery,
}

impl OutgoingSend {
    fn content(&self) -> &str {
        match &self.delivery {
            Delivery::Pending(message) | Delivery::Acknowledged { record: message, .. } => {
                &message.content
            },
        }
    }
}

fn send_failed(content: String, reason: SendFailure) -> ClientAction {
    ClientAction::Notify(Notice::SendFailed { content, reason })
}

/// Keep at most one `Render`, at the end.
fn coalesce_renders(mut actions: Vec<ClientAction>) -> Vec<ClientAction> {
    let before = actions.len();
    actions.retain(|action| !matches!(action, ClientAction::Render));
    if actions.len() != before {
        actions.push(ClientAction::Render);
    }
    actions
}

/// Chat synchronization engine.
pub struct Client<E: Environment> {
    /// Environment for timing.
    env: E,

    config: ClientConfig,

    /// Signed-in user.
    user: Option<UserId>,

    active: ActiveState,

    timeline: Timeline,

    resolver: Resolver<Waiter>,

    subscriptions: Subscriptions,

    roster: Roster,

    /// Outstanding requests by ticket.
    in_flight: HashMap<Ticket, InFlight<E::Instant>>,

    /// Sends not yet confirmed by a refresh, oldest first.
    outbox: Vec<OutgoingSend>,

    /// When a confirmatory refresh was requested.
    reconcile_requested: Option<E::Instant>,

    next_ticket: u64,

    next_provisional: u64,

    /// Sequence number of the newest issued timeline load.
    issued_loads: u64,

    /// Sequence number of the newest applied timeline load. Older loads that
    /// complete later are dropped so the timeline never moves backwards.
    applied_load: u64,
}

impl<E: Environment> Client<E> {
    /// Create a signed-out client.
    pub fn new(env: E, config: ClientConfig) -> Self {
        Self {
            env,
            config,
            user: None,
            active: ActiveState::default(),
            timeline: Timeline::new(),
            resolver: Resolver::new(),
            subscriptions: Subscriptions::new(),
            roster: Roster::new(),
            in_flight: HashMap::new(),
            outbox: Vec::new(),
            reconcile_requested: None,
            next_ticket: 0,
            next_provisional: 0,
            issued_loads: 0,
            applied_load: 0,
        }
    }

    /// Signed-in user.
    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    /// Selected contact.
    pub fn active_contact(&self) -> Option<&Contact> {
        self.active.contact.as_ref()
    }

    /// Conversation resolved for the selected contact.
    pub fn active_conversation_id(&self) -> Option<&ConversationId> {
        self.active.conversation_id.as_ref()
    }

    /// Timeline of the active conversation.
    pub fn messages(&self) -> &[Message] {
        self.timeline.messages()
    }

    /// A spinner-visible load is in progress.
    pub fn is_loading(&self) -> bool {
        self.active.is_loading
    }

    /// No load has been accepted since the contact was selected.
    pub fn is_initial_load(&self) -> bool {
        self.active.is_initial_load
    }

    /// Current contact generation.
    pub fn generation(&self) -> u64 {
        self.active.generation
    }

    /// Online flags from the presence channel.
    pub fn online_users(&self) -> &HashMap<UserId, bool> {
        self.subscriptions.online_users()
    }

    /// Contact roster.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Sends not yet confirmed by a refresh.
    pub fn unconfirmed_sends(&self) -> usize {
        self.outbox.len()
    }

    /// Copy of the observable state, with the roster view derived at the
    /// environment's current wall-clock time.
    pub fn snapshot(&self) -> Snapshot {
        let online = self.subscriptions.online_users();
        Snapshot {
            user_id: self.user.clone(),
            active_contact: self.active.contact.clone(),
            active_conversation_id: self.active.conversation_id.clone(),
            messages: self.timeline.messages().to_vec(),
            is_loading: self.active.is_loading,
            is_initial_load: self.active.is_initial_load,
            online_users: online.clone(),
            contacts: self.roster.view(
                online,
                self.env.wall_clock(),
                self.config.recent_message_window,
                self.config.recent_seen_window,
            ),
            contacts_loading: self.roster.is_loading(),
            feed: self.subscriptions.feed().clone(),
        }
    }

    /// Process an event and return resulting actions.
    ///
    /// Never fails: every error is absorbed into state or reported as a
    /// [`ClientAction::Notify`].
    pub fn handle(&mut self, event: ClientEvent<E::Instant>) -> Vec<ClientAction> {
        let actions = match event {
            ClientEvent::SignedIn { user_id } => self.handle_signed_in(user_id),
            ClientEvent::SignedOut => self.handle_signed_out(),
            ClientEvent::SelectContact(contact) => self.handle_select_contact(contact),
            ClientEvent::Load { conversation_id, initial } => {
                self.handle_load(conversation_id, initial)
            },
            ClientEvent::AppendOptimistic(message) => self.handle_append_optimistic(message),
            ClientEvent::Send { receiver_id, content, image_url } => {
                self.handle_send(Draft { receiver_id, content, image_url })
            },
            ClientEvent::MarkRead => self.handle_mark_read(),
            ClientEvent::LoadContacts => self.handle_load_contacts(),
            ClientEvent::SearchContacts { term } => self.handle_search_contacts(&term),
            ClientEvent::Completed { ticket, result } => self.handle_completed(ticket, result),
            ClientEvent::Feed(event) => self.handle_feed(event),
            ClientEvent::Tick { now } => self.handle_tick(now),
            ClientEvent::Teardown => self.handle_teardown(),
        };
        coalesce_renders(actions)
    }

    fn handle_signed_in(&mut self, user_id: UserId) -> Vec<ClientAction> {
        if self.user.as_ref() == Some(&user_id) {
            return vec![];
        }
        let mut actions = if self.user.is_some() { self.reset() } else { vec![] };

        info!(user = %user_id, "signed in");
        self.user = Some(user_id.clone());
        actions.push(self.subscriptions.join_presence(user_id));
        actions.push(ClientAction::Render);
        actions
    }

    fn handle_signed_out(&mut self) -> Vec<ClientAction> {
        let actions = self.reset();
        if let Some(user) = self.user.take() {
            info!(user = %user, "signed out");
        }
        actions
    }

    fn handle_teardown(&mut self) -> Vec<ClientAction> {
        info!("teardown");
        self.reset()
    }

    /// Release every channel and forget all session state except the user.
    fn reset(&mut self) -> Vec<ClientAction> {
        let generation = self.active.generation + 1;
        self.active = ActiveState { generation, ..ActiveState::default() };
        self.timeline.clear();
        self.resolver.clear();
        self.roster.clear();
        self.in_flight.clear();
        self.outbox.clear();
        self.reconcile_requested = None;

        let mut actions: Vec<ClientAction> = self.subscriptions.close().into_iter().collect();
        actions.extend(self.subscriptions.leave_presence());
        actions.push(ClientAction::Render);
        actions
    }

    fn handle_select_contact(&mut self, contact: Contact) -> Vec<ClientAction> {
        self.active.generation += 1;
        let generation = self.active.generation;
        info!(contact = %contact.id, generation, "contact selected");

        self.timeline.clear();
        self.active.conversation_id = None;
        self.active.is_loading = true;
        self.active.is_initial_load = true;
        self.active.contact = Some(contact.clone());
        self.outbox.retain(|send| matches!(send.delivery, Delivery::Pending(_)));
        self.reconcile_requested = None;

        let mut actions: Vec<ClientAction> = self.subscriptions.close().into_iter().collect();
        actions.push(ClientAction::Render);

        let Some(user) = self.user.clone() else {
            warn!(contact = %contact.id, "contact selected while signed out");
            self.active.is_loading = false;
            self.active.is_initial_load = false;
            actions.push(ClientAction::Notify(Notice::ConversationUnavailable {
                contact_id: contact.id,
                error: ApiError::Unauthorized,
            }));
            return actions;
        };

        let pair = ParticipantPair::new(user, contact.id);
        actions.extend(self.resolve(pair, Waiter::Select { generation }));
        actions
    }

    fn handle_load(&mut self, conversation_id: ConversationId, initial: bool) -> Vec<ClientAction> {
        if !self.is_active_conversation(&conversation_id) {
            debug!(conversation = %conversation_id, "load for inactive conversation discarded");
            return vec![];
        }
        self.issue_load(conversation_id, initial)
    }

    fn handle_append_optimistic(&mut self, message: Message) -> Vec<ClientAction> {
        if !self.is_active_conversation(&message.conversation_id) {
            debug!(id = %message.id, "optimistic append for inactive conversation discarded");
            return vec![];
        }
        self.timeline.append_optimistic(message);
        vec![ClientAction::Render]
    }

    fn handle_send(&mut self, draft: Draft) -> Vec<ClientAction> {
        let Some(user) = self.user.clone() else {
            return vec![send_failed(draft.content, SendFailure::NotSignedIn)];
        };
        if draft.content.trim().is_empty() && draft.image_url.is_none() {
            debug!("empty message ignored");
            return vec![];
        }
        let receiver_is_active =
            self.active.contact.as_ref().is_some_and(|contact| contact.id == draft.receiver_id);
        if !receiver_is_active {
            warn!(receiver = %draft.receiver_id, "send to a contact that is not selected");
            return vec![send_failed(draft.content, SendFailure::NoActiveConversation)];
        }

        if let Some(conversation_id) = self.active.conversation_id.clone() {
            return self.start_send(user, conversation_id, draft);
        }

        let pair = ParticipantPair::new(user, draft.receiver_id.clone());
        let generation = self.active.generation;
        self.resolve(pair, Waiter::Send { generation, draft }).into_iter().collect()
    }

    fn handle_mark_read(&mut self) -> Vec<ClientAction> {
        let (Some(user_id), Some(conversation_id)) =
            (self.user.clone(), self.active.conversation_id.clone())
        else {
            debug!("mark read without an active conversation ignored");
            return vec![];
        };
        let purpose = Purpose::MarkRead { conversation_id: conversation_id.clone() };
        vec![self.issue(purpose, ApiRequest::MarkRead { user_id, conversation_id })]
    }

    fn handle_load_contacts(&mut self) -> Vec<ClientAction> {
        let generation = self.roster.begin();
        let purpose = Purpose::Contacts { generation };
        vec![self.issue(purpose, ApiRequest::ListUsers), ClientAction::Render]
    }

    fn handle_search_contacts(&mut self, term: &str) -> Vec<ClientAction> {
        let term = term.trim();
        if term.is_empty() {
            return self.handle_load_contacts();
        }
        let generation = self.roster.begin();
        let request = ApiRequest::SearchUsers { term: term.to_string() };
        vec![self.issue(Purpose::Contacts { generation }, request), ClientAction::Render]
    }

    fn handle_completed(
        &mut self,
        ticket: Ticket,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        let Some(in_flight) = self.in_flight.remove(&ticket) else {
            debug!(%ticket, "completion for unknown or expired request discarded");
            return vec![];
        };
        self.dispatch(in_flight.purpose, result)
    }

    fn dispatch(
        &mut self,
        purpose: Purpose,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        match purpose {
            Purpose::Resolve { pair, stage } => self.on_resolved(&pair, stage, result),
            Purpose::Load { generation, conversation_id, initial, seq } => {
                self.on_loaded(generation, conversation_id, initial, seq, result)
            },
            Purpose::Persist { provisional, receiver_id } => {
                self.on_persisted(&provisional, &receiver_id, result)
            },
            Purpose::MarkRead { conversation_id } => {
                if let Err(error) = result {
                    warn!(conversation = %conversation_id, %error, "mark read failed");
                }
                vec![]
            },
            Purpose::Contacts { generation } => self.on_contacts(generation, result),
            Purpose::PreviewLookup { generation, contact_id } => {
                self.on_preview_lookup(generation, contact_id, result)
            },
            Purpose::PreviewFetch { generation, contact_id } => {
                self.on_preview_fetch(generation, &contact_id, result)
            },
        }
    }

    fn on_resolved(
        &mut self,
        pair: &ParticipantPair,
        stage: Stage,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        match self.resolver.complete(pair, stage, result) {
            Step::Ignored => vec![],
            Step::Create(request) => {
                debug!(?pair, "conversation absent, creating");
                let purpose = Purpose::Resolve { pair: pair.clone(), stage: Stage::Create };
                vec![self.issue(purpose, request)]
            },
            Step::Done { waiters, result } => {
                let mut actions = Vec::new();
                for waiter in waiters {
                    actions.extend(self.on_waiter(waiter, &result));
                }
                actions
            },
        }
    }

    fn on_waiter(
        &mut self,
        waiter: Waiter,
        result: &Result<ConversationId, ApiError>,
    ) -> Vec<ClientAction> {
        match waiter {
            Waiter::Select { generation } => {
                if generation != self.active.generation {
                    let current = self.active.generation;
                    debug!(generation, current, "stale resolution discarded");
                    return vec![];
                }
                match result {
                    Ok(conversation_id) => self.adopt_conversation(conversation_id.clone(), true),
                    Err(error) => {
                        self.active.is_loading = false;
                        self.active.is_initial_load = false;
                        let Some(contact) = &self.active.contact else {
                            return vec![ClientAction::Render];
                        };
                        warn!(contact = %contact.id, %error, "conversation unavailable");
                        vec![
                            ClientAction::Notify(Notice::ConversationUnavailable {
                                contact_id: contact.id.clone(),
                                error: error.clone(),
                            }),
                            ClientAction::Render,
                        ]
                    },
                }
            },
            Waiter::Send { generation, draft } => {
                if generation != self.active.generation {
                    debug!(generation, "contact changed before send resolved");
                    return vec![send_failed(draft.content, SendFailure::Superseded)];
                }
                let Some(user) = self.user.clone() else {
                    return vec![send_failed(draft.content, SendFailure::NotSignedIn)];
                };
                match result {
                    Ok(resolved) => {
                        let mut actions = Vec::new();
                        let conversation_id = match self.active.conversation_id.clone() {
                            Some(active) => active,
                            None => {
                                actions.extend(self.adopt_conversation(resolved.clone(), false));
                                resolved.clone()
                            },
                        };
                        actions.extend(self.start_send(user, conversation_id, draft));
                        actions
                    },
                    Err(error) => vec![send_failed(
                        draft.content,
                        SendFailure::ConversationUnavailable(error.clone()),
                    )],
                }
            },
        }
    }

    /// Make `conversation_id` the active conversation: open its feed and load.
    fn adopt_conversation(
        &mut self,
        conversation_id: ConversationId,
        initial: bool,
    ) -> Vec<ClientAction> {
        if self.is_active_conversation(&conversation_id) {
            return vec![];
        }
        info!(conversation = %conversation_id, "conversation resolved");
        self.active.conversation_id = Some(conversation_id.clone());

        let mut actions = self.subscriptions.open(conversation_id.clone());
        actions.extend(self.issue_load(conversation_id, initial));
        actions
    }

    fn start_send(
        &mut self,
        user: UserId,
        conversation_id: ConversationId,
        draft: Draft,
    ) -> Vec<ClientAction> {
        let seq = self.next_provisional;
        self.next_provisional += 1;

        let message = Message::provisional(
            seq,
            conversation_id.clone(),
            user.clone(),
            draft.content.clone(),
            draft.image_url.clone(),
            self.env.wall_clock(),
        );
        let provisional = message.id.clone();
        debug!(id = %provisional, conversation = %conversation_id, "optimistic append");

        self.timeline.append_optimistic(message.clone());
        self.outbox.push(OutgoingSend {
            provisional: provisional.clone(),
            conversation_id: conversation_id.clone(),
            delivery: Delivery::Pending(message),
        });

        let request = ApiRequest::PersistMessage(NewMessage {
            conversation_id,
            sender_id: user,
            content: draft.content,
            image_url: draft.image_url,
        });
        let purpose = Purpose::Persist { provisional, receiver_id: draft.receiver_id };
        vec![self.issue(purpose, request), ClientAction::Render]
    }

    fn issue_load(&mut self, conversation_id: ConversationId, initial: bool) -> Vec<ClientAction> {
        self.issued_loads += 1;
        let purpose = Purpose::Load {
            generation: self.active.generation,
            conversation_id: conversation_id.clone(),
            initial,
            seq: self.issued_loads,
        };
        let request =
            ApiRequest::FetchMessages { conversation_id, page: 1, limit: self.config.page_size };

        let mut actions = vec![self.issue(purpose, request)];
        if initial {
            self.active.is_loading = true;
            self.active.is_initial_load = true;
            actions.push(ClientAction::Render);
        }
        actions
    }

    fn on_loaded(
        &mut self,
        generation: u64,
        conversation_id: ConversationId,
        initial: bool,
        seq: u64,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        if generation != self.active.generation || !self.is_active_conversation(&conversation_id)
        {
            debug!(conversation = %conversation_id, seq, "stale load discarded");
            return vec![];
        }
        if seq < self.applied_load {
            debug!(
                conversation = %conversation_id,
                seq,
                applied = self.applied_load,
                "superseded load discarded"
            );
            return vec![];
        }

        match result.and_then(ApiResponse::into_messages) {
            Ok(page) => self.apply_page(&conversation_id, seq, page.messages),
            Err(error) => self.on_load_failed(conversation_id, initial, error),
        }
    }

    fn apply_page(
        &mut self,
        conversation_id: &ConversationId,
        seq: u64,
        messages: Vec<Message>,
    ) -> Vec<ClientAction> {
        self.applied_load = seq;
        debug!(conversation = %conversation_id, seq, count = messages.len(), "load applied");

        let fresh: HashSet<MessageId> = messages.iter().map(|m| m.id.clone()).collect();
        let max_misses = self.config.max_reconcile_misses;
        let mut carried = Vec::new();
        let mut actions = Vec::new();

        self.outbox.retain_mut(|send| {
            if &send.conversation_id != conversation_id {
                return true;
            }
            match &mut send.delivery {
                Delivery::Pending(message) => {
                    carried.push(message.clone());
                    true
                },
                Delivery::Acknowledged { record, after_load, misses } => {
                    if fresh.contains(&record.id) {
                        debug!(id = %record.id, "send confirmed");
                        return false;
                    }
                    if seq > *after_load {
                        *misses += 1;
                    }
                    if *misses >= max_misses {
                        warn!(id = %record.id, misses = *misses, "acknowledged send missing");
                        let content = record.content.clone();
                        actions.push(send_failed(content, SendFailure::NotConfirmed));
                        return false;
                    }
                    carried.push(record.clone());
                    true
                },
            }
        });

        self.timeline.replace(messages, carried);
        self.active.is_loading = false;
        self.active.is_initial_load = false;

        if let (Some(contact), Some(newest)) = (&self.active.contact, self.timeline.newest()) {
            self.roster.set_preview(&contact.id, newest);
        }
        if self.has_unconfirmed(conversation_id) {
            actions.extend(self.schedule_reconcile());
        }
        actions.extend(self.handle_mark_read());
        actions.push(ClientAction::Render);
        actions
    }

    fn on_load_failed(
        &mut self,
        conversation_id: ConversationId,
        initial: bool,
        error: ApiError,
    ) -> Vec<ClientAction> {
        // A silent refresh never owns the spinner.
        if initial {
            self.active.is_loading = false;
        }
        let mut actions = Vec::new();

        if initial && self.active.is_initial_load {
            warn!(conversation = %conversation_id, %error, "initial load failed");
            self.active.is_initial_load = false;
            let pending = self.pending_messages(&conversation_id);
            self.timeline.replace(Vec::new(), pending);
            actions.push(ClientAction::Notify(Notice::LoadFailed {
                conversation_id: conversation_id.clone(),
                error,
            }));
        } else {
            warn!(conversation = %conversation_id, %error, "refresh failed, keeping messages");
        }

        if self.has_unconfirmed(&conversation_id) {
            actions.extend(self.schedule_reconcile());
        }
        actions.push(ClientAction::Render);
        actions
    }

    fn on_persisted(
        &mut self,
        provisional: &MessageId,
        receiver_id: &UserId,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        let position = self.outbox.iter().position(|send| &send.provisional == provisional);

        match result.and_then(ApiResponse::into_message) {
            Ok(record) => {
                debug!(provisional = %provisional, id = %record.id, "send acknowledged");
                let mut actions = Vec::new();
                if self.roster.set_preview(receiver_id, &record) {
                    actions.push(ClientAction::Render);
                }
                let Some(position) = position else {
                    return actions;
                };
                if !self.is_active_conversation(&self.outbox[position].conversation_id) {
                    self.outbox.remove(position);
                    return actions;
                }

                self.timeline.supersede(provisional, record.clone());
                self.outbox[position].delivery =
                    Delivery::Acknowledged { record, after_load: self.issued_loads, misses: 0 };
                actions.extend(self.schedule_reconcile());
                actions.push(ClientAction::Render);
                actions
            },
            Err(error) => {
                let Some(position) = position else {
                    return vec![];
                };
                let send = self.outbox.remove(position);
                warn!(provisional = %provisional, %error, "send failed");

                let mut actions = vec![send_failed(
                    send.content().to_string(),
                    SendFailure::Rejected(error),
                )];
                if self.is_active_conversation(&send.conversation_id) {
                    self.timeline.remove(provisional);
                    actions.extend(self.issue_load(send.conversation_id, false));
                    actions.push(ClientAction::Render);
                }
                actions
            },
        }
    }

    fn on_contacts(
        &mut self,
        generation: u64,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        match result.and_then(ApiResponse::into_users) {
            Ok(users) => {
                if !self.roster.accept(generation, users, self.user.as_ref()) {
                    debug!(generation, "superseded contact list discarded");
                    return vec![];
                }
                let mut actions = vec![ClientAction::Render];
                if self.config.load_previews
                    && let Some(user) = self.user.clone()
                {
                    let contacts: Vec<UserId> =
                        self.roster.contacts().iter().map(|c| c.id.clone()).collect();
                    for contact_id in contacts {
                        let pair = ParticipantPair::new(user.clone(), contact_id.clone());
                        let request = ApiRequest::find_conversation(&pair);
                        let purpose = Purpose::PreviewLookup { generation, contact_id };
                        actions.push(self.issue(purpose, request));
                    }
                }
                actions
            },
            Err(error) => {
                if !self.roster.fail(generation) {
                    debug!(generation, "superseded contact list failure discarded");
                    return vec![];
                }
                warn!(%error, "contacts unavailable");
                vec![
                    ClientAction::Notify(Notice::ContactsUnavailable { error }),
                    ClientAction::Render,
                ]
            },
        }
    }

    fn on_preview_lookup(
        &mut self,
        generation: u64,
        contact_id: UserId,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        if generation != self.roster.generation() {
            return vec![];
        }
        match result.and_then(ApiResponse::into_conversation) {
            Ok(conversation) if !conversation.id.is_empty() => {
                let request = ApiRequest::FetchMessages {
                    conversation_id: conversation.id,
                    page: 1,
                    limit: 1,
                };
                vec![self.issue(Purpose::PreviewFetch { generation, contact_id }, request)]
            },
            Ok(_) => vec![],
            Err(error) => {
                debug!(contact = %contact_id, %error, "no conversation to preview");
                vec![]
            },
        }
    }

    fn on_preview_fetch(
        &mut self,
        generation: u64,
        contact_id: &UserId,
        result: Result<ApiResponse, ApiError>,
    ) -> Vec<ClientAction> {
        if generation != self.roster.generation() {
            return vec![];
        }
        match result.and_then(ApiResponse::into_messages) {
            Ok(page) => match page.newest() {
                Some(newest) if self.roster.set_preview(contact_id, newest) => {
                    vec![ClientAction::Render]
                },
                _ => vec![],
            },
            Err(error) => {
                debug!(contact = %contact_id, %error, "preview fetch failed");
                vec![]
            },
        }
    }

    fn handle_feed(&mut self, event: FeedEvent) -> Vec<ClientAction> {
        match event {
            FeedEvent::Status { subscription, status } => {
                match self.subscriptions.on_status(subscription, status) {
                    StatusOutcome::Ignored => vec![],
                    StatusOutcome::Live { refresh: None } => {
                        info!(subscription = subscription.0, "conversation feed live");
                        vec![ClientAction::Render]
                    },
                    StatusOutcome::Live { refresh: Some(conversation_id) } => {
                        info!(subscription = subscription.0, "conversation feed resumed");
                        let mut actions = self.handle_load(conversation_id, false);
                        actions.push(ClientAction::Render);
                        actions
                    },
                    StatusOutcome::Interrupted => {
                        warn!(subscription = subscription.0, ?status, "feed interrupted");
                        vec![ClientAction::Render]
                    },
                }
            },
            FeedEvent::Insert { subscription, conversation_id } => {
                if !self.subscriptions.accepts_insert(subscription, &conversation_id)
                    || !self.is_active_conversation(&conversation_id)
                {
                    debug!(
                        subscription = subscription.0,
                        conversation = %conversation_id,
                        "stale insert discarded"
                    );
                    return vec![];
                }
                self.issue_load(conversation_id, false)
            },
            FeedEvent::PresenceStatus(status) => {
                if !self.subscriptions.on_presence_status(status) {
                    return vec![];
                }
                let Some(user_id) = self.user.clone() else {
                    return vec![];
                };
                info!(user = %user_id, "presence channel live, announcing");
                vec![ClientAction::Track(PresenceAnnouncement {
                    user_id,
                    online_at: self.env.wall_clock(),
                })]
            },
            FeedEvent::Presence(event) => {
                let seen = self.subscriptions.apply_presence(event);
                self.roster.mark_seen(&seen, self.env.wall_clock());
                vec![ClientAction::Render]
            },
        }
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let timeout = self.config.request_timeout;
        let mut expired: Vec<Ticket> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| now - in_flight.issued_at >= timeout)
            .map(|(ticket, _)| *ticket)
            .collect();
        expired.sort_unstable();

        let mut actions = Vec::new();
        for ticket in expired {
            let Some(in_flight) = self.in_flight.remove(&ticket) else {
                continue;
            };
            let elapsed = now - in_flight.issued_at;
            warn!(%ticket, ?elapsed, purpose = ?in_flight.purpose, "request timed out");
            actions.extend(self.dispatch(in_flight.purpose, Err(ApiError::Timeout { elapsed })));
        }

        if let Some(requested) = self.reconcile_requested
            && now - requested >= self.config.reconcile_delay
        {
            self.reconcile_requested = None;
            if let Some(conversation_id) = self.active.conversation_id.clone() {
                debug!(conversation = %conversation_id, "reconciling sends");
                actions.extend(self.issue_load(conversation_id, false));
            }
        }
        actions
    }

    /// Request a confirmatory refresh after the reconcile delay.
    fn schedule_reconcile(&mut self) -> Vec<ClientAction> {
        if self.config.reconcile_delay.is_zero() {
            return match self.active.conversation_id.clone() {
                Some(conversation_id) => self.issue_load(conversation_id, false),
                None => vec![],
            };
        }
        if self.reconcile_requested.is_none() {
            self.reconcile_requested = Some(self.env.now());
        }
        vec![]
    }

    fn has_unconfirmed(&self, conversation_id: &ConversationId) -> bool {
        self.outbox.iter().any(|send| {
            &send.conversation_id == conversation_id
                && matches!(send.delivery, Delivery::Acknowledged { .. })
        })
    }

    /// Provisional entries whose persist call is still outstanding.
    fn pending_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        self.outbox
            .iter()
            .filter(|send| &send.conversation_id == conversation_id)
            .filter_map(|send| match &send.delivery {
                Delivery::Pending(message) => Some(message.clone()),
                Delivery::Acknowledged { .. } => None,
            })
            .collect()
    }

    fn resolve(&mut self, pair: ParticipantPair, waiter: Waiter) -> Option<ClientAction> {
        let request = self.resolver.resolve(pair.clone(), waiter)?;
        Some(self.issue(Purpose::Resolve { pair, stage: Stage::Lookup }, request))
    }

    fn issue(&mut self, purpose: Purpose, request: ApiRequest) -> ClientAction {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        debug!(%ticket, kind = ?request.kind(), "request issued");
        self.in_flight.insert(ticket, InFlight { purpose, issued_at: self.env.now() });
        ClientAction::Request { ticket, request }
    }

    fn is_active_conversation(&self, conversation_id: &ConversationId) -> bool {
        self.active.conversation_id.as_ref() == Some(conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_are_coalesced_to_one_trailing_action() {
        let actions = coalesce_renders(vec![
            ClientAction::Render,
            ClientAction::LeavePresence,
            ClientAction::Render,
        ]);

        assert_eq!(actions, vec![ClientAction::LeavePresence, ClientAction::Render]);
    }

    #[test]
    fn no_render_is_added_when_none_was_requested() {
        assert_eq!(coalesce_renders(vec![ClientAction::LeavePresence]), vec![
            ClientAction::LeavePresence
        ]);
    }
}
