//! Actor loop owning the engine.
//!
//! The [`Runtime`] is the only owner of the [`Client`]. One task multiplexes
//! every input through `select!`:
//! - intents from [`ChatHandle`]s
//! - request completions from the spawned request tasks
//! - change-feed traffic
//! - the tick clock that expires requests and drives reconciliation
//!
//! Each input becomes one engine event; the returned actions are executed
//! before the next input is taken, so the engine never sees concurrent calls.

use chatsync_client::{
    ApiError, ApiRequest, ApiResponse, Client, ClientAction, ClientConfig, ClientEvent,
    Environment, Notice, Snapshot, Ticket,
};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{Backend, ChangeFeed, ChatHandle, RuntimeConfig, command::Command};

type Completion = (Ticket, Result<ApiResponse, ApiError>);

/// Orchestrates the engine, its backend and its change feed.
///
/// # Type Parameters
///
/// - `B`: Request executor
/// - `F`: Realtime channel transport
/// - `E`: Clock source
pub struct Runtime<B, F, E>
where
    B: Backend,
    F: ChangeFeed,
    E: Environment,
{
    client: Client<E>,
    env: E,
    backend: B,
    feed: F,
    config: RuntimeConfig,
    commands: mpsc::Receiver<Command>,
    requests: JoinSet<Completion>,
    snapshots: watch::Sender<Snapshot>,
    notices: broadcast::Sender<Notice>,
}

impl<B, F, E> Runtime<B, F, E>
where
    B: Backend,
    F: ChangeFeed,
    E: Environment,
{
    /// Create a runtime and the handle that drives it.
    ///
    /// Nothing happens until [`run`](Self::run) is awaited.
    pub fn new(
        env: E,
        client_config: ClientConfig,
        config: RuntimeConfig,
        backend: B,
        feed: F,
    ) -> (Self, ChatHandle) {
        let client = Client::new(env.clone(), client_config);
        let (command_tx, commands) = mpsc::channel(config.command_buffer.max(1));
        let (snapshots, snapshot_rx) = watch::channel(client.snapshot());
        let (notices, _) = broadcast::channel(config.notice_buffer.max(1));

        let handle = ChatHandle::new(command_tx, snapshot_rx, notices.clone());
        let runtime = Self {
            client,
            env,
            backend,
            feed,
            config,
            commands,
            requests: JoinSet::new(),
            snapshots,
            notices,
        };
        (runtime, handle)
    }

    /// Run until [`ChatHandle::shutdown`] or until every handle is dropped.
    ///
    /// On exit the engine is torn down, so channels are released and the
    /// final snapshot is published.
    pub async fn run(mut self) {
        let mut tick = time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut activity = time::interval(self.config.activity_refresh);
        activity.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("runtime started");
        loop {
            let event = tokio::select! {
                command = self.commands.recv() => {
                    match command.and_then(Command::into_event) {
                        Some(event) => event,
                        None => break,
                    }
                },
                Some(joined) = self.requests.join_next() => match joined {
                    Ok((ticket, result)) => ClientEvent::Completed { ticket, result },
                    Err(error) => {
                        // The engine expires the ticket on a later tick.
                        warn!(%error, "request task failed");
                        continue;
                    },
                },
                Some(event) = self.feed.next_event() => ClientEvent::Feed(event),
                _ = tick.tick() => ClientEvent::Tick { now: self.env.now() },
                _ = activity.tick() => {
                    self.publish();
                    continue;
                },
            };
            self.step(event);
        }

        self.step(ClientEvent::Teardown);
        self.requests.abort_all();
        info!("runtime stopped");
    }

    /// Feed one event to the engine and carry out its actions.
    fn step(&mut self, event: ClientEvent<E::Instant>) {
        let actions = self.client.handle(event);
        self.execute(actions);
    }

    fn execute(&mut self, actions: Vec<ClientAction>) {
        for action in actions {
            match action {
                ClientAction::Request { ticket, request } => self.spawn_request(ticket, request),
                ClientAction::Subscribe { subscription, conversation_id } => {
                    let id = subscription.0;
                    debug!(subscription = id, conversation = %conversation_id, "subscribe");
                    self.feed.subscribe(subscription, conversation_id);
                },
                ClientAction::Unsubscribe { subscription } => {
                    debug!(subscription = subscription.0, "unsubscribe");
                    self.feed.unsubscribe(subscription);
                },
                ClientAction::JoinPresence { user_id } => self.feed.join_presence(user_id),
                ClientAction::LeavePresence => self.feed.leave_presence(),
                ClientAction::Track(announcement) => self.feed.track(announcement),
                ClientAction::Notify(notice) => {
                    info!(%notice, "notice");
                    if self.notices.send(notice).is_err() {
                        debug!("no notice subscribers");
                    }
                },
                ClientAction::Render => self.publish(),
            }
        }
    }

    fn spawn_request(&mut self, ticket: Ticket, request: ApiRequest) {
        let backend = self.backend.clone();
        self.requests.spawn(async move {
            let result = backend.execute(request).await;
            (ticket, result)
        });
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.client.snapshot());
    }
}
