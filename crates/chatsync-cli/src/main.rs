//! Chatsync command-line client.
//!
//! Drives the full runtime against a REST backend. Without a realtime
//! endpoint the feed is detached, so every command is one fetch-and-print.
//!
//! # Usage
//!
//! ```bash
//! export CHATSYNC_URL=https://chat.example.com/api
//! export CHATSYNC_TOKEN=...
//! export CHATSYNC_USER=user-123
//!
//! chatsync contacts --search ana
//! chatsync history user-456
//! chatsync send user-456 "see you at noon"
//! ```

use std::{
    io::{self, Write},
    time::Duration,
};

use chatsync_app::{ChatHandle, DetachedFeed, Runtime, RuntimeConfig, RuntimeError, SystemEnv};
use chatsync_client::{
    ClientConfig, Contact, Notice, Snapshot,
    transport::{HttpTransport, TransportConfig, TransportError},
};
use clap::{Parser, Subcommand};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Chatsync command-line client
#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(about = "Read and send chat messages from the terminal")]
#[command(version)]
struct Args {
    /// API root of the chat backend
    #[arg(long, env = "CHATSYNC_URL")]
    base_url: String,

    /// Bearer token
    #[arg(long, env = "CHATSYNC_TOKEN", hide_env_values = true)]
    token: String,

    /// Signed-in user id
    #[arg(long, env = "CHATSYNC_USER")]
    user: String,

    /// Seconds to wait for the backend before giving up
    #[arg(long, default_value = "20")]
    wait_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// List contacts
    Contacts {
        /// Only contacts whose name or email matches
        #[arg(short, long)]
        search: Option<String>,
    },
    /// Print the conversation with a contact
    History {
        /// Contact user id
        contact: String,
    },
    /// Send a message to a contact
    Send {
        /// Contact user id
        contact: String,
        /// Message text
        message: String,
        /// Attached image URL
        #[arg(long)]
        image: Option<String>,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("runtime stopped unexpectedly")]
    Runtime(#[from] RuntimeError),

    #[error("no answer from the backend within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Failed(Notice),

    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    let transport = HttpTransport::new(TransportConfig::new(&args.base_url), args.token.as_str())?;
    let client_config = ClientConfig { load_previews: false, ..ClientConfig::default() };
    let (runtime, handle) = Runtime::new(
        SystemEnv,
        client_config,
        RuntimeConfig::default(),
        transport,
        DetachedFeed::new(),
    );
    let task = tokio::spawn(runtime.run());

    let session = Session { handle, wait: Duration::from_secs(args.wait_secs) };
    session.handle.sign_in(args.user.as_str()).await?;
    let outcome = session.perform(args.command).await;

    session.handle.shutdown().await?;
    if task.await.is_err() {
        tracing::warn!("runtime task did not finish cleanly");
    }
    outcome
}

struct Session {
    handle: ChatHandle,
    wait: Duration,
}

impl Session {
    async fn perform(&self, action: Action) -> Result<(), CliError> {
        match action {
            Action::Contacts { search } => self.contacts(search).await,
            Action::History { contact } => {
                let snapshot = self.open(&contact).await?;
                print_history(&snapshot)
            },
            Action::Send { contact, message, image } => self.send(&contact, &message, image).await,
        }
    }

    async fn contacts(&self, search: Option<String>) -> Result<(), CliError> {
        let notices = self.handle.notices();
        match search {
            Some(term) => self.handle.search_contacts(term).await?,
            None => self.handle.load_contacts().await?,
        }

        // An empty roster looks the same as one still in flight.
        let snapshot = match self.settle(notices, |s| !s.contacts.is_empty()).await {
            Err(CliError::Timeout(_)) if !self.handle.snapshot().contacts_loading => {
                self.handle.snapshot()
            },
            other => other?,
        };

        let mut out = io::stdout().lock();
        if snapshot.contacts.is_empty() {
            writeln!(out, "no contacts")?;
        }
        for entry in &snapshot.contacts {
            let status = if entry.online { "online" } else { "offline" };
            writeln!(
                out,
                "{:<24} {:<28} {:<32} {status}",
                entry.contact.id, entry.contact.full_name, entry.contact.email
            )?;
        }
        Ok(())
    }

    async fn open(&self, contact_id: &str) -> Result<Snapshot, CliError> {
        let notices = self.handle.notices();
        self.handle.select_contact(Contact::new(contact_id, contact_id, "")).await?;
        self.settle(notices, |s| {
            s.active_contact.as_ref().is_some_and(|c| c.id.as_str() == contact_id)
                && s.active_conversation_id.is_some()
                && !s.is_loading
                && !s.is_initial_load
        })
        .await
    }

    async fn send(
        &self,
        contact_id: &str,
        content: &str,
        image_url: Option<String>,
    ) -> Result<(), CliError> {
        let opened = self.open(contact_id).await?;
        let confirmed = |s: &Snapshot, content: &str| {
            s.messages_with_content(content).filter(|m| !m.is_provisional()).count()
        };
        let before = confirmed(&opened, content);

        let notices = self.handle.notices();
        self.handle.send_message(contact_id, content, image_url).await?;
        let snapshot = self.settle(notices, |s| confirmed(s, content) > before).await?;

        tracing::info!(conversation = ?snapshot.active_conversation_id, "message sent");
        print_history(&snapshot)
    }

    /// Wait for `ready`, failing on the first notice or after the deadline.
    async fn settle(
        &self,
        mut notices: broadcast::Receiver<Notice>,
        ready: impl FnMut(&Snapshot) -> bool,
    ) -> Result<Snapshot, CliError> {
        let waiting = async {
            tokio::select! {
                snapshot = self.handle.wait_for(ready) => Ok(snapshot?),
                notice = notices.recv() => match notice {
                    Ok(notice) => Err(CliError::Failed(notice)),
                    Err(_) => Err(CliError::Runtime(RuntimeError::Closed)),
                },
            }
        };
        tokio::time::timeout(self.wait, waiting).await.map_err(|_| CliError::Timeout(self.wait))?
    }
}

fn print_history(snapshot: &Snapshot) -> Result<(), CliError> {
    let mut out = io::stdout().lock();
    for message in &snapshot.messages {
        writeln!(
            out,
            "{} {:<16} {}",
            message.created_at.format("%Y-%m-%d %H:%M"),
            message.sender_id,
            message.content
        )?;
        if let Some(url) = &message.image_url {
            writeln!(out, "{:<33}[image] {url}", "")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let base = ["chatsync", "--base-url", "http://localhost", "--token", "t", "--user", "ana"];
        Args::try_parse_from(base.iter().chain(extra)).unwrap()
    }

    #[test]
    fn send_takes_contact_and_text() {
        let args = parse(&["send", "bob", "hello there"]);
        assert!(matches!(
            args.command,
            Action::Send { contact, message, image: None }
                if contact == "bob" && message == "hello there"
        ));
    }

    #[test]
    fn contacts_search_is_optional() {
        assert!(matches!(parse(&["contacts"]).command, Action::Contacts { search: None }));
        assert!(matches!(
            parse(&["contacts", "-s", "ana"]).command,
            Action::Contacts { search: Some(term) } if term == "ana"
        ));
    }

    #[test]
    fn history_requires_a_contact() {
        let base = ["chatsync", "--base-url", "x", "--token", "t", "--user", "ana", "history"];
        assert!(Args::try_parse_from(base).is_err());
    }
}
