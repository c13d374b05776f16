pub mod irc;
pub mod stdin;
pub mod twitch;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use stdin::StdinTransport;
pub use twitch::TwitchIrcTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// A message posted to a channel (IRC `PRIVMSG`).
    ChannelMessage,
    Other(String),
}

/// A parsed event delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub sender: String,
    pub channel: String,
    pub text: String,
    pub kind: CommandKind,
}

impl ChatEvent {
    pub fn channel_message(
        sender: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            channel: channel.into(),
            text: text.into(),
            kind: CommandKind::ChannelMessage,
        }
    }
}

/// Outgoing half of a transport. Must return without waiting on the network.
pub trait ChatSender: Send + Sync {
    fn send_message(&self, channel: &str, text: &str) -> Result<()>;
}

#[async_trait]
pub trait ChatTransport: ChatSender {
    /// Human-readable transport name
    fn name(&self) -> &str;

    /// Queue a JOIN; delivered once the connection is up.
    fn join_channel(&self, channel: &str) -> Result<()>;

    /// Drive the connection until `cancel` fires or the connection fails.
    /// Parsed events are pushed into `events` without blocking.
    async fn run(&self, events: flume::Sender<ChatEvent>, cancel: CancellationToken) -> Result<()>;
}

/// Hand an event to the ingestion stage, shedding it if the stage is backed up.
pub(crate) fn forward_event(events: &flume::Sender<ChatEvent>, event: ChatEvent) -> bool {
    match events.try_send(event) {
        Ok(()) => true,
        Err(flume::TrySendError::Full(event)) => {
            tracing::warn!(
                "Ingest channel full, dropping event from {} in {}",
                event.sender,
                event.channel
            );
            false
        }
        Err(flume::TrySendError::Disconnected(_)) => false,
    }
}

/// `#channel`, lowercased, as IRC servers expect.
pub fn normalize_channel(channel: &str) -> String {
    let trimmed = channel.trim().trim_start_matches('#');
    format!("#{}", trimmed.to_lowercase())
}
