//! Twitch chat transport over IRC-on-WebSocket.
//!
//! `run` connects to the configured server, logs in with `PASS`/`NICK`, then:
//! - Answers `PING` with `PONG` itself.
//! - Forwards every line that targets a channel to the ingest channel.
//! - Writes queued outbound lines (JOIN, PRIVMSG) in order.
//!
//! There is no reconnect: a closed or failed socket ends `run` with an error.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::irc::{self, IrcMessage};
use super::{forward_event, ChatEvent, ChatSender, ChatTransport};
use crate::config::TwitchIrcConfig;

pub struct TwitchIrcTransport {
    server_url: String,
    username: String,
    password: String,
    outbound_tx: flume::Sender<String>,
    outbound_rx: flume::Receiver<String>,
}

impl TwitchIrcTransport {
    pub fn new(config: &TwitchIrcConfig) -> Self {
        let (outbound_tx, outbound_rx) = flume::unbounded();
        Self {
            server_url: config.server_url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            outbound_tx,
            outbound_rx,
        }
    }

    fn queue_line(&self, line: String) -> Result<()> {
        self.outbound_tx
            .send(line)
            .map_err(|_| anyhow!("Twitch outbound queue closed"))
    }
}

impl ChatSender for TwitchIrcTransport {
    fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        self.queue_line(irc::privmsg(channel, text))
    }
}

#[async_trait]
impl ChatTransport for TwitchIrcTransport {
    fn name(&self) -> &str {
        "twitch"
    }

    fn join_channel(&self, channel: &str) -> Result<()> {
        self.queue_line(irc::join(channel))
    }

    async fn run(&self, events: flume::Sender<ChatEvent>, cancel: CancellationToken) -> Result<()> {
        tracing::info!("Twitch: connecting to {}", self.server_url);
        let (ws_stream, _) = tokio_tungstenite::connect_async(self.server_url.as_str())
            .await
            .with_context(|| format!("Failed to connect to {}", self.server_url))?;
        let (mut write, mut read) = ws_stream.split();

        write
            .send(Message::Text(irc::pass(&self.password)))
            .await
            .context("Failed to send PASS")?;
        write
            .send(Message::Text(irc::nick(&self.username)))
            .await
            .context("Failed to send NICK")?;
        tracing::info!("Twitch: logged in as {}", self.username);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Twitch: shutting down connection");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                outbound = self.outbound_rx.recv_async() => {
                    let line = outbound.map_err(|_| anyhow!("Twitch outbound queue closed"))?;
                    tracing::debug!("Twitch > {}", line);
                    write
                        .send(Message::Text(line))
                        .await
                        .context("Failed to write to Twitch socket")?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(frame))) => {
                            bail!("Twitch closed the connection: {:?}", frame);
                        }
                        None => bail!("Twitch connection ended"),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("Twitch socket error"),
                    };

                    for line in text.split("\r\n").filter(|l| !l.trim().is_empty()) {
                        if let Some(reply) = handle_line(line, &events) {
                            write
                                .send(Message::Text(reply))
                                .await
                                .context("Failed to write to Twitch socket")?;
                        }
                    }
                }
            }
        }
    }
}

/// Process one inbound line. Returns a line to write back, if any.
fn handle_line(line: &str, events: &flume::Sender<ChatEvent>) -> Option<String> {
    let message = match IrcMessage::parse(line) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!("Twitch: discarding unparseable line ({}): {:?}", e, line);
            return None;
        }
    };

    match message.command.as_str() {
        "PING" => return Some(irc::pong(&message.params)),
        "NOTICE" => {
            tracing::warn!(
                "Twitch NOTICE ({}): {}",
                message.tag("msg-id").unwrap_or("-"),
                message.params.join(" ")
            );
        }
        "RECONNECT" => {
            tracing::warn!("Twitch requested a reconnect; the session will end when the socket closes");
        }
        _ => {}
    }

    if let Some(event) = message.into_chat_event() {
        tracing::trace!("Twitch < [{}] {}: {}", event.channel, event.sender, event.text);
        forward_event(events, event);
    }
    None
}
