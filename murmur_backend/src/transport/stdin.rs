//! Offline transport for `--dry-run`: chat comes from stdin, replies go to the log.
//!
//! Input lines look like `sender #channel message text`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use super::{forward_event, normalize_channel, ChatEvent, ChatSender, ChatTransport};

#[derive(Debug, Default)]
pub struct StdinTransport;

impl StdinTransport {
    pub fn new() -> Self {
        Self
    }
}

impl ChatSender for StdinTransport {
    fn send_message(&self, channel: &str, text: &str) -> Result<()> {
        tracing::info!("[dry-run] {} <- {}", normalize_channel(channel), text);
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for StdinTransport {
    fn name(&self) -> &str {
        "stdin"
    }

    fn join_channel(&self, channel: &str) -> Result<()> {
        tracing::info!("[dry-run] joined {}", normalize_channel(channel));
        Ok(())
    }

    async fn run(&self, events: flume::Sender<ChatEvent>, cancel: CancellationToken) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                line = lines.next_line() => {
                    match line.context("Failed to read stdin")? {
                        Some(line) => match parse_line(&line) {
                            Some(event) => {
                                forward_event(&events, event);
                            }
                            None => tracing::warn!("Ignoring malformed input line: {:?}", line),
                        },
                        None => {
                            tracing::info!("stdin closed, ending session");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn parse_line(line: &str) -> Option<ChatEvent> {
    let mut parts = line.trim().splitn(3, char::is_whitespace);
    let sender = parts.next().filter(|s| !s.is_empty())?;
    let channel = parts.next().filter(|s| !s.is_empty())?;
    let text = parts.next().map(str::trim).filter(|s| !s.is_empty())?;
    Some(ChatEvent::channel_message(
        sender,
        normalize_channel(channel),
        text,
    ))
}
