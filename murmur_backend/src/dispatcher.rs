//! Sole consumer of the reply queue.
//!
//! Replies go out strictly one at a time with a fixed minimum spacing after
//! each send, independent of how fast the producers fill the queue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::generate::ReplyGenerator;
use crate::history::HistoryTracker;
use crate::prompt::PromptCrafter;
use crate::queue::{QueuedReply, ReplyReceiver};
use crate::state::lock;
use crate::transport::ChatSender;

pub const DEFAULT_DISPATCH_SPACING: Duration = Duration::from_secs(1);

pub struct Dispatcher {
    crafter: PromptCrafter,
    generator: Box<dyn ReplyGenerator>,
    sender: Arc<dyn ChatSender>,
    history: Arc<Mutex<HistoryTracker>>,
    spacing: Duration,
}

impl Dispatcher {
    pub fn new(
        crafter: PromptCrafter,
        generator: Box<dyn ReplyGenerator>,
        sender: Arc<dyn ChatSender>,
        history: Arc<Mutex<HistoryTracker>>,
    ) -> Self {
        Self {
            crafter,
            generator,
            sender,
            history,
            spacing: DEFAULT_DISPATCH_SPACING,
        }
    }

    pub fn with_spacing(mut self, spacing: Duration) -> Self {
        self.spacing = spacing;
        self
    }

    /// Craft, generate, record and send a single reply.
    pub async fn dispatch(&self, reply: QueuedReply) -> Result<()> {
        let target = reply.target;
        let waited = Utc::now().signed_duration_since(reply.enqueued_at);
        tracing::info!(
            "Replying to {} (reply {}, queued {} ms)",
            target,
            reply.id,
            waited.num_milliseconds()
        );

        let crafted = {
            let history = lock(&self.history);
            self.crafter.craft(&history, &target.text)
        };
        if let Some(e) = &crafted.render_error {
            tracing::warn!("Prompt rendering failed, using raw message instead: {}", e);
        }
        tracing::debug!("Prompt crafted: {:?}", crafted.text);

        let body = self
            .generator
            .generate(&crafted.text, &target)
            .await
            .with_context(|| format!("{} generator failed", self.generator.name()))?;

        lock(&self.history).append_pair(target.text.clone(), body.clone());

        self.sender
            .send_message(&target.channel, &body)
            .with_context(|| format!("Failed to send reply to {}", target.channel))?;
        Ok(())
    }

    pub async fn run(self, queue: ReplyReceiver, cancel: CancellationToken) {
        tracing::info!("Dispatcher started (spacing {:?})", self.spacing);

        loop {
            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = queue.recv() => match next {
                    Some(reply) => reply,
                    None => break,
                },
            };

            if let Err(e) = self.dispatch(reply).await {
                tracing::warn!("Reply dispatch failed: {:#}", e);
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(self.spacing) => {}
            }
        }

        tracing::info!(
            "Dispatcher stopped ({} pending, {} dropped)",
            queue.len(),
            queue.dropped()
        );
    }
}
