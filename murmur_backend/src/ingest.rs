//! Ingestion stage: the only writer of the sample window and of
//! `last_message_time`.

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::message::ChatMessage;
use crate::queue::{EnqueueOutcome, ReplySender};
use crate::state::{lock, SharedState};
use crate::transport::{ChatEvent, CommandKind};

pub struct MessageIngester {
    mention_tag: String,
    reply_mention: bool,
    state: SharedState,
    replies: ReplySender,
}

impl MessageIngester {
    pub fn new(
        display_name: &str,
        reply_mention: bool,
        state: SharedState,
        replies: ReplySender,
    ) -> Self {
        Self {
            mention_tag: format!("@{}", display_name),
            reply_mention,
            state,
            replies,
        }
    }

    /// Handle one transport event. Never waits: each lock is held for a
    /// single update and the reply queue is written with `try_send`.
    ///
    /// Returns the enqueue outcome when the event was a mention.
    pub fn ingest(&self, event: ChatEvent) -> Option<EnqueueOutcome> {
        if event.kind != CommandKind::ChannelMessage {
            tracing::trace!("Ignoring {:?} event in {}", event.kind, event.channel);
            return None;
        }

        let message = ChatMessage::new(event.sender, event.text, event.channel);
        let mut mention_outcome = None;

        if self.reply_mention && message.text.contains(&self.mention_tag) {
            tracing::info!("Got mentioned: {}", message);
            let stripped = message.text.replace(&self.mention_tag, "");
            let direct = ChatMessage::new(
                message.sender.clone(),
                stripped.trim(),
                message.channel.clone(),
            );
            mention_outcome = Some(self.replies.try_enqueue(direct));
        }

        {
            let mut window = lock(&self.state.window);
            if let Some(evicted) = window.push(message) {
                tracing::debug!("Sample window full, evicted: {}", evicted);
            }
        }
        lock(&self.state.scheduler).last_message_time = Some(Instant::now());

        mention_outcome
    }

    pub async fn run(self, events: flume::Receiver<ChatEvent>, cancel: CancellationToken) {
        tracing::info!("Ingestion stage started (mention tag {})", self.mention_tag);
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = events.recv_async() => match next {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };
            self.ingest(event);
        }
        tracing::info!("Ingestion stage stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::reply_queue;

    fn ingester(window: usize, queue: usize) -> (MessageIngester, crate::queue::ReplyReceiver, SharedState) {
        let state = SharedState::new(window);
        let (tx, rx) = reply_queue(queue);
        (MessageIngester::new("bot", true, state.clone(), tx), rx, state)
    }

    #[test]
    fn mention_is_stripped_and_queued_immediately() {
        let (ingester, rx, state) = ingester(5, 5);
        let outcome = ingester.ingest(ChatEvent::channel_message("U", "#c", "@bot hello"));

        assert_eq!(outcome, Some(EnqueueOutcome::Queued));
        let queued = rx.try_recv().unwrap();
        assert_eq!(queued.target, ChatMessage::new("U", "hello", "#c"));

        let window = lock(&state.window);
        assert_eq!(window.len(), 1);
        assert_eq!(window.iter().next().unwrap().text, "@bot hello");
    }

    #[test]
    fn plain_messages_only_feed_the_window() {
        let (ingester, rx, state) = ingester(5, 5);
        assert_eq!(ingester.ingest(ChatEvent::channel_message("U", "#c", "just chatting")), None);
        assert!(rx.is_empty());
        assert_eq!(lock(&state.window).len(), 1);
        assert!(lock(&state.scheduler).last_message_time.is_some());
    }

    #[test]
    fn every_occurrence_of_the_tag_is_removed() {
        let (ingester, rx, _state) = ingester(5, 5);
        ingester.ingest(ChatEvent::channel_message("U", "#c", "@bot hi @bot again"));
        assert_eq!(rx.try_recv().unwrap().target.text, "hi  again");
    }

    #[test]
    fn bare_mention_is_still_queued() {
        let (ingester, rx, state) = ingester(5, 5);
        assert_eq!(
            ingester.ingest(ChatEvent::channel_message("U", "#c", "@bot")),
            Some(EnqueueOutcome::Queued)
        );
        assert_eq!(
            ingester.ingest(ChatEvent::channel_message("U", "#c", "  @bot ")),
            Some(EnqueueOutcome::Queued)
        );
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.try_recv().unwrap().target.text, "");
        assert_eq!(lock(&state.window).len(), 2);
    }

    #[test]
    fn mentions_are_ignored_when_disabled() {
        let state = SharedState::new(5);
        let (tx, rx) = reply_queue(5);
        let ingester = MessageIngester::new("bot", false, state.clone(), tx);
        assert_eq!(ingester.ingest(ChatEvent::channel_message("U", "#c", "@bot hello")), None);
        assert!(rx.is_empty());
        assert_eq!(lock(&state.window).len(), 1);
    }

    #[test]
    fn mention_into_full_queue_is_dropped_but_still_sampled() {
        let (ingester, rx, state) = ingester(5, 1);
        ingester.ingest(ChatEvent::channel_message("A", "#c", "@bot first"));
        let outcome = ingester.ingest(ChatEvent::channel_message("B", "#c", "@bot second"));

        assert_eq!(outcome, Some(EnqueueOutcome::Dropped));
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.dropped(), 1);
        assert_eq!(lock(&state.window).len(), 2);
    }

    #[test]
    fn non_channel_events_are_ignored() {
        let (ingester, rx, state) = ingester(5, 5);
        let event = ChatEvent {
            sender: "tmi".to_string(),
            channel: "#c".to_string(),
            text: "@bot".to_string(),
            kind: CommandKind::Other("NOTICE".to_string()),
        };
        assert_eq!(ingester.ingest(event), None);
        assert!(rx.is_empty());
        assert!(lock(&state.window).is_empty());
        assert!(lock(&state.scheduler).last_message_time.is_none());
    }

    #[tokio::test]
    async fn run_drains_events_until_cancelled() {
        let (ingester, rx, state) = ingester(5, 5);
        let (event_tx, event_rx) = flume::bounded(8);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ingester.run(event_rx, cancel.clone()));

        event_tx
            .send_async(ChatEvent::channel_message("U", "#c", "@bot ping"))
            .await
            .unwrap();
        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.target.text, "ping");

        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(lock(&state.window).len(), 1);
    }
}
