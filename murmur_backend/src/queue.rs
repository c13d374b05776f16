//! Bounded hand-off between reply producers and the dispatcher.
//!
//! Enqueue never waits: when the queue is full the new reply is shed and
//! counted. Fresh replies matter more than answering every message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flume::TrySendError;
use uuid::Uuid;

use crate::message::ChatMessage;

pub const DEFAULT_REPLY_QUEUE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct QueuedReply {
    pub id: Uuid,
    pub target: ChatMessage,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue was at capacity; the reply was discarded.
    Dropped,
    /// The dispatcher is gone (session shutting down).
    Closed,
}

/// Producer handle. Cheap to clone; the ingester and sampler each hold one.
#[derive(Clone)]
pub struct ReplySender {
    tx: flume::Sender<QueuedReply>,
    dropped: Arc<AtomicU64>,
}

/// Consumer handle, owned by the dispatcher.
pub struct ReplyReceiver {
    rx: flume::Receiver<QueuedReply>,
    dropped: Arc<AtomicU64>,
}

pub fn reply_queue(capacity: usize) -> (ReplySender, ReplyReceiver) {
    let (tx, rx) = flume::bounded(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        ReplySender {
            tx,
            dropped: dropped.clone(),
        },
        ReplyReceiver { rx, dropped },
    )
}

impl ReplySender {
    pub fn try_enqueue(&self, target: ChatMessage) -> EnqueueOutcome {
        let reply = QueuedReply {
            id: Uuid::new_v4(),
            target,
            enqueued_at: Utc::now(),
        };

        match self.tx.try_send(reply) {
            Ok(()) => EnqueueOutcome::Queued,
            Err(TrySendError::Full(reply)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Reply queue is full ({} pending), dropping: {}",
                    self.tx.len(),
                    reply.target
                );
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Disconnected(reply)) => {
                tracing::debug!("Reply queue closed, discarding: {}", reply.target);
                EnqueueOutcome::Closed
            }
        }
    }

    /// Total number of replies shed because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ReplyReceiver {
    /// Wait for the next reply; `None` once every sender is gone.
    pub async fn recv(&self) -> Option<QueuedReply> {
        self.rx.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<QueuedReply> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
