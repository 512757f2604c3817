//! Ordered notification channel from worker threads to the presentation consumer.
//!
//! Workers never touch consumer state directly. Every visible change is
//! enqueued here as a [`Notification`] and applied by the consumer on its own
//! task, strictly in enqueue order.
//!
//! Enqueue stamps each notification with a global sequence number under the
//! same lock that pushes it, so sequence order and delivery order are the
//! same thing.

use crate::turn::TurnId;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One atomic unit of consumer-visible state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The assistant started or stopped generating a response.
    ThinkingStateChanged { active: bool },
    /// The assistant started or stopped speaking.
    TalkingStateChanged { active: bool },
    /// A response (or fallback text) is ready to show.
    MessageReady { text: String },
    /// The transcript should be emptied.
    HistoryCleared,
}

/// A notification with its delivery metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEnvelope {
    /// Global enqueue position, starting at 0.
    pub seq: u64,
    /// Turn that produced the notification.
    pub turn: TurnId,
    pub notification: Notification,
}

struct SenderState {
    next_seq: u64,
    tx: mpsc::UnboundedSender<NotificationEnvelope>,
}

/// Producer half. Cheap to clone and safe to use from any thread.
#[derive(Clone)]
pub struct NotificationSender {
    state: Arc<Mutex<SenderState>>,
}

impl NotificationSender {
    /// Enqueue a notification.
    ///
    /// Returns `false` if the consumer has gone away. Producers treat that as
    /// non-fatal; the turn still runs to completion.
    pub fn emit(&self, turn: TurnId, notification: Notification) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = state.next_seq;
        debug!(turn = %turn, seq, ?notification, "notification enqueued");
        let envelope = NotificationEnvelope {
            seq,
            turn,
            notification,
        };
        if state.tx.send(envelope).is_err() {
            warn!(turn = %turn, seq, "notification consumer closed; dropping");
            return false;
        }
        state.next_seq += 1;
        true
    }

    /// Number of notifications successfully enqueued so far.
    pub fn emitted(&self) -> u64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_seq
    }
}

/// Consumer half. Owned by the single presentation consumer.
pub struct NotificationReceiver {
    rx: mpsc::UnboundedReceiver<NotificationEnvelope>,
}

impl NotificationReceiver {
    /// Wait for the next notification. `None` once every sender is dropped
    /// and the queue is empty.
    pub async fn recv(&mut self) -> Option<NotificationEnvelope> {
        self.rx.recv().await
    }

    /// Take everything currently queued without waiting.
    pub fn drain_pending(&mut self) -> Vec<NotificationEnvelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            out.push(envelope);
        }
        out
    }
}

/// Create a connected sender/receiver pair.
pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sender = NotificationSender {
        state: Arc::new(Mutex::new(SenderState { next_seq: 0, tx })),
    };
    (sender, NotificationReceiver { rx })
}
