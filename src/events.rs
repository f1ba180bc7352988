//! Moderation events
//!
//! Outcomes are broadcast to any number of subscribers (owner notifications,
//! audit logging). Publishing never blocks; a slow subscriber lags and
//! misses events rather than stalling moderation.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::moderation::{Decision, Fingerprint, ReviewCase, UserRef};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModerationEvent {
    /// A submission reached a final or provisional decision
    Decided {
        user: UserRef,
        fingerprint: Option<Fingerprint>,
        decision: Decision,
    },

    ScoringFailed {
        user: UserRef,
        fingerprint: Fingerprint,
        error: String,
    },

    ReviewOpened {
        case: ReviewCase,
    },

    ReviewResolved {
        case: ReviewCase,
        decision: Decision,
    },

    /// A Pending case older than the review deadline
    ReviewOverdue {
        case: ReviewCase,
    },
}

impl ModerationEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ModerationEvent::Decided { .. } => "decided",
            ModerationEvent::ScoringFailed { .. } => "scoring_failed",
            ModerationEvent::ReviewOpened { .. } => "review_opened",
            ModerationEvent::ReviewResolved { .. } => "review_resolved",
            ModerationEvent::ReviewOverdue { .. } => "review_overdue",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ModerationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModerationEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: ModerationEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
