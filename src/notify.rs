//! Change notifications for views rendering the same editing session.

use crossbeam::channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChangeEvent {
    #[serde(rename_all = "camelCase")]
    OverlayChanged {
        student_id: String,
        assessment_id: String,
    },
    OverlayCleared,
    LedgerRefreshed,
    #[serde(rename_all = "camelCase")]
    ExclusionChanged {
        student_id: String,
        assessment_id: String,
        excluded: bool,
    },
    Saved {
        count: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub revision: u64,
    pub event: ChangeEvent,
}

pub struct ChangeBus {
    subscribers: Vec<Sender<Notification>>,
    capacity: usize,
    revision: u64,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Vec::new(),
            capacity: capacity.max(1),
            revision: 0,
        }
    }

    pub fn subscribe(&mut self) -> Receiver<Notification> {
        let (sender, receiver) = crossbeam::channel::bounded(self.capacity);
        self.subscribers.push(sender);
        receiver
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Fan out to every live subscriber. Disconnected and lagging
    /// subscribers are dropped.
    pub fn publish(&mut self, event: ChangeEvent) {
        self.revision = self.revision.saturating_add(1);
        let note = Notification {
            revision: self.revision,
            event,
        };
        self.subscribers
            .retain(|sender| match sender.try_send(note.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(revision = note.revision, "dropping lagging change subscriber");
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            });
    }
}

/// Drain whatever is queued without blocking.
pub fn drain(receiver: &Receiver<Notification>) -> Vec<Notification> {
    receiver.try_iter().collect()
}
