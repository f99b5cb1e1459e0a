use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::models::BatchStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    /// Emitted after every item settles
    Progress {
        batch_id: Uuid,
        progress: u8,
        completed: i32,
        failed: i32,
        total: i32,
    },
    /// Emitted once, when the batch reaches a terminal status
    Completed {
        batch_id: Uuid,
        status: BatchStatus,
        error: Option<String>,
    },
}

impl BatchEvent {
    pub fn batch_id(&self) -> Uuid {
        match self {
            BatchEvent::Progress { batch_id, .. } | BatchEvent::Completed { batch_id, .. } => {
                *batch_id
            }
        }
    }
}

pub type BatchListener = Arc<dyn Fn(&BatchEvent) + Send + Sync>;

type ListenerMap = DashMap<u64, BatchListener>;

/// Registered batch listeners, keyed by subscription id.
#[derive(Default)]
pub struct BatchObservers {
    listeners: Arc<ListenerMap>,
    next_id: AtomicU64,
}

impl BatchObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: BatchListener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// Call every listener with `event`.
    pub fn emit(&self, event: &BatchEvent) {
        // Snapshot first so a listener may subscribe or unsubscribe without
        // deadlocking on the map shard.
        let listeners: Vec<BatchListener> =
            self.listeners.iter().map(|entry| entry.value().clone()).collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

/// Handle returned by [`BatchObservers::subscribe`]; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(&self.id);
        }
    }
}
