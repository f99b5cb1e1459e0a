use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

/// Bounded in-memory set of job ids currently executing.
///
/// The set never holds more than `capacity` ids; `try_acquire` is the only
/// way in, so the bound holds for every caller.
#[derive(Clone)]
pub struct ConcurrencyGate {
    inner: Arc<RwLock<GateState>>,
    capacity: usize,
}

#[derive(Default)]
struct GateState {
    running: HashSet<Uuid>,
    peak: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GateState::default())),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Take a slot for `id`. Returns false when the gate is full or `id` already holds one.
    pub async fn try_acquire(&self, id: Uuid) -> bool {
        let mut state = self.inner.write().await;
        if state.running.len() >= self.capacity || state.running.contains(&id) {
            return false;
        }
        state.running.insert(id);
        state.peak = state.peak.max(state.running.len());
        true
    }

    /// Free the slot held by `id`. Releasing an id that holds none is a no-op.
    pub async fn release(&self, id: Uuid) -> bool {
        self.inner.write().await.running.remove(&id)
    }

    pub async fn size(&self) -> usize {
        self.inner.read().await.running.len()
    }

    pub async fn available(&self) -> usize {
        self.capacity.saturating_sub(self.size().await)
    }

    pub async fn contains(&self, id: Uuid) -> bool {
        self.inner.read().await.running.contains(&id)
    }

    pub async fn snapshot(&self) -> Vec<Uuid> {
        self.inner.read().await.running.iter().copied().collect()
    }

    /// Free every slot, returning how many were held.
    pub async fn clear(&self) -> usize {
        let mut state = self.inner.write().await;
        let held = state.running.len();
        state.running.clear();
        held
    }

    /// Highest occupancy seen since creation.
    pub async fn peak(&self) -> usize {
        self.inner.read().await.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_respects_capacity() {
        let gate = ConcurrencyGate::new(2);
        assert!(gate.try_acquire(Uuid::new_v4()).await);
        assert!(gate.try_acquire(Uuid::new_v4()).await);
        assert!(!gate.try_acquire(Uuid::new_v4()).await);
        assert_eq!(gate.size().await, 2);
        assert_eq!(gate.available().await, 0);
    }

    #[tokio::test]
    async fn test_same_id_cannot_hold_two_slots() {
        let gate = ConcurrencyGate::new(3);
        let id = Uuid::new_v4();
        assert!(gate.try_acquire(id).await);
        assert!(!gate.try_acquire(id).await);
        assert_eq!(gate.size().await, 1);
    }

    #[tokio::test]
    async fn test_release_frees_slot() {
        let gate = ConcurrencyGate::new(1);
        let id = Uuid::new_v4();
        assert!(gate.try_acquire(id).await);
        assert!(gate.release(id).await);
        assert!(!gate.release(id).await);
        assert!(!gate.contains(id).await);
        assert!(gate.try_acquire(Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_clear_frees_all_slots_but_keeps_peak() {
        let gate = ConcurrencyGate::new(2);
        assert!(gate.try_acquire(Uuid::new_v4()).await);
        assert!(gate.try_acquire(Uuid::new_v4()).await);
        assert_eq!(gate.clear().await, 2);
        assert_eq!(gate.available().await, 2);
        assert!(gate.snapshot().await.is_empty());
        assert_eq!(gate.peak().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_acquires_never_exceed_capacity() {
        let gate = ConcurrencyGate::new(4);
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.try_acquire(Uuid::new_v4()).await })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 4);
        assert_eq!(gate.peak().await, 4);
    }
}
