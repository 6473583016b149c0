//! Per-(aspect, model) snapshot buffers.
//!
//! Each key owns its own queue and lock, so the producer appending to one key
//! never contends with the scheduler popping another. Within a key, snapshots
//! leave in the order they arrived.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::id::{AspectId, ModelId};
use crate::model::Snapshot;

/// What happens when the producer outruns the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BufferPolicy {
    /// Queues grow without limit.
    Unbounded,
    /// Each queue keeps at most `capacity` snapshots; appending to a full
    /// queue evicts its oldest snapshot.
    DropOldest { capacity: usize },
}

impl Default for BufferPolicy {
    fn default() -> Self {
        Self::DropOldest { capacity: 1024 }
    }
}

type Queue = Arc<Mutex<VecDeque<Snapshot>>>;

#[derive(Debug, Default)]
struct AspectBuffers {
    models: RwLock<BTreeMap<ModelId, Queue>>,
}

impl AspectBuffers {
    fn queue(&self, model: &ModelId) -> Queue {
        if let Some(q) = self.models.read().unwrap_or_else(PoisonError::into_inner).get(model) {
            return Arc::clone(q);
        }
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(models.entry(model.clone()).or_default())
    }

    fn queues(&self) -> Vec<Queue> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn find(&self, model: &str) -> Option<Queue> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }
}

/// All snapshot buffers of a session.
#[derive(Debug, Default)]
pub struct ModelBuffers {
    policy: BufferPolicy,
    aspects: RwLock<HashMap<AspectId, Arc<AspectBuffers>>>,
    dropped: AtomicU64,
}

impl ModelBuffers {
    #[must_use]
    pub fn new(policy: BufferPolicy) -> Self {
        Self {
            policy,
            aspects: RwLock::new(HashMap::new()),
            dropped: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> BufferPolicy {
        self.policy
    }

    fn aspect(&self, aspect: &AspectId) -> Arc<AspectBuffers> {
        if let Some(a) = self.aspects.read().unwrap_or_else(PoisonError::into_inner).get(aspect) {
            return Arc::clone(a);
        }
        let mut aspects = self.aspects.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(aspects.entry(aspect.clone()).or_default())
    }

    fn find_aspect(&self, aspect: &str) -> Option<Arc<AspectBuffers>> {
        self.aspects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(aspect)
            .cloned()
    }

    /// Appends a snapshot at the tail of its (aspect, model) queue.
    pub fn push(&self, snapshot: Snapshot) {
        let queue = self.aspect(&snapshot.aspect_id).queue(snapshot.model_id());
        let mut q = queue.lock().unwrap_or_else(PoisonError::into_inner);
        if let BufferPolicy::DropOldest { capacity } = self.policy {
            while q.len() >= capacity.max(1) {
                q.pop_front();
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if total.is_power_of_two() {
                    tracing::warn!(
                        aspect = %snapshot.aspect_id,
                        model = %snapshot.model_id(),
                        dropped_total = total,
                        "snapshot buffer full; evicting oldest"
                    );
                }
            }
        }
        q.push_back(snapshot);
    }

    /// Pops the head of one queue.
    pub fn pop(&self, aspect: &str, model: &str) -> Option<Snapshot> {
        let queue = self.find_aspect(aspect)?.find(model)?;
        let mut q = queue.lock().unwrap_or_else(PoisonError::into_inner);
        q.pop_front()
    }

    /// Pops at most one snapshot from every model queue of `aspect`, in model
    /// id order. Empty queues contribute nothing.
    ///
    /// Returns `None` if no buffer map exists for `aspect`.
    #[must_use]
    pub fn drain_heads(&self, aspect: &str) -> Option<Vec<Snapshot>> {
        let buffers = self.find_aspect(aspect)?;
        let heads = buffers
            .queues()
            .into_iter()
            .filter_map(|queue| queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front())
            .collect();
        Some(heads)
    }

    #[must_use]
    pub fn has_aspect(&self, aspect: &str) -> bool {
        self.find_aspect(aspect).is_some()
    }

    /// Queue length for one key; zero if the key does not exist.
    #[must_use]
    pub fn len(&self, aspect: &str, model: &str) -> usize {
        self.find_aspect(aspect)
            .and_then(|a| a.find(model))
            .map_or(0, |q| q.lock().unwrap_or_else(PoisonError::into_inner).len())
    }

    /// Total snapshots queued across all keys.
    #[must_use]
    pub fn total_len(&self) -> usize {
        let aspects: Vec<Arc<AspectBuffers>> = self
            .aspects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        aspects
            .iter()
            .flat_map(|a| a.queues())
            .map(|q| q.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    /// Snapshots evicted by the drop-oldest policy since creation.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Removes every buffer.
    pub fn clear(&self) {
        self.aspects.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use serde_json::json;

    use super::*;
    use crate::model::Model;

    fn snap(aspect: &str, model: &str, step: u64) -> Snapshot {
        Snapshot::new(AspectId::new(aspect), step, Model::data(model, json!(step)))
    }

    #[test]
    fn pop_is_fifo_per_key() {
        let buffers = ModelBuffers::new(BufferPolicy::Unbounded);
        for step in 0..5 {
            buffers.push(snap("A", "m", step));
        }
        let steps: Vec<u64> = std::iter::from_fn(|| buffers.pop("A", "m")).map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);
        assert!(buffers.pop("A", "m").is_none());
    }

    #[test]
    fn drain_heads_takes_one_per_model() {
        let buffers = ModelBuffers::new(BufferPolicy::Unbounded);
        buffers.push(snap("A", "m2", 0));
        buffers.push(snap("A", "m1", 0));
        buffers.push(snap("A", "m1", 1));

        let first = buffers.drain_heads("A").unwrap();
        let keys: Vec<(&str, u64)> = first.iter().map(|s| (s.model_id().as_str(), s.step)).collect();
        assert_eq!(keys, vec![("m1", 0), ("m2", 0)]);

        let second = buffers.drain_heads("A").unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].step, 1);

        assert!(buffers.drain_heads("A").unwrap().is_empty());
        assert!(buffers.drain_heads("missing").is_none());
    }

    #[test]
    fn drop_oldest_evicts_and_counts() {
        let buffers = ModelBuffers::new(BufferPolicy::DropOldest { capacity: 3 });
        for step in 0..5 {
            buffers.push(snap("A", "m", step));
        }
        assert_eq!(buffers.len("A", "m"), 3);
        assert_eq!(buffers.dropped(), 2);
        assert_eq!(buffers.pop("A", "m").unwrap().step, 2);
    }

    #[test]
    fn keys_are_independent() {
        let buffers = ModelBuffers::new(BufferPolicy::DropOldest { capacity: 2 });
        buffers.push(snap("A", "m", 0));
        buffers.push(snap("B", "m", 0));
        buffers.push(snap("B", "m", 1));
        buffers.push(snap("B", "m", 2));
        assert_eq!(buffers.len("A", "m"), 1);
        assert_eq!(buffers.len("B", "m"), 2);
        assert_eq!(buffers.total_len(), 3);
        buffers.clear();
        assert_eq!(buffers.total_len(), 0);
        assert!(!buffers.has_aspect("A"));
    }

    #[test]
    fn concurrent_push_and_pop_preserve_order() {
        let buffers = Arc::new(ModelBuffers::new(BufferPolicy::Unbounded));
        let producer = {
            let buffers = Arc::clone(&buffers);
            thread::spawn(move || {
                for step in 0..2_000 {
                    buffers.push(snap("A", "m", step));
                }
            })
        };

        let mut seen = Vec::with_capacity(2_000);
        while seen.len() < 2_000 {
            if let Some(s) = buffers.pop("A", "m") {
                seen.push(s.step);
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        let expected: Vec<u64> = (0..2_000).collect();
        assert_eq!(seen, expected);
    }
}
