use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;

use crate::types::{OrderingMode, ShardKey};
use crate::work::WorkContainer;

/// One ordered queue of work for one shard key. Ordering within a shard
/// is preserved; between shards there is none.
type Shard = Mutex<BTreeMap<i64, Arc<WorkContainer>>>;

/// Routes records to shards by ordering mode and runs the fair,
/// resumable round-robin traversal `take_work` needs.
///
/// The top-level map is a `DashMap`, concurrent-safe for insert/remove;
/// each shard's ordered map is behind a `Mutex` since a worker calling
/// `success`/`failed` and the control thread calling `take_work`/`register`
/// can race on the same shard.
pub struct ShardMap {
    shards: DashMap<ShardKey, Shard>,
    /// Snapshot cursor: the shard key `take_work` should resume from.
    /// `None` means "start from the first shard".
    resume_cursor: Mutex<Option<ShardKey>>,
    in_flight_count: AtomicUsize,
}

impl ShardMap {
    pub fn new() -> Self {
        Self {
            shards: DashMap::new(),
            resume_cursor: Mutex::new(None),
            in_flight_count: AtomicUsize::new(0),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight_count.load(Ordering::SeqCst)
    }

    pub fn insert(&self, key: ShardKey, offset: i64, container: Arc<WorkContainer>) {
        let shard = self.shards.entry(key).or_insert_with(|| Mutex::new(BTreeMap::new()));
        shard.lock().unwrap().insert(offset, container);
    }

    /// Budgeted, fair, resumable traversal. Takes up to `budget`
    /// containers, respecting head-of-line blocking for `Partition`/`Key`
    /// ordering and allowing `Unordered` shards to keep yielding takeable
    /// containers past a blocked one.
    pub fn take_work(&self, budget: usize, ordering: OrderingMode, now: Instant) -> Vec<Arc<WorkContainer>> {
        if budget == 0 {
            return Vec::new();
        }

        // Stable ordering snapshot for this call only; shards inserted
        // mid-traversal need not be visited this round.
        let keys: Vec<ShardKey> = self.shards.iter().map(|e| e.key().clone()).collect();
        if keys.is_empty() {
            return Vec::new();
        }

        let start_idx = {
            let cursor = self.resume_cursor.lock().unwrap();
            match cursor.as_ref() {
                Some(k) => keys.iter().position(|candidate| candidate == k).map(|i| i + 1).unwrap_or(0),
                None => 0,
            }
        };

        let mut taken = Vec::new();
        let mut visited = 0;
        let mut last_visited_key: Option<ShardKey> = None;

        while visited < keys.len() && taken.len() < budget {
            let idx = (start_idx + visited) % keys.len();
            let key = &keys[idx];
            visited += 1;

            if let Some(shard) = self.shards.get(key) {
                let map = shard.lock().unwrap();
                if ordering == OrderingMode::Unordered {
                    // No ordering to preserve: every takeable entry in the
                    // shard can run concurrently.
                    for container in map.values() {
                        if taken.len() >= budget {
                            break;
                        }
                        if container.is_takeable(now) && container.try_take() {
                            self.in_flight_count.fetch_add(1, Ordering::SeqCst);
                            taken.push(container.clone());
                        }
                    }
                } else {
                    // Partition/Key ordering: only the lowest offset may
                    // ever be in flight. Every later entry is implicitly
                    // blocked until the head resolves, so there is no
                    // need to inspect them at all.
                    if taken.len() < budget {
                        if let Some((_, head)) = map.iter().next() {
                            if head.is_takeable(now) && head.try_take() {
                                self.in_flight_count.fetch_add(1, Ordering::SeqCst);
                                taken.push(head.clone());
                            }
                        }
                    }
                }
            }
            last_visited_key = Some(key.clone());

            if taken.len() >= budget {
                break;
            }
        }

        if let Some(key) = last_visited_key {
            *self.resume_cursor.lock().unwrap() = Some(key);
        }

        taken
    }

    /// Called by both `success` and `failed` to release the in-flight slot.
    pub fn release_in_flight(&self) {
        self.in_flight_count.fetch_sub(1, Ordering::SeqCst);
    }

    /// Drops an empty shard. Called after `success` in `Key` mode, once
    /// the shard's last entry is gone.
    pub fn gc_if_empty(&self, key: &ShardKey) {
        let is_empty = self
            .shards
            .get(key)
            .map(|shard| shard.lock().unwrap().is_empty())
            .unwrap_or(false);
        if is_empty {
            self.shards.remove(key);
        }
    }

    /// Removes a shard unconditionally, used by rebalance revoke/loss.
    pub fn remove_shard(&self, key: &ShardKey) {
        self.shards.remove(key);
    }

    /// Removes a container's entry (but not necessarily the shard) —
    /// used when the commit planner removes a succeeded container and
    /// the shard copy must be dropped too if still present.
    pub fn remove_offset(&self, key: &ShardKey, offset: i64) {
        if let Some(shard) = self.shards.get(key) {
            shard.lock().unwrap().remove(&offset);
        }
    }

}

impl Default for ShardMap {
    fn default() -> Self {
        Self::new()
    }
}
