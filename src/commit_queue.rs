use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::types::Partition;
use crate::work::WorkContainer;

/// Per-partition ordered map used only to compute the committable prefix
/// and the incomplete set. A work container is referenced from both its
/// shard and its partition queue.
struct PartitionState {
    queue: Mutex<BTreeMap<i64, Arc<WorkContainer>>>,
    /// Highest offset ever observed from this partition.
    hwm: AtomicI64,
    /// Offsets >= last-committed-offset known not yet succeeded, restored
    /// from commit metadata on assignment.
    incomplete: Mutex<BTreeSet<i64>>,
}

impl PartitionState {
    fn new(base_hwm: i64) -> Self {
        Self {
            queue: Mutex::new(BTreeMap::new()),
            hwm: AtomicI64::new(base_hwm),
            incomplete: Mutex::new(BTreeSet::new()),
        }
    }
}

/// Tracks commit queues, HWMs and incomplete sets across all assigned
/// partitions, plus the single dirty flag the committer consults to
/// avoid no-op commits.
pub struct CommitQueues {
    partitions: DashMap<Partition, Arc<PartitionState>>,
    dirty: AtomicBool,
}

impl CommitQueues {
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            dirty: AtomicBool::new(false),
        }
    }

    fn state_or_default(&self, partition: &Partition) -> Arc<PartitionState> {
        self.partitions
            .entry(partition.clone())
            .or_insert_with(|| Arc::new(PartitionState::new(-1)))
            .clone()
    }

    pub fn hwm(&self, partition: &Partition) -> i64 {
        self.partitions
            .get(partition)
            .map(|s| s.hwm.load(Ordering::SeqCst))
            .unwrap_or(-1)
    }

    /// A record is registered only if `offset > HWM` or `offset` is in
    /// the restored incomplete set (replay suppression).
    pub fn should_register(&self, partition: &Partition, offset: i64) -> bool {
        match self.partitions.get(partition) {
            None => true,
            Some(state) => {
                let hwm = state.hwm.load(Ordering::SeqCst);
                offset > hwm || state.incomplete.lock().unwrap().contains(&offset)
            }
        }
    }

    /// Raises the partition HWM to `max(HWM, offset)`. Safe to call
    /// concurrently from both the control and poller threads via an
    /// atomic compare-and-raise.
    pub fn raise_hwm(&self, partition: &Partition, offset: i64) {
        let state = self.state_or_default(partition);
        state.hwm.fetch_max(offset, Ordering::SeqCst);
    }

    pub fn register(&self, partition: &Partition, offset: i64, container: Arc<WorkContainer>) {
        let state = self.state_or_default(partition);
        state.queue.lock().unwrap().insert(offset, container);
        state.hwm.fetch_max(offset, Ordering::SeqCst);
    }

    /// Restores the incomplete set decoded from commit metadata for a
    /// newly assigned partition and seeds the HWM one below `base_offset`
    /// so the base offset itself still satisfies `offset > HWM`.
    pub fn restore_from_assignment(&self, partition: &Partition, base_offset: i64, incomplete: BTreeSet<i64>) {
        let state = Arc::new(PartitionState::new(base_offset - 1));
        *state.incomplete.lock().unwrap() = incomplete;
        self.partitions.insert(partition.clone(), state);
    }

    /// Drops HWM, incomplete set and commit queue for a revoked or lost
    /// partition.
    pub fn drop_partition(&self, partition: &Partition) {
        self.partitions.remove(partition);
    }

    pub fn set_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Reads and clears the dirty flag in one step, the way a committer
    /// would check "is there anything new to commit" before a round.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn partitions(&self) -> Vec<Partition> {
        self.partitions.iter().map(|e| e.key().clone()).collect()
    }

    /// Total records registered but not yet committed, across every
    /// partition. Drives `max_beyond_base`/`loading_factor` throttling.
    pub fn total_registered(&self) -> usize {
        self.partitions
            .iter()
            .map(|e| e.value().queue.lock().unwrap().len())
            .sum()
    }

    /// Ascending `(offset, container)` snapshot for the commit planner.
    pub fn snapshot(&self, partition: &Partition) -> Vec<(i64, Arc<WorkContainer>)> {
        match self.partitions.get(partition) {
            None => Vec::new(),
            Some(state) => state
                .queue
                .lock()
                .unwrap()
                .iter()
                .map(|(o, c)| (*o, c.clone()))
                .collect(),
        }
    }

    /// Removes entries with offset `<= up_to`, once the planner has
    /// committed past them.
    pub fn remove_up_to(&self, partition: &Partition, up_to: i64) {
        if let Some(state) = self.partitions.get(partition) {
            let mut queue = state.queue.lock().unwrap();
            let keep = queue.split_off(&(up_to + 1));
            *queue = keep;
        }
    }
}

impl Default for CommitQueues {
    fn default() -> Self {
        Self::new()
    }
}
