use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use rdkafka::TopicPartitionList;

use crate::clock::Clock;
use crate::codec::CodecId;
use crate::commit_queue::CommitQueues;
use crate::config::WorkManagerConfig;
use crate::error::WorkManagerError;
use crate::inbox::Inbox;
use crate::planner::{CommitEntry, CommitPlanner};
use crate::rebalance::{CommittedOffsetSource, RebalanceCoordinator};
use crate::shard_map::ShardMap;
use crate::types::{ConsumerRecord, OrderingMode, Partition, ShardKey};
use crate::work::{default_backoff, WorkContainer};

/// Ties the inbox, shard map, commit queues and commit planner together
/// behind the operations a control loop actually calls: drain the inbox,
/// take a batch of work, report success or failure, and plan a commit.
pub struct WorkManager {
    config: WorkManagerConfig,
    ordering: OrderingMode,
    forced_codec: Option<CodecId>,
    inbox: Inbox,
    shard_map: ShardMap,
    commit_queues: CommitQueues,
    clock: Arc<dyn Clock>,
}

impl WorkManager {
    pub fn new(config: WorkManagerConfig, clock: Arc<dyn Clock>) -> Result<Self, String> {
        let ordering = config.ordering_mode()?;
        let forced_codec = config.forced_codec_id()?;
        Ok(Self {
            config,
            ordering,
            forced_codec,
            inbox: Inbox::new(),
            shard_map: ShardMap::new(),
            commit_queues: CommitQueues::new(),
            clock,
        })
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn commit_queues(&self) -> &CommitQueues {
        &self.commit_queues
    }

    pub fn shard_map(&self) -> &ShardMap {
        &self.shard_map
    }

    fn ordering_key_of(&self, partition: &Partition, offset: i64) -> ShardKey {
        // Partition/Unordered shard on the partition regardless of
        // offset; Key mode needs the record itself, which by the time a
        // commit is being planned is already in the commit queue.
        match self.ordering {
            OrderingMode::Unordered | OrderingMode::Partition => ShardKey::Partition(partition.clone()),
            OrderingMode::Key => self
                .commit_queues
                .snapshot(partition)
                .into_iter()
                .find(|(o, _)| *o == offset)
                .map(|(_, c)| c.record.shard_key(self.ordering))
                .unwrap_or_else(|| ShardKey::Partition(partition.clone())),
        }
    }

    /// Drains the inbox and registers every record that passes the
    /// replay-suppression check into both the commit queue and the shard
    /// map. Records below the partition's HWM and not in the restored
    /// incomplete set are dropped silently — they are known-replayed
    /// duplicates.
    pub fn drain_and_register(&self) -> usize {
        let now = self.clock.now();
        let drained = self.inbox.drain();
        let mut registered = 0;
        for record in drained {
            if !self.commit_queues.should_register(&record.partition, record.offset) {
                debug!(partition = %record.partition, offset = record.offset, "dropping replayed record below HWM");
                continue;
            }
            self.register_one(record, now);
            registered += 1;
        }
        registered
    }

    fn register_one(&self, record: ConsumerRecord, now: Instant) {
        let shard_key = record.shard_key(self.ordering);
        let container = Arc::new(WorkContainer::new(record.clone(), now));
        self.commit_queues.register(&record.partition, record.offset, container.clone());
        self.shard_map.insert(shard_key, record.offset, container);
        self.commit_queues.set_dirty();
    }

    /// Takes up to `requested_max` takeable containers, honoring the
    /// configured ordering mode's head-of-line blocking.
    ///
    /// Effective budget is `min(requested_max, max_queue, max_beyond_base)
    /// - in_flight_count`; if that is `<= 0`, no containers are taken.
    pub fn take_work(&self, requested_max: usize) -> Vec<Arc<WorkContainer>> {
        let ceiling = requested_max.min(self.config.max_queue).min(self.config.max_beyond_base);
        let budget = ceiling.saturating_sub(self.shard_map.in_flight_count());
        if budget == 0 {
            return Vec::new();
        }
        let now = self.clock.now();
        self.shard_map.take_work(budget, self.ordering, now)
    }

    /// Reports a successful attempt: marks the container done, releases
    /// its in-flight slot, and garbage-collects its shard in `Key` mode
    /// once empty.
    pub fn success(&self, container: &Arc<WorkContainer>) {
        container.mark_succeeded();
        self.shard_map.release_in_flight();
        self.commit_queues.set_dirty();
        if self.ordering == OrderingMode::Key {
            let key = container.record.shard_key(self.ordering);
            self.shard_map.gc_if_empty(&key);
        }
    }

    /// Reports a failed attempt: schedules the next retry via the
    /// default exponential backoff and releases the in-flight slot so
    /// the container can be taken again once eligible.
    pub fn failed(&self, container: &Arc<WorkContainer>) {
        let now = self.clock.now();
        container.mark_failed(now, default_backoff);
        self.shard_map.release_in_flight();
    }

    /// Total records registered but not yet committed, across every
    /// partition. The quantity `should_throttle`/`is_throttled` compares
    /// against `max_queue * loading_factor` and `max_beyond_base`.
    pub fn remaining_work(&self) -> usize {
        self.commit_queues.total_registered()
    }

    /// Whether the broker poller should pause fetching: too much work is
    /// already registered relative to configured limits.
    pub fn is_throttled(&self) -> bool {
        self.config.should_throttle(self.remaining_work())
    }

    /// Builds the per-partition commit plan without clearing a dirty
    /// flag or removing entries from the queue.
    pub fn plan_commits(&self, remove: bool) -> HashMap<Partition, CommitEntry> {
        let ordering_key_of = |partition: &Partition, offset: i64| self.ordering_key_of(partition, offset);
        let planner = CommitPlanner::new(&self.commit_queues, &self.shard_map, &ordering_key_of);
        planner.plan(self.forced_codec, remove)
    }

    /// Returns `Some(plan)` only if something has changed since the last
    /// call, so a control loop can skip committing a no-op round.
    pub fn plan_commits_if_dirty(&self, remove: bool) -> Option<HashMap<Partition, CommitEntry>> {
        if self.commit_queues.take_dirty() {
            Some(self.plan_commits(remove))
        } else {
            None
        }
    }

    pub fn on_assigned(&self, tpl: &TopicPartitionList, source: &dyn CommittedOffsetSource) -> Result<(), WorkManagerError> {
        let ordering_key_of = |partition: &Partition, offset: i64| self.ordering_key_of(partition, offset);
        RebalanceCoordinator::new(&self.commit_queues, &self.shard_map, &ordering_key_of).assigned(tpl, source)
    }

    pub fn on_revoked(&self, tpl: &TopicPartitionList) -> Result<(), WorkManagerError> {
        let ordering_key_of = |partition: &Partition, offset: i64| self.ordering_key_of(partition, offset);
        RebalanceCoordinator::new(&self.commit_queues, &self.shard_map, &ordering_key_of).revoked(tpl)
    }

    pub fn on_lost(&self, tpl: &TopicPartitionList) -> Result<(), WorkManagerError> {
        let ordering_key_of = |partition: &Partition, offset: i64| self.ordering_key_of(partition, offset);
        RebalanceCoordinator::new(&self.commit_queues, &self.shard_map, &ordering_key_of).lost(tpl)
    }
}
