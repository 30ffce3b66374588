use std::collections::BTreeSet;

use rdkafka::TopicPartitionList;
use tracing::{info, warn};

use crate::commit_queue::CommitQueues;
use crate::error::WorkManagerError;
use crate::offset_map::OffsetMapManager;
use crate::shard_map::ShardMap;
use crate::types::{Partition, ShardKey};

/// The last committed offset and, if the broker still has it, the
/// offset-map metadata string attached to that commit.
#[derive(Debug, Clone)]
pub struct CommittedOffset {
    pub offset: i64,
    pub metadata: Option<String>,
}

/// Resolves the last committed offset for a partition about to be
/// assigned. Implemented by the broker client; the work manager itself
/// has no opinion on how commits are fetched.
pub trait CommittedOffsetSource {
    fn committed(&self, partition: &Partition) -> Option<CommittedOffset>;
}

/// Wires partition assignment, revocation and loss into the commit
/// queues and shard map: rebuilds incomplete sets on assignment, tears
/// down state on revoke or loss.
pub struct RebalanceCoordinator<'a> {
    commit_queues: &'a CommitQueues,
    shard_map: &'a ShardMap,
    ordering_key_of: &'a dyn Fn(&Partition, i64) -> ShardKey,
}

impl<'a> RebalanceCoordinator<'a> {
    pub fn new(
        commit_queues: &'a CommitQueues,
        shard_map: &'a ShardMap,
        ordering_key_of: &'a dyn Fn(&Partition, i64) -> ShardKey,
    ) -> Self {
        Self {
            commit_queues,
            shard_map,
            ordering_key_of,
        }
    }

    /// Restores HWM and incomplete set for every partition in `tpl` from
    /// its last committed offset. A partition with no prior commit
    /// starts from offset 0 with an empty incomplete set.
    ///
    /// Returns `Err(RebalanceHandlerFailure)` if the broker client's
    /// own callback fails; nothing this coordinator does internally can
    /// fail, since commit-metadata decode errors are recovered locally
    /// (logged, not propagated).
    pub fn assigned(&self, tpl: &TopicPartitionList, source: &dyn CommittedOffsetSource) -> Result<(), WorkManagerError> {
        for elem in tpl.elements() {
            let partition = Partition::new(elem.topic(), elem.partition());
            match source.committed(&partition) {
                Some(committed) => {
                    let incomplete = committed
                        .metadata
                        .as_deref()
                        .and_then(|metadata| match OffsetMapManager::decode(committed.offset, metadata) {
                            Ok((_, set)) => Some(set),
                            Err(err) => {
                                warn!(partition = %partition, error = %err, "commit metadata unreadable on assignment; starting with an empty incomplete set");
                                None
                            }
                        })
                        .unwrap_or_default();
                    info!(partition = %partition, base_offset = committed.offset, incomplete = incomplete.len(), "partition assigned");
                    self.commit_queues.restore_from_assignment(&partition, committed.offset, incomplete);
                }
                None => {
                    info!(partition = %partition, "partition assigned with no prior commit");
                    self.commit_queues.restore_from_assignment(&partition, 0, BTreeSet::new());
                }
            }
        }
        Ok(())
    }

    /// A clean revoke: drop commit-queue and shard state for every
    /// partition in `tpl` after the caller has had a chance to flush a
    /// final commit.
    pub fn revoked(&self, tpl: &TopicPartitionList) -> Result<(), WorkManagerError> {
        self.teardown(tpl);
        Ok(())
    }

    /// An unclean loss: same teardown as `revoked`, but logged louder
    /// since no final commit is possible — whatever was in flight for
    /// these partitions is abandoned.
    pub fn lost(&self, tpl: &TopicPartitionList) -> Result<(), WorkManagerError> {
        warn!(partitions = tpl.count(), "partitions lost without a clean revoke; in-flight work for them is abandoned");
        self.teardown(tpl);
        Ok(())
    }

    /// Drops commit-queue state for each partition, then walks its
    /// entries to remove the matching shard slot. In `Partition`/
    /// `Unordered` mode this is one shard per partition; in `Key` mode it
    /// may touch many shards, each potentially still holding entries from
    /// other, still-assigned partitions, so entries are removed one at a
    /// time rather than dropping the whole shard.
    fn teardown(&self, tpl: &TopicPartitionList) {
        for elem in tpl.elements() {
            let partition = Partition::new(elem.topic(), elem.partition());
            for (offset, _container) in self.commit_queues.snapshot(&partition) {
                let key = (self.ordering_key_of)(&partition, offset);
                self.shard_map.remove_offset(&key, offset);
                self.shard_map.gc_if_empty(&key);
            }
            self.commit_queues.drop_partition(&partition);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::WorkContainer;
    use crate::types::ConsumerRecord;
    use dashmap::DashMap;
    use std::sync::Arc;
    use std::time::Instant;

    fn ordering_key(partition: &Partition, _offset: i64) -> ShardKey {
        ShardKey::Partition(partition.clone())
    }

    struct FakeSource(DashMap<Partition, CommittedOffset>);

    impl CommittedOffsetSource for FakeSource {
        fn committed(&self, partition: &Partition) -> Option<CommittedOffset> {
            self.0.get(partition).map(|e| e.value().clone())
        }
    }

    fn tpl(partitions: &[(&str, i32)]) -> TopicPartitionList {
        let mut tpl = TopicPartitionList::new();
        for (topic, partition) in partitions {
            tpl.add_partition(topic, *partition);
        }
        tpl
    }

    #[test]
    fn assigned_with_no_prior_commit_starts_fresh() {
        let queues = CommitQueues::new();
        let shards = ShardMap::new();
        let keyfn: &dyn Fn(&Partition, i64) -> ShardKey = &ordering_key;
        let coordinator = RebalanceCoordinator::new(&queues, &shards, keyfn);
        let source = FakeSource(DashMap::new());

        coordinator.assigned(&tpl(&[("orders", 0)]), &source).unwrap();

        let p = Partition::new("orders", 0);
        assert_eq!(queues.hwm(&p), -1);
        assert!(queues.should_register(&p, 0));
    }

    #[test]
    fn assigned_restores_incomplete_set_from_metadata() {
        let queues = CommitQueues::new();
        let shards = ShardMap::new();
        let keyfn: &dyn Fn(&Partition, i64) -> ShardKey = &ordering_key;
        let coordinator = RebalanceCoordinator::new(&queues, &shards, keyfn);

        let p = Partition::new("orders", 0);
        let incomplete: BTreeSet<i64> = [12].into_iter().collect();
        let metadata = OffsetMapManager::encode(10, 20, &incomplete, None).unwrap();
        let source = FakeSource(DashMap::new());
        source.0.insert(p.clone(), CommittedOffset { offset: 10, metadata: Some(metadata) });

        coordinator.assigned(&tpl(&[("orders", 0)]), &source).unwrap();

        assert!(!queues.should_register(&p, 9));
        assert!(queues.should_register(&p, 12));
    }

    #[test]
    fn revoked_drops_commit_queue_and_shard_entries() {
        let queues = CommitQueues::new();
        let shards = ShardMap::new();
        let keyfn: &dyn Fn(&Partition, i64) -> ShardKey = &ordering_key;
        let coordinator = RebalanceCoordinator::new(&queues, &shards, keyfn);

        let p = Partition::new("orders", 0);
        let now = Instant::now();
        let wc = Arc::new(WorkContainer::new(
            ConsumerRecord { partition: p.clone(), offset: 0, key: None },
            now,
        ));
        queues.register(&p, 0, wc.clone());
        shards.insert(ShardKey::Partition(p.clone()), 0, wc);

        coordinator.revoked(&tpl(&[("orders", 0)])).unwrap();

        assert!(queues.snapshot(&p).is_empty());
        assert_eq!(queues.hwm(&p), -1);
        assert!(shards.take_work(10, crate::types::OrderingMode::Unordered, now).is_empty());
    }

    #[test]
    fn lost_tears_down_state_the_same_way_as_revoked() {
        let queues = CommitQueues::new();
        let shards = ShardMap::new();
        let keyfn: &dyn Fn(&Partition, i64) -> ShardKey = &ordering_key;
        let coordinator = RebalanceCoordinator::new(&queues, &shards, keyfn);

        let p = Partition::new("orders", 0);
        let now = Instant::now();
        let wc = Arc::new(WorkContainer::new(
            ConsumerRecord { partition: p.clone(), offset: 0, key: None },
            now,
        ));
        queues.register(&p, 0, wc.clone());
        shards.insert(ShardKey::Partition(p.clone()), 0, wc);

        coordinator.lost(&tpl(&[("orders", 0)])).unwrap();

        assert!(queues.snapshot(&p).is_empty());
        assert!(shards.take_work(10, crate::types::OrderingMode::Unordered, now).is_empty());
    }
}
