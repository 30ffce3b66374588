//! End-to-end scenarios against the public `WorkManager` API, covering the
//! full register -> take -> succeed/fail -> commit cycle without a live
//! broker (the broker client itself is out of scope for this crate).

use std::sync::Arc;
use std::time::Duration;

use kafka_work_manager::clock::ManualClock;
use kafka_work_manager::{ConsumerRecord, Partition, WorkManager, WorkManagerConfig};
use rstest::rstest;

fn manager(ordering: &str) -> WorkManager {
    let config = WorkManagerConfig {
        ordering: ordering.into(),
        max_queue: 1_000,
        max_beyond_base: 5_000,
        loading_factor: 3,
        forced_codec: None,
    };
    WorkManager::new(config, Arc::new(ManualClock::new())).unwrap()
}

fn push(manager: &WorkManager, partition: &Partition, offset: i64) {
    manager.inbox().push(ConsumerRecord {
        partition: partition.clone(),
        offset,
        key: None,
    });
}

#[test]
fn out_of_order_success_commits_only_the_contiguous_prefix() {
    // Only `Unordered` mode permits concurrent processing of several
    // offsets in the same partition, so only it can complete them out of
    // order. Partition/Key modes serialize on the shard's head offset and
    // can never observe this ordering.
    let manager = manager("unordered");
    let p = Partition::new("orders", 0);
    for offset in 0..5 {
        push(&manager, &p, offset);
    }
    manager.drain_and_register();

    let taken = manager.take_work(5);
    assert_eq!(taken.len(), 5);

    // Succeed offsets 2, 0, 4 but leave 1 and 3 pending.
    for &offset in &[2, 0, 4] {
        let container = taken.iter().find(|c| c.offset() == offset).unwrap();
        manager.success(container);
    }

    let plan = manager.plan_commits(false);
    let entry = plan.get(&p).unwrap();
    // Offset 0 is contiguous-succeeded, offset 1 is still pending, so the
    // commit cannot advance past it.
    assert_eq!(entry.offset, 1);
    assert!(entry.metadata.is_some());
}

#[rstest]
#[case::partition("partition")]
#[case::key("key")]
fn ordered_modes_serialize_strictly_on_the_shard_head(#[case] ordering: &str) {
    let manager = manager(ordering);
    let p = Partition::new("orders", 0);
    for offset in 0..3 {
        manager.inbox().push(ConsumerRecord {
            partition: p.clone(),
            offset,
            key: Some(b"same-key".to_vec()),
        });
    }
    manager.drain_and_register();

    let taken = manager.take_work(10);
    assert_eq!(taken.len(), 1, "{ordering} mode only exposes the head offset");
    assert_eq!(taken[0].offset(), 0);
    assert!(manager.take_work(10).is_empty(), "head is in flight; offsets 1 and 2 stay blocked");

    manager.success(&taken[0]);
    let taken = manager.take_work(10);
    assert_eq!(taken[0].offset(), 1);
}

#[test]
fn key_mode_shard_collapses_once_all_its_offsets_succeed() {
    let manager = manager("key");
    let p = Partition::new("orders", 0);
    for offset in 0..3 {
        manager.inbox().push(ConsumerRecord {
            partition: p.clone(),
            offset,
            key: Some(b"user-42".to_vec()),
        });
    }
    manager.drain_and_register();

    let taken = manager.take_work(10);
    assert_eq!(taken.len(), 1, "key-mode head-of-line blocks until offset 0 resolves");

    manager.success(&taken[0]);
    let taken = manager.take_work(10);
    assert_eq!(taken.len(), 1);
    manager.success(&taken[0]);
    let taken = manager.take_work(10);
    manager.success(&taken[0]);

    let plan = manager.plan_commits(true);
    assert_eq!(plan.get(&p).unwrap().offset, 3);
    assert!(plan.get(&p).unwrap().metadata.is_none());
}

#[test]
fn failed_work_is_not_retaken_until_its_backoff_elapses() {
    let manager = manager("unordered");
    let p = Partition::new("orders", 0);
    push(&manager, &p, 0);
    manager.drain_and_register();

    let taken = manager.take_work(1);
    manager.failed(&taken[0]);
    assert!(manager.take_work(1).is_empty());
}

#[test]
fn unordered_mode_lets_later_offsets_proceed_past_a_blocked_head() {
    let manager = manager("unordered");
    let p = Partition::new("orders", 0);
    push(&manager, &p, 0);
    push(&manager, &p, 1);
    manager.drain_and_register();

    let first_batch = manager.take_work(1);
    assert_eq!(first_batch[0].offset(), 0);
    // Offset 0 stays in flight; unordered mode still yields offset 1.
    let second_batch = manager.take_work(1);
    assert_eq!(second_batch[0].offset(), 1);
}

#[test]
fn assignment_restores_incomplete_set_and_suppresses_replays() {
    use kafka_work_manager::offset_map::OffsetMapManager;
    use kafka_work_manager::rebalance::{CommittedOffset, CommittedOffsetSource};
    use rdkafka::TopicPartitionList;
    use std::collections::BTreeSet;

    struct FixedSource(Partition, CommittedOffset);
    impl CommittedOffsetSource for FixedSource {
        fn committed(&self, partition: &Partition) -> Option<CommittedOffset> {
            (*partition == self.0).then(|| self.1.clone())
        }
    }

    let manager = manager("unordered");
    let p = Partition::new("orders", 0);
    let incomplete: BTreeSet<i64> = [12].into_iter().collect();
    let metadata = OffsetMapManager::encode(10, 20, &incomplete, None).unwrap();

    let mut tpl = TopicPartitionList::new();
    tpl.add_partition("orders", 0);
    let source = FixedSource(p.clone(), CommittedOffset { offset: 10, metadata: Some(metadata) });
    manager.on_assigned(&tpl, &source).unwrap();

    // Offset 5 is below the restored base and not in the incomplete set: replay, dropped.
    push(&manager, &p, 5);
    assert_eq!(manager.drain_and_register(), 0);

    // Offset 12 sits inside the restored incomplete set: admitted for reprocessing.
    push(&manager, &p, 12);
    assert_eq!(manager.drain_and_register(), 1);

    manager.on_revoked(&tpl).unwrap();
    assert!(manager.commit_queues().snapshot(&p).is_empty());
}

#[test]
fn retry_backoff_clears_after_manual_clock_advances() {
    let config = WorkManagerConfig {
        ordering: "unordered".into(),
        max_queue: 100,
        max_beyond_base: 100,
        loading_factor: 3,
        forced_codec: None,
    };
    let clock = Arc::new(ManualClock::new());
    let manager = WorkManager::new(config, clock.clone()).unwrap();
    let p = Partition::new("orders", 0);
    push(&manager, &p, 0);
    manager.drain_and_register();

    let taken = manager.take_work(1);
    manager.failed(&taken[0]);
    assert!(manager.take_work(1).is_empty());

    clock.advance(Duration::from_secs(60));
    assert_eq!(manager.take_work(1).len(), 1);
}
