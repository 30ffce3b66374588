//! Work manager and offset-map codec for a parallel, partitioned,
//! offset-based streaming-log consumer.
//!
//! A poller thread appends raw records to an [`Inbox`]; a control thread
//! drains it, registers records into a [`ShardMap`] and [`CommitQueues`],
//! hands out takeable work in shard-fair order, and periodically asks a
//! [`planner::CommitPlanner`] for the next commit per partition. Rebalance
//! events flow through [`RebalanceCoordinator`] to keep both structures
//! consistent with the broker's current assignment.
//!
//! [`Inbox`]: inbox::Inbox
//! [`ShardMap`]: shard_map::ShardMap
//! [`CommitQueues`]: commit_queue::CommitQueues
//! [`RebalanceCoordinator`]: rebalance::RebalanceCoordinator

pub mod clock;
pub mod codec;
pub mod commit_queue;
pub mod config;
pub mod error;
pub mod inbox;
pub mod manager;
pub mod offset_map;
pub mod planner;
pub mod rebalance;
pub mod shard_map;
pub mod types;
pub mod work;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WorkManagerConfig;
pub use error::WorkManagerError;
pub use manager::WorkManager;
pub use types::{ConsumerRecord, OrderingMode, Partition, PartitionOffset, RecordKey, ShardKey};
