use std::fmt;

/// A `(topic, partition)` pair, the unit the broker rebalances over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    pub topic: String,
    pub partition: i32,
}

impl Partition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// A `(partition, offset)` pair identifying one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionOffset {
    pub partition: Partition,
    pub offset: i64,
}

impl PartitionOffset {
    pub fn new(partition: Partition, offset: i64) -> Self {
        Self { partition, offset }
    }
}

/// Opaque record key used to shard in `Key` ordering mode.
pub type RecordKey = Vec<u8>;

/// How records are grouped into shards for parallel execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// No ordering preserved; a shard is still `(topic, partition)` but
    /// a shard never blocks on head-of-line.
    Unordered,
    /// Shard key is `(topic, partition)`; head-of-line blocking applies.
    Partition,
    /// Shard key is the record key; head-of-line blocking applies.
    Key,
}

impl std::str::FromStr for OrderingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unordered" => Ok(OrderingMode::Unordered),
            "partition" => Ok(OrderingMode::Partition),
            "key" => Ok(OrderingMode::Key),
            other => Err(format!("unknown ordering mode: {other}")),
        }
    }
}

/// The key a record is routed on, one per `OrderingMode` variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ShardKey {
    Partition(Partition),
    Key(RecordKey),
}

/// A single record as delivered by the (external) broker poller.
#[derive(Debug, Clone)]
pub struct ConsumerRecord {
    pub partition: Partition,
    pub offset: i64,
    pub key: Option<RecordKey>,
}

impl ConsumerRecord {
    pub fn shard_key(&self, ordering: OrderingMode) -> ShardKey {
        match ordering {
            OrderingMode::Unordered | OrderingMode::Partition => {
                ShardKey::Partition(self.partition.clone())
            }
            OrderingMode::Key => ShardKey::Key(self.key.clone().unwrap_or_default()),
        }
    }
}
