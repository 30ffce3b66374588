use thiserror::Error;

use crate::types::Partition;

/// Error taxonomy for the work manager.
///
/// `EncodingNotSupported` and `MetadataTooLarge` are recovered locally by
/// the commit planner (logged as a warning, not propagated) — they exist
/// as variants so the codec and planner modules can unit-test the
/// failure path, not because callers normally see them. `RebalanceHandlerFailure`
/// is the one variant allowed to reach the broker client.
#[derive(Debug, Error)]
pub enum WorkManagerError {
    #[error("no codec can represent the incomplete-offset window for {partition}")]
    EncodingNotSupported { partition: Partition },

    #[error("commit metadata for {partition} is unreadable: {source}")]
    OffsetDecodingError {
        partition: Partition,
        #[source]
        source: anyhow::Error,
    },

    #[error("commit metadata totals {total_len} chars, exceeding the {budget}-char limit")]
    MetadataTooLarge { total_len: usize, budget: usize },

    #[error("rebalance handler failed: {source}")]
    RebalanceHandlerFailure {
        #[source]
        source: anyhow::Error,
    },
}
