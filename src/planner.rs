use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::codec::CodecId;
use crate::commit_queue::CommitQueues;
use crate::offset_map::OffsetMapManager;
use crate::shard_map::ShardMap;
use crate::types::{Partition, ShardKey};
use crate::work::TerminalResult;

/// Budget on the summed UTF-8 length of all partitions' base64 metadata,
/// the broker-side limit on the commit-metadata field.
pub const METADATA_BUDGET_CHARS: usize = 4096;

/// One partition's emitted commit: the offset to commit plus, when a
/// codec could represent the incomplete set, its base64 metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub offset: i64,
    pub metadata: Option<String>,
}

/// Scans commit queues, finds the highest contiguous-completed offset
/// per partition, and builds the metadata payload.
pub struct CommitPlanner<'a> {
    commit_queues: &'a CommitQueues,
    shard_map: &'a ShardMap,
    ordering_key_of: &'a dyn Fn(&Partition, i64) -> ShardKey,
}

impl<'a> CommitPlanner<'a> {
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

    /// Builds the per-partition commit map, then enforces the global
    /// metadata size budget, then (if `remove`) drops succeeded entries
    /// up to the committed candidate from each commit queue.
    pub fn plan(&self, forced_codec: Option<CodecId>, remove: bool) -> HashMap<Partition, CommitEntry> {
        let mut out = HashMap::new();
        let mut to_remove: Vec<(Partition, i64)> = Vec::new();

        for partition in self.commit_queues.partitions() {
            let snapshot = self.commit_queues.snapshot(&partition);
            if snapshot.is_empty() {
                continue;
            }

            let mut commit_candidate: Option<i64> = None;
            let mut incompletes: BTreeSet<i64> = BTreeSet::new();
            let mut past_low_water = false;
            let mut succeeded_prefix_end: Option<i64> = None;

            for (offset, container) in &snapshot {
                match container.result() {
                    TerminalResult::Succeeded if !past_low_water => {
                        commit_candidate = Some(*offset);
                        succeeded_prefix_end = Some(*offset);
                    }
                    TerminalResult::Succeeded => {
                        // noop: implicitly represented by absence from incompletes.
                    }
                    TerminalResult::Failed => {
                        past_low_water = true;
                        incompletes.insert(*offset);
                    }
                    TerminalResult::Pending => {
                        past_low_water = true;
                        incompletes.insert(*offset);
                    }
                }
            }

            let emitted_offset = match (commit_candidate, incompletes.iter().next()) {
                (Some(candidate), _) => candidate + 1,
                (None, Some(&smallest_incomplete)) => smallest_incomplete,
                (None, None) => {
                    // Nothing succeeded, nothing incomplete: everything in
                    // the queue must have been Succeeded-past-low-water,
                    // which can't happen before a first gap. Fall back to
                    // one past the last entry seen.
                    snapshot.last().map(|(o, _)| *o + 1).unwrap_or(0)
                }
            };

            let metadata = if !incompletes.is_empty() {
                match OffsetMapManager::encode(emitted_offset, emitted_offset_plus_range(&incompletes, emitted_offset), &incompletes, forced_codec) {
                    Some(encoded) => Some(encoded),
                    None => {
                        warn!(partition = %partition, "no codec applies to incomplete-offset window; committing without metadata");
                        None
                    }
                }
            } else {
                None
            };

            out.insert(partition.clone(), CommitEntry { offset: emitted_offset, metadata });

            if remove {
                if let Some(end) = succeeded_prefix_end {
                    to_remove.push((partition.clone(), end));
                }
            }
        }

        enforce_metadata_budget(&mut out);

        if remove {
            for (partition, end) in to_remove {
                self.remove_succeeded_prefix(&partition, end);
            }
        }

        out
    }

    fn remove_succeeded_prefix(&self, partition: &Partition, end: i64) {
        for (offset, container) in self.commit_queues.snapshot(partition) {
            if offset <= end && container.result() == TerminalResult::Succeeded {
                let key = (self.ordering_key_of)(partition, offset);
                self.shard_map.remove_offset(&key, offset);
            }
        }
        self.commit_queues.remove_up_to(partition, end);
    }
}

/// The codec needs `next_expected_offset`, but the planner only tracks
/// offsets it has actually seen; the window's right edge is one past the
/// highest offset present among the incompletes or the emitted offset
/// itself, whichever is larger.
fn emitted_offset_plus_range(incompletes: &BTreeSet<i64>, emitted_offset: i64) -> i64 {
    let highest = incompletes.iter().next_back().copied().unwrap_or(emitted_offset - 1);
    (highest + 1).max(emitted_offset)
}

/// If the summed UTF-8 length of every partition's payload exceeds the
/// budget, strip metadata from every entry. Commit offsets are kept;
/// crash recovery will replay completed messages beyond the bare commit
/// offset, an acceptable degradation.
fn enforce_metadata_budget(entries: &mut HashMap<Partition, CommitEntry>) {
    let total: usize = entries
        .values()
        .filter_map(|e| e.metadata.as_ref())
        .map(|m| m.len())
        .sum();

    if total > METADATA_BUDGET_CHARS {
        warn!(total, budget = METADATA_BUDGET_CHARS, "commit metadata exceeds size budget; stripping for this round");
        for entry in entries.values_mut() {
            entry.metadata = None;
        }
    }
}
