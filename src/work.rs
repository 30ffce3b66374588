use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::ConsumerRecord;

/// Terminal outcome of a work container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalResult {
    Pending,
    Succeeded,
    Failed,
}

/// Per-record state: in-flight flag, attempt count, retry delay, and the
/// terminal result. A container is *takeable* iff not in-flight, not
/// succeeded, and `now >= not_before`.
///
/// In-flight/result fields are mutated by exactly one worker while the
/// container is in-flight, since ownership transfers at take-time, so a
/// `Mutex` around the mutable slice is sufficient — no finer-grained
/// locking is needed.
#[derive(Debug)]
pub struct WorkContainer {
    pub record: ConsumerRecord,
    in_flight: AtomicBool,
    attempt: AtomicU32,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    result: TerminalResult,
    not_before: Instant,
}

impl WorkContainer {
    pub fn new(record: ConsumerRecord, now: Instant) -> Self {
        Self {
            record,
            in_flight: AtomicBool::new(false),
            attempt: AtomicU32::new(0),
            state: Mutex::new(State {
                result: TerminalResult::Pending,
                not_before: now,
            }),
        }
    }

    pub fn offset(&self) -> i64 {
        self.record.offset
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn result(&self) -> TerminalResult {
        self.state.lock().unwrap().result
    }

    pub fn attempt(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Takeable iff not in-flight, not succeeded, and `now >= not_before`.
    pub fn is_takeable(&self, now: Instant) -> bool {
        if self.is_in_flight() {
            return false;
        }
        let state = self.state.lock().unwrap();
        state.result != TerminalResult::Succeeded && now >= state.not_before
    }

    /// Marks the container in-flight. Returns false if it was already
    /// in-flight (lost the race to another reader of the same shard).
    pub fn try_take(&self) -> bool {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Flips to Succeeded and clears in-flight. Idempotent — safe to call
    /// on a container whose shard entry has already been dropped by a
    /// revoke.
    pub fn mark_succeeded(&self) {
        let mut state = self.state.lock().unwrap();
        state.result = TerminalResult::Succeeded;
        drop(state);
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// Clears in-flight, sets Failed, computes the next `not_before` via
    /// `backoff`, and increments the attempt count.
    pub fn mark_failed(&self, now: Instant, backoff: impl Fn(u32) -> Duration) {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst);
        let delay = backoff(attempt);
        let mut state = self.state.lock().unwrap();
        state.result = TerminalResult::Failed;
        state.not_before = now + delay;
        drop(state);
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

/// Default backoff: exponential, capped, matching the shape of a retrying
/// Kafka consumer — `2^attempt` seconds up to one minute.
pub fn default_backoff(attempt: u32) -> Duration {
    let capped = attempt.min(6); // 2^6 = 64s, clamp below that
    Duration::from_secs(1u64 << capped).min(Duration::from_secs(60))
}
