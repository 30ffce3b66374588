use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::types::ConsumerRecord;

/// MPSC-safe FIFO the broker poller appends to and the control thread
/// drains. The poller thread only ever appends.
pub struct Inbox {
    tx: UnboundedSender<ConsumerRecord>,
    rx: std::sync::Mutex<UnboundedReceiver<ConsumerRecord>>,
}

impl Inbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: std::sync::Mutex::new(rx),
        }
    }

    /// A cheap, cloneable handle for the poller thread to push batches with.
    pub fn sender(&self) -> UnboundedSender<ConsumerRecord> {
        self.tx.clone()
    }

    pub fn push(&self, record: ConsumerRecord) {
        // The receiver is held by this same struct, so send can only
        // fail if we've already dropped it, which never happens here.
        let _ = self.tx.send(record);
    }

    /// Drains everything currently queued without blocking. Called from
    /// the control thread before every `take_work`.
    pub fn drain(&self) -> Vec<ConsumerRecord> {
        let mut rx = self.rx.lock().unwrap();
        let mut out = Vec::new();
        while let Ok(record) = rx.try_recv() {
            out.push(record);
        }
        out
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}
