//! Sequence-number reorder buffer.

use std::collections::BTreeMap;

/// Releases items strictly in sequence order.
///
/// Items below the next expected sequence are replays and are dropped. Items
/// ahead of it wait until the gap fills. Once more than `max_pending` items are
/// waiting, the gap is declared lost and skipped.
#[derive(Debug, Clone)]
pub struct ReorderBuffer<T> {
    next: u64,
    pending: BTreeMap<u64, T>,
    max_pending: usize,
    duplicates: u64,
    skipped: u64,
}

impl<T> ReorderBuffer<T> {
    pub fn new(first_seq: u64, max_pending: usize) -> Self {
        Self {
            next: first_seq,
            pending: BTreeMap::new(),
            max_pending,
            duplicates: 0,
            skipped: 0,
        }
    }

    /// Admit an item; returns everything now releasable, in order.
    pub fn push(&mut self, seq: u64, item: T) -> Vec<T> {
        if seq < self.next || self.pending.contains_key(&seq) {
            self.duplicates += 1;
            tracing::debug!(seq, next = self.next, "dropping replayed event");
            return Vec::new();
        }

        self.pending.insert(seq, item);
        let mut ready = self.drain_ready();

        if self.pending.len() > self.max_pending {
            ready.extend(self.skip_gap());
        }
        ready
    }

    /// Give up on the current gap and release what follows it
    pub fn skip_gap(&mut self) -> Vec<T> {
        let Some(&first) = self.pending.keys().next() else {
            return Vec::new();
        };
        let lost = first - self.next;
        tracing::warn!(
            from = self.next,
            to = first - 1,
            lost,
            "skipping sequence gap in event feed"
        );
        self.skipped += lost;
        self.next = first;
        self.drain_ready()
    }

    fn drain_ready(&mut self) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some(item) = self.pending.remove(&self.next) {
            ready.push(item);
            self.next += 1;
        }
        ready
    }

    /// Next sequence number expected
    pub fn next_seq(&self) -> u64 {
        self.next
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Sequence numbers given up on
    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}
