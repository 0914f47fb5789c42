use std::collections::VecDeque;

use crate::models::FrameRecord;

/// A frame waiting for persistence, plus its bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueueEntry {
    pub record: FrameRecord,
    /// Enqueue sequence number: the entry's last known position in arrival order.
    pub position: u64,
    /// Failed persistence attempts so far.
    pub attempts: u32,
}

/// Pending frames, appended at the tail.
///
/// Despite the name this is drained newest-first: [`pop_latest`] takes from
/// the tail, and a failed entry goes back to the head through
/// [`restore_front`].
///
/// [`pop_latest`]: SyncQueue::pop_latest
/// [`restore_front`]: SyncQueue::restore_front
#[derive(Debug, Default)]
pub struct SyncQueue {
    entries: VecDeque<SyncQueueEntry>,
    next_position: u64,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: FrameRecord) -> u64 {
        let position = self.next_position;
        self.next_position += 1;
        self.entries.push_back(SyncQueueEntry {
            record,
            position,
            attempts: 0,
        });
        position
    }

    /// Remove the most recently added entry.
    pub fn pop_latest(&mut self) -> Option<SyncQueueEntry> {
        self.entries.pop_back()
    }

    /// Put a failed entry back at the head of the queue.
    pub fn restore_front(&mut self, mut entry: SyncQueueEntry) {
        entry.attempts = entry.attempts.saturating_add(1);
        self.entries.push_front(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in queue order, head first.
    #[cfg(test)]
    pub fn snapshot(&self) -> Vec<FrameRecord> {
        self.entries.iter().map(|entry| entry.record.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn frame(hash: &str) -> FrameRecord {
        FrameRecord::new("r1".into(), hash.to_string(), Utc::now())
    }

    #[test]
    fn pops_newest_first() {
        let mut queue = SyncQueue::new();
        queue.push(frame("A"));
        queue.push(frame("B"));
        queue.push(frame("C"));

        let order: Vec<String> = std::iter::from_fn(|| queue.pop_latest())
            .map(|entry| entry.record.hash().to_string())
            .collect();
        assert_eq!(order, vec!["C", "B", "A"]);
    }

    #[test]
    fn restored_entry_lands_at_head_and_counts_attempt() {
        let mut queue = SyncQueue::new();
        queue.push(frame("A"));
        queue.push(frame("B"));

        let b = queue.pop_latest().unwrap();
        assert_eq!(b.position, 1);
        queue.restore_front(b);

        let hashes: Vec<String> = queue.snapshot().iter().map(|r| r.hash().to_string()).collect();
        assert_eq!(hashes, vec!["B", "A"]);
        assert_eq!(queue.pop_latest().unwrap().record.hash(), "A");
        let b = queue.pop_latest().unwrap();
        assert_eq!((b.position, b.attempts), (1, 1));
        assert!(queue.is_empty());
    }
}
