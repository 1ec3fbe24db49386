use crate::model::Snapshot;
use std::collections::VecDeque;

pub const MAX_SNAPSHOTS: usize = 120;

/// Bounded newest-first window of snapshots. Inserting past capacity evicts
/// exactly one snapshot from the tail.
#[derive(Debug, Clone)]
pub struct SnapshotBuffer {
    snapshots: VecDeque<Snapshot>,
    capacity: usize,
}

impl Default for SnapshotBuffer {
    fn default() -> Self {
        SnapshotBuffer::new(MAX_SNAPSHOTS)
    }
}

impl SnapshotBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        SnapshotBuffer {
            snapshots: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn insert(&mut self, snapshot: Snapshot) -> Option<Snapshot> {
        self.snapshots.push_front(snapshot);
        if self.snapshots.len() > self.capacity {
            self.snapshots.pop_back()
        } else {
            None
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn newest(&self) -> Option<&Snapshot> {
        self.snapshots.front()
    }

    pub fn oldest(&self) -> Option<&Snapshot> {
        self.snapshots.back()
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }

    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter().rev()
    }

    /// Rebuilds a buffer from a chronological list, keeping only the newest
    /// `capacity` entries. Returns the buffer and how many were dropped.
    pub fn from_oldest_first(history: Vec<Snapshot>, capacity: usize) -> (Self, usize) {
        let mut buffer = SnapshotBuffer::new(capacity);
        let mut dropped = 0;
        for snap in history {
            if buffer.insert(snap).is_some() {
                dropped += 1;
            }
        }
        (buffer, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn empty_at(t: i64) -> Snapshot {
        Snapshot::new(t, BTreeMap::new())
    }

    #[test]
    fn evicts_exactly_one_when_full() {
        let mut buffer = SnapshotBuffer::new(3);
        assert!(buffer.insert(empty_at(1)).is_none());
        assert!(buffer.insert(empty_at(2)).is_none());
        assert!(buffer.insert(empty_at(3)).is_none());
        let evicted = buffer.insert(empty_at(4));
        assert_eq!(evicted.map(|s| s.taken_at), Some(1));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.newest().map(|s| s.taken_at), Some(4));
        assert_eq!(buffer.oldest().map(|s| s.taken_at), Some(2));
        let order: Vec<i64> = buffer.iter_newest_first().map(|s| s.taken_at).collect();
        assert_eq!(order, vec![4, 3, 2]);
    }

    #[test]
    fn default_capacity_is_max_snapshots() {
        let mut buffer = SnapshotBuffer::default();
        for t in 0..(MAX_SNAPSHOTS as i64 + 1) {
            buffer.insert(empty_at(t));
        }
        assert_eq!(buffer.len(), MAX_SNAPSHOTS);
        assert_eq!(buffer.oldest().map(|s| s.taken_at), Some(1));
    }

    #[test]
    fn chronological_restore_keeps_newest() {
        let history: Vec<Snapshot> = (1..=5).map(empty_at).collect();
        let (buffer, dropped) = SnapshotBuffer::from_oldest_first(history, 3);
        assert_eq!(dropped, 2);
        let order: Vec<i64> = buffer.iter_oldest_first().map(|s| s.taken_at).collect();
        assert_eq!(order, vec![3, 4, 5]);
    }
}
