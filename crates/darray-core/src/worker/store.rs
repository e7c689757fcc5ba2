//! Worker-side segment buffers and role bookkeeping.
//!
//! Primary buffers are keyed by array id (the round-robin placement gives a
//! worker at most one primary segment per array); replica buffers are keyed
//! by `arrayId#segmentId`. A role flag per segment key guarantees a given
//! `(arrayId, segmentId)` is held in at most one role at a time.

use std::collections::HashMap;

use crate::array::Values;

/// Role of a stored segment copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRole {
    Primary,
    Replica,
}

/// One stored segment copy.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSegment {
    pub segment_id: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub values: Values,
}

fn segment_key(array_id: &str, segment_id: usize) -> String {
    format!("{array_id}#{segment_id}")
}

/// All buffers held by one worker. Shared between the receive loop and the
/// compute pool; callers wrap it in a mutex.
#[derive(Debug, Default)]
pub struct SegmentStore {
    /// Primary buffers by array id.
    primary: HashMap<String, StoredSegment>,
    /// Replica buffers by segment key.
    replicas: HashMap<String, StoredSegment>,
    /// Role flag by segment key.
    roles: HashMap<String, SegmentRole>,
    /// Computed operation results by array id.
    results: HashMap<String, Values>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a segment under the given role, dropping any copy of the same
    /// segment held under the other role.
    pub fn store(&mut self, array_id: &str, segment: StoredSegment, role: SegmentRole) {
        let key = segment_key(array_id, segment.segment_id);
        match role {
            SegmentRole::Primary => {
                self.replicas.remove(&key);
                self.primary.insert(array_id.to_string(), segment);
            }
            SegmentRole::Replica => {
                if self
                    .primary
                    .get(array_id)
                    .is_some_and(|p| p.segment_id == segment.segment_id)
                {
                    self.primary.remove(array_id);
                }
                self.replicas.insert(key.clone(), segment);
            }
        }
        self.roles.insert(key, role);
    }

    /// Promotes a replica to primary. Returns false when no such replica is
    /// held (the caller logs and ignores).
    pub fn promote(&mut self, array_id: &str, segment_id: usize) -> bool {
        let key = segment_key(array_id, segment_id);
        let Some(segment) = self.replicas.remove(&key) else {
            return false;
        };
        self.roles.insert(key, SegmentRole::Primary);
        self.primary.insert(array_id.to_string(), segment);
        true
    }

    /// The primary segment this worker holds for an array, if any.
    pub fn primary_for(&self, array_id: &str) -> Option<&StoredSegment> {
        self.primary.get(array_id)
    }

    pub fn replica_for(&self, array_id: &str, segment_id: usize) -> Option<&StoredSegment> {
        self.replicas.get(&segment_key(array_id, segment_id))
    }

    pub fn role_of(&self, array_id: &str, segment_id: usize) -> Option<SegmentRole> {
        self.roles.get(&segment_key(array_id, segment_id)).copied()
    }

    pub fn store_result(&mut self, array_id: &str, values: Values) {
        self.results.insert(array_id.to_string(), values);
    }

    pub fn result_for(&self, array_id: &str) -> Option<&Values> {
        self.results.get(array_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(segment_id: usize, values: Vec<i32>) -> StoredSegment {
        let len = values.len();
        StoredSegment {
            segment_id,
            start_index: segment_id,
            end_index: segment_id + len,
            values: Values::Int(values),
        }
    }

    #[test]
    fn a_segment_is_held_in_exactly_one_role() {
        let mut store = SegmentStore::new();
        store.store("a", seg(0, vec![1, 2]), SegmentRole::Primary);
        assert_eq!(store.role_of("a", 0), Some(SegmentRole::Primary));
        assert!(store.primary_for("a").is_some());
        assert!(store.replica_for("a", 0).is_none());

        // Re-delivery as replica flips the role and drops the primary copy.
        store.store("a", seg(0, vec![1, 2]), SegmentRole::Replica);
        assert_eq!(store.role_of("a", 0), Some(SegmentRole::Replica));
        assert!(store.primary_for("a").is_none());
        assert!(store.replica_for("a", 0).is_some());
    }

    #[test]
    fn promote_moves_the_buffer_and_flips_the_flag() {
        let mut store = SegmentStore::new();
        store.store("a", seg(4, vec![4, 5, 6]), SegmentRole::Replica);
        assert!(store.promote("a", 4));
        assert_eq!(store.role_of("a", 4), Some(SegmentRole::Primary));
        assert!(store.replica_for("a", 4).is_none());
        let primary = store.primary_for("a").unwrap();
        assert_eq!(primary.segment_id, 4);
        assert_eq!(primary.values, Values::Int(vec![4, 5, 6]));
    }

    #[test]
    fn promote_without_a_replica_is_refused() {
        let mut store = SegmentStore::new();
        assert!(!store.promote("a", 0));
        assert!(store.primary_for("a").is_none());
    }

    #[test]
    fn replica_of_a_different_segment_keeps_the_primary() {
        let mut store = SegmentStore::new();
        store.store("a", seg(0, vec![1, 2]), SegmentRole::Primary);
        // A replica for another segment of the same array coexists.
        store.store("a", seg(5, vec![6, 7]), SegmentRole::Replica);
        assert!(store.primary_for("a").is_some());
        assert!(store.replica_for("a", 5).is_some());
        assert_eq!(store.role_of("a", 0), Some(SegmentRole::Primary));
        assert_eq!(store.role_of("a", 5), Some(SegmentRole::Replica));
    }

    #[test]
    fn results_are_kept_by_array_id() {
        let mut store = SegmentStore::new();
        store.store_result("a", Values::Int(vec![9]));
        assert_eq!(store.result_for("a"), Some(&Values::Int(vec![9])));
        assert!(store.result_for("b").is_none());
    }
}
