//! Failure recovery: replica promotion and re-replication.
//!
//! Best-effort and per-segment: a segment with no surviving replica is logged
//! as lost and skipped, and a missing target for the replacement replica just
//! leaves the segment under-replicated. Neither aborts the rest of the pass.

use crate::protocol::{Envelope, Payload, MASTER_ID};

use super::state::{MasterState, SegmentRef};

/// Planned handling for one segment whose primary failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryStep {
    pub segment: SegmentRef,
    /// Surviving replica to promote, if any.
    pub promote: Option<String>,
    /// Target for the replacement replica, if promotion happens and a third
    /// live worker exists.
    pub replicate_to: Option<String>,
}

/// Computes the recovery plan for every segment whose primary is `failed`.
/// Replicas are tried in list order; the replacement target is the first live
/// worker that is neither the new primary nor already a replica.
pub fn plan(state: &MasterState, failed: &str) -> Vec<RecoveryStep> {
    let mut steps = Vec::new();
    for seg in state.primaries_of(failed) {
        let replicas = state.replicas_of(&seg);
        let promote = replicas
            .iter()
            .find(|id| *id != failed && state.is_live(id))
            .cloned();

        let replicate_to = promote.as_ref().and_then(|new_primary| {
            let remaining: Vec<&String> = replicas
                .iter()
                .filter(|id| *id != new_primary && *id != failed)
                .collect();
            state
                .live_workers()
                .into_iter()
                .find(|id| id != new_primary && id != failed && !remaining.contains(&id))
        });

        steps.push(RecoveryStep {
            segment: seg,
            promote,
            replicate_to,
        });
    }
    steps
}

/// Handles the failure of one worker: scrubs it from every replica list,
/// promotes a surviving replica for each segment it was primary for,
/// re-replicates where the fleet allows, and finally deletes the record.
///
/// Promotion messages are fire-and-forget; the worker's `RECOVERY_COMPLETE`
/// is informational.
pub fn handle_worker_failure(state: &mut MasterState, failed: &str) {
    tracing::warn!(worker_id = %failed, "recovering segments from failed worker");

    let steps = plan(state, failed);
    state.scrub_replica_everywhere(failed);

    for step in steps {
        let seg = &step.segment;
        let Some(new_primary) = step.promote else {
            tracing::warn!(
                array_id = %seg.array_id,
                segment_id = seg.segment_id,
                "segment unrecoverable: no live replica"
            );
            state.clear_primary(seg);
            continue;
        };

        state.send_to(
            &new_primary,
            Envelope::new(
                MASTER_ID,
                &new_primary,
                Payload::RecoverData {
                    array_id: seg.array_id.clone(),
                    segment_id: seg.segment_id,
                    make_primary: true,
                },
            ),
        );
        state.remove_replica(seg, &new_primary);
        state.assign_primary(seg, &new_primary);
        tracing::info!(
            array_id = %seg.array_id,
            segment_id = seg.segment_id,
            worker_id = %new_primary,
            "promoted replica to primary"
        );

        if let Some(target) = step.replicate_to {
            replicate_segment(state, seg, &target);
        } else {
            tracing::debug!(
                array_id = %seg.array_id,
                segment_id = seg.segment_id,
                "no candidate for replacement replica; running degraded"
            );
        }
    }

    state.remove_worker(failed);
}

/// Sends a fresh copy of the segment to `target` and records it as a replica.
fn replicate_segment(state: &mut MasterState, seg: &SegmentRef, target: &str) {
    let Some(array) = state.array(&seg.array_id) else {
        return;
    };
    let Some(segment) = array.segment(seg.segment_id) else {
        return;
    };
    let payload = Payload::ReplicateData {
        array_id: array.array_id.clone(),
        segment_id: segment.id(),
        start_index: segment.start,
        end_index: segment.end,
        data_type: array.element_type,
        data: array.segment_values(segment),
        is_primary: false,
    };
    state.send_to(target, Envelope::new(MASTER_ID, target, payload));
    state.add_replica(seg, target);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{DistributedArray, ElementType, Values};
    use crate::master::placement;
    use crate::protocol::Envelope;
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    /// Master state with three workers and the 10-element double array laid
    /// out round-robin, plus receivers capturing each worker's outbound queue.
    fn cluster() -> (MasterState, HashMap<String, mpsc::UnboundedReceiver<Envelope>>) {
        let mut state = MasterState::new();
        let mut queues = HashMap::new();
        for id in ["w0", "w1", "w2"] {
            let (tx, rx) = mpsc::unbounded_channel();
            state.register_worker(id, "127.0.0.1".into(), 0, 4, 1024, tx);
            queues.insert(id.to_string(), rx);
        }

        let array = DistributedArray::new(
            "a",
            ElementType::Double,
            Values::Double((0..10).map(f64::from).collect()),
            3,
        )
        .unwrap();
        let segment_ids: Vec<usize> = array.segments.iter().map(|s| s.id()).collect();
        state.insert_array(array);
        let assignments = placement::plan(&segment_ids, &state.live_workers(), 2);
        placement::distribute(&mut state, "a", &assignments);

        // Drain the distribution traffic so tests see only recovery frames.
        for rx in queues.values_mut() {
            while rx.try_recv().is_ok() {}
        }
        (state, queues)
    }

    #[test]
    fn failed_primary_promotes_its_replica_and_rereplicates() {
        let (mut state, mut queues) = cluster();
        // Layout: seg 0 primary w0 replica w1; seg 4 primary w1 replica w2;
        // seg 7 primary w2 replica w0.
        state.mark_dead("w1");
        handle_worker_failure(&mut state, "w1");

        let seg = state.array("a").unwrap().segment(4).unwrap().clone();
        assert_eq!(seg.primary.as_deref(), Some("w2"));
        assert_eq!(seg.replicas, vec!["w0"]);

        // w1 was segment 0's replica; it is gone and nothing replaces it.
        let seg0 = state.array("a").unwrap().segment(0).unwrap().clone();
        assert_eq!(seg0.primary.as_deref(), Some("w0"));
        assert!(seg0.replicas.is_empty());

        // The registry no longer knows w1.
        assert!(state.worker("w1").is_none());
        assert_eq!(state.live_workers(), vec!["w0", "w2"]);

        // w2 got the promotion message.
        let env = queues.get_mut("w2").unwrap().try_recv().unwrap();
        match env.payload {
            Payload::RecoverData {
                array_id,
                segment_id,
                make_primary,
            } => {
                assert_eq!(array_id, "a");
                assert_eq!(segment_id, 4);
                assert!(make_primary);
            }
            other => panic!("expected RecoverData, got {}", other.type_tag()),
        }

        // w0 got the replacement replica with the segment's bytes.
        let env = queues.get_mut("w0").unwrap().try_recv().unwrap();
        match env.payload {
            Payload::ReplicateData {
                array_id,
                segment_id,
                data,
                is_primary,
                ..
            } => {
                assert_eq!(array_id, "a");
                assert_eq!(segment_id, 4);
                assert_eq!(data, Values::Double(vec![4.0, 5.0, 6.0]));
                assert!(!is_primary);
            }
            other => panic!("expected ReplicateData, got {}", other.type_tag()),
        }
    }

    #[test]
    fn promotion_flips_exactly_one_replica() {
        let (mut state, _queues) = cluster();
        state.mark_dead("w0");
        handle_worker_failure(&mut state, "w0");

        let seg0 = state.array("a").unwrap().segment(0).unwrap().clone();
        assert_eq!(seg0.primary.as_deref(), Some("w1"));
        assert!(!seg0.replicas.contains(&"w1".to_string()));
        // Redundancy restored: a third live worker existed.
        assert_eq!(seg0.replicas.len(), 1);
        // Index agrees with the segment object.
        assert!(state
            .primaries_of("w1")
            .contains(&SegmentRef::new("a", 0)));
    }

    #[test]
    fn segment_without_live_replica_is_lost_but_recovery_continues() {
        let mut state = MasterState::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.register_worker("w0", "127.0.0.1".into(), 0, 4, 1024, tx);
        let array =
            DistributedArray::new("a", ElementType::Int, Values::Int(vec![1, 2, 3]), 1).unwrap();
        let segment_ids: Vec<usize> = array.segments.iter().map(|s| s.id()).collect();
        state.insert_array(array);
        let assignments = placement::plan(&segment_ids, &state.live_workers(), 2);
        placement::distribute(&mut state, "a", &assignments);

        state.mark_dead("w0");
        handle_worker_failure(&mut state, "w0");

        let seg = state.array("a").unwrap().segment(0).unwrap().clone();
        assert_eq!(seg.primary, None);
        assert!(seg.replicas.is_empty());
        assert!(state.worker("w0").is_none());
    }

    #[test]
    fn two_worker_fleet_promotes_without_replacement() {
        let mut state = MasterState::new();
        for id in ["w0", "w1"] {
            let (tx, _rx) = mpsc::unbounded_channel();
            state.register_worker(id, "127.0.0.1".into(), 0, 4, 1024, tx);
        }
        let array =
            DistributedArray::new("a", ElementType::Int, Values::Int(vec![1, 2]), 2).unwrap();
        let segment_ids: Vec<usize> = array.segments.iter().map(|s| s.id()).collect();
        state.insert_array(array);
        let assignments = placement::plan(&segment_ids, &state.live_workers(), 2);
        placement::distribute(&mut state, "a", &assignments);

        state.mark_dead("w0");
        let steps = plan(&state, "w0");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].promote.as_deref(), Some("w1"));
        // Only w1 survives, and it is the new primary: no replacement target.
        assert_eq!(steps[0].replicate_to, None);

        handle_worker_failure(&mut state, "w0");
        let seg = state.array("a").unwrap().segment(0).unwrap().clone();
        assert_eq!(seg.primary.as_deref(), Some("w1"));
        assert!(seg.replicas.is_empty());
    }
}
