//! Primary and replica placement for newly created arrays.
//!
//! Segments are assigned round-robin over the live fleet in registration
//! order: segment i's primary is worker `i mod W`, and each replica slot takes
//! the next worker in rotation, skipping the primary.

use crate::array::DistributedArray;
use crate::protocol::{Envelope, Payload, MASTER_ID};

use super::state::{MasterState, SegmentRef};

/// One segment's planned ownership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentAssignment {
    pub segment_id: usize,
    pub primary: String,
    pub replicas: Vec<String>,
}

/// Computes the placement plan for `segment_ids` over `workers` (live ids in
/// registration order). With a single worker no replicas are placed; such a
/// segment is legal but unrecoverable.
pub fn plan(
    segment_ids: &[usize],
    workers: &[String],
    replication_factor: usize,
) -> Vec<SegmentAssignment> {
    let fleet = workers.len();
    if fleet == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(segment_ids.len());
    for (cursor, &segment_id) in segment_ids.iter().enumerate() {
        let primary = workers[cursor % fleet].clone();
        let mut replicas = Vec::new();
        for slot in 1..replication_factor {
            let candidate = &workers[(cursor + slot) % fleet];
            if *candidate != primary && !replicas.contains(candidate) {
                replicas.push(candidate.clone());
            }
        }
        out.push(SegmentAssignment {
            segment_id,
            primary,
            replicas,
        });
    }
    out
}

/// Applies a plan to an already-inserted array: records ownership in the
/// state and enqueues one `DISTRIBUTE_ARRAY` per primary and one
/// `REPLICATE_DATA` per replica, each carrying the segment's values. The
/// distribute frame for a segment is enqueued before its replicate frames.
pub fn distribute(state: &mut MasterState, array_id: &str, assignments: &[SegmentAssignment]) {
    for assignment in assignments {
        let seg = SegmentRef::new(array_id, assignment.segment_id);
        let Some(payloads) = segment_payloads(state.array(array_id), assignment) else {
            continue;
        };
        let (distribute, replicate) = payloads;

        state.assign_primary(&seg, &assignment.primary);
        state.send_to(
            &assignment.primary,
            Envelope::new(MASTER_ID, &assignment.primary, distribute),
        );
        for (replica, payload) in assignment.replicas.iter().zip(replicate) {
            state.add_replica(&seg, replica);
            state.send_to(replica, Envelope::new(MASTER_ID, replica, payload));
        }
    }
}

/// Builds the wire payloads for one assignment: the primary's distribute
/// frame plus one replicate frame per replica slot.
fn segment_payloads(
    array: Option<&DistributedArray>,
    assignment: &SegmentAssignment,
) -> Option<(Payload, Vec<Payload>)> {
    let array = array?;
    let segment = array.segment(assignment.segment_id)?;
    let data = array.segment_values(segment);

    let distribute = Payload::DistributeArray {
        array_id: array.array_id.clone(),
        segment_id: segment.id(),
        start_index: segment.start,
        end_index: segment.end,
        data_type: array.element_type,
        data: data.clone(),
        is_primary: true,
    };
    let replicate = assignment
        .replicas
        .iter()
        .map(|_| Payload::ReplicateData {
            array_id: array.array_id.clone(),
            segment_id: segment.id(),
            start_index: segment.start,
            end_index: segment.end,
            data_type: array.element_type,
            data: data.clone(),
            is_primary: false,
        })
        .collect();
    Some((distribute, replicate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("w{i}")).collect()
    }

    #[test]
    fn three_workers_rotate_primary_and_replica() {
        let assignments = plan(&[0, 4, 7], &fleet(3), 2);
        assert_eq!(
            assignments,
            vec![
                SegmentAssignment {
                    segment_id: 0,
                    primary: "w0".into(),
                    replicas: vec!["w1".into()],
                },
                SegmentAssignment {
                    segment_id: 4,
                    primary: "w1".into(),
                    replicas: vec!["w2".into()],
                },
                SegmentAssignment {
                    segment_id: 7,
                    primary: "w2".into(),
                    replicas: vec!["w0".into()],
                },
            ]
        );
    }

    #[test]
    fn single_worker_gets_no_replicas() {
        let assignments = plan(&[0], &fleet(1), 2);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].primary, "w0");
        assert!(assignments[0].replicas.is_empty());
    }

    #[test]
    fn primary_is_never_its_own_replica() {
        for workers in 1..=5 {
            for rf in 1..=4 {
                let ids: Vec<usize> = (0..7).collect();
                for a in plan(&ids, &fleet(workers), rf) {
                    assert!(!a.replicas.contains(&a.primary));
                    let mut dedup = a.replicas.clone();
                    dedup.dedup();
                    assert_eq!(dedup, a.replicas, "no duplicate replicas");
                }
            }
        }
    }

    #[test]
    fn default_replication_yields_one_replica_with_two_workers() {
        let assignments = plan(&[0, 5], &fleet(2), 2);
        for a in &assignments {
            assert_eq!(a.replicas.len(), 1);
        }
        assert_eq!(assignments[0].primary, "w0");
        assert_eq!(assignments[0].replicas, vec!["w1".to_string()]);
        assert_eq!(assignments[1].primary, "w1");
        assert_eq!(assignments[1].replicas, vec!["w0".to_string()]);
    }
}
