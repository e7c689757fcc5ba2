//! Balanced contiguous partitioning of an array across the fleet.
//!
//! For an array of length L and W workers, produces `min(L, W)` segments in
//! index order: the first `L mod W` are one element longer than the rest, so
//! lengths differ by at most one. Empty segments are never created.

use crate::array::Segment;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum PartitionError {
    /// No live workers to partition across.
    #[error("no live workers to partition across")]
    EmptyFleet,
}

/// Splits `[0, total_size)` into balanced segments, one per worker slot.
/// Ownership fields are left unset; placement fills them in.
pub fn plan_segments(
    total_size: usize,
    worker_count: usize,
) -> Result<Vec<Segment>, PartitionError> {
    if worker_count == 0 {
        return Err(PartitionError::EmptyFleet);
    }

    let base = total_size / worker_count;
    let remainder = total_size % worker_count;

    let mut out = Vec::with_capacity(worker_count.min(total_size));
    let mut offset = 0;

    for i in 0..worker_count {
        let len = base + usize::from(i < remainder);
        if len == 0 {
            break;
        }
        out.push(Segment {
            start: offset,
            end: offset + len,
            primary: None,
            replicas: Vec::new(),
        });
        offset += len;
    }

    Ok(out)
}
