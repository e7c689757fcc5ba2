//! Array model: element types, typed value vectors, and the array descriptor
//! the master keeps for each created array.

use serde::{Deserialize, Serialize};

use crate::partition;

/// Element type of a distributed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit signed integers.
    Int,
    /// IEEE binary64 floats.
    Double,
}

/// A typed vector of element values, as stored at the master, held by the
/// workers, and carried in wire payloads (a plain JSON array of numbers).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Values {
    Int(Vec<i32>),
    Double(Vec<f64>),
}

impl Values {
    pub fn len(&self) -> usize {
        match self {
            Values::Int(v) => v.len(),
            Values::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            Values::Int(_) => ElementType::Int,
            Values::Double(_) => ElementType::Double,
        }
    }

    /// Copy of the half-open element range `[start, end)`.
    pub fn slice(&self, start: usize, end: usize) -> Values {
        match self {
            Values::Int(v) => Values::Int(v[start..end].to_vec()),
            Values::Double(v) => Values::Double(v[start..end].to_vec()),
        }
    }

    /// Coerce to the declared element type: float values are truncated toward
    /// zero, int values widen losslessly. JSON does not distinguish `3` from
    /// `3.0` reliably, so receivers trust the `dataType` field, not the
    /// parsed representation.
    pub fn coerce(self, ty: ElementType) -> Values {
        match (self, ty) {
            (Values::Int(v), ElementType::Double) => {
                Values::Double(v.into_iter().map(|x| x as f64).collect())
            }
            (Values::Double(v), ElementType::Int) => {
                Values::Int(v.into_iter().map(|x| x as i32).collect())
            }
            (v, _) => v,
        }
    }
}

/// One segment of an array: a half-open index range plus current ownership.
/// The range never changes after creation; the ownership fields do (placement,
/// promotion, re-replication).
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Start index (inclusive). Doubles as the on-wire segment id.
    pub start: usize,
    /// End index (exclusive).
    pub end: usize,
    /// Worker currently responsible for computing on this segment.
    pub primary: Option<String>,
    /// Workers holding read-only copies, in placement order.
    pub replicas: Vec<String>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// On-wire segment id (the start index).
    pub fn id(&self) -> usize {
        self.start
    }
}

/// An array held at the master: the immutable value vector plus the segment
/// table. Lives for the master's process lifetime.
#[derive(Debug, Clone)]
pub struct DistributedArray {
    pub array_id: String,
    pub element_type: ElementType,
    pub values: Values,
    pub total_size: usize,
    pub segments: Vec<Segment>,
}

impl DistributedArray {
    /// Builds the descriptor: coerces `values` to the declared element type
    /// and partitions the index space across `worker_count` workers.
    pub fn new(
        array_id: impl Into<String>,
        element_type: ElementType,
        values: Values,
        worker_count: usize,
    ) -> Result<Self, partition::PartitionError> {
        let values = values.coerce(element_type);
        let total_size = values.len();
        let segments = partition::plan_segments(total_size, worker_count)?;
        Ok(Self {
            array_id: array_id.into(),
            element_type,
            values,
            total_size,
            segments,
        })
    }

    /// Copy of the element range covered by `segment`.
    pub fn segment_values(&self, segment: &Segment) -> Values {
        self.values.slice(segment.start, segment.end)
    }

    pub fn segment(&self, segment_id: usize) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id() == segment_id)
    }

    pub fn segment_mut(&mut self, segment_id: usize) -> Option<&mut Segment> {
        self.segments.iter_mut().find(|s| s.id() == segment_id)
    }
}
