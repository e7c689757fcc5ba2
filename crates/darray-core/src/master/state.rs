//! Master-side cluster state: worker records, array descriptors, and the
//! derived placement indices, all behind one lock.
//!
//! Three mappings must stay in agreement: worker id → record, worker id →
//! segments it is primary for, and segment → replica ids. Every mutation that
//! touches ownership goes through a method here so the segment tables and the
//! indices cannot drift apart.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::array::DistributedArray;
use crate::protocol::Envelope;

/// Identifies one segment across all arrays.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentRef {
    pub array_id: String,
    pub segment_id: usize,
}

impl SegmentRef {
    pub fn new(array_id: impl Into<String>, segment_id: usize) -> Self {
        Self {
            array_id: array_id.into(),
            segment_id,
        }
    }
}

/// One registered worker.
#[derive(Debug)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub host: String,
    pub port: u16,
    pub cores: u32,
    /// Mebibytes of physical memory, as advertised. Informational.
    pub memory: u64,
    /// Wall clock of the most recent envelope from this worker.
    pub last_heartbeat: Instant,
    /// Single-shot liveness latch: flipped to false exactly once, by whichever
    /// of the health sweep or the read loop notices the failure first.
    pub alive: bool,
    /// Bumped on re-registration so an orphaned read loop cannot touch or
    /// kill the replacement record.
    pub epoch: u64,
    /// Outbound queue; one writer task per connection drains it.
    tx: mpsc::UnboundedSender<Envelope>,
}

/// All mutable master state. Guarded by a single `tokio::sync::Mutex` shared
/// by the acceptor, the per-worker read loops, and the health monitor.
#[derive(Debug, Default)]
pub struct MasterState {
    workers: HashMap<String, WorkerRecord>,
    /// Registration order; placement walks workers in this order.
    order: Vec<String>,
    /// Derived: worker id → segments it is primary for.
    worker_segments: HashMap<String, BTreeSet<SegmentRef>>,
    /// Derived: segment → replica worker ids, in placement order.
    segment_replicas: HashMap<SegmentRef, Vec<String>>,
    arrays: HashMap<String, DistributedArray>,
    next_epoch: u64,
}

impl MasterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a worker record. Re-registration under an existing
    /// id replaces the record (the prior connection is orphaned; its queue
    /// sender is dropped, which ends its writer task) but keeps the worker's
    /// position in registration order. Returns the record's epoch.
    #[allow(clippy::too_many_arguments)]
    pub fn register_worker(
        &mut self,
        worker_id: &str,
        host: String,
        port: u16,
        cores: u32,
        memory: u64,
        tx: mpsc::UnboundedSender<Envelope>,
    ) -> u64 {
        let epoch = self.next_epoch;
        self.next_epoch += 1;
        let record = WorkerRecord {
            worker_id: worker_id.to_string(),
            host,
            port,
            cores,
            memory,
            last_heartbeat: Instant::now(),
            alive: true,
            epoch,
            tx,
        };
        if self.workers.insert(worker_id.to_string(), record).is_none() {
            self.order.push(worker_id.to_string());
        }
        self.worker_segments.entry(worker_id.to_string()).or_default();
        epoch
    }

    /// Refreshes `last_heartbeat`, but only for the connection epoch that
    /// delivered the envelope.
    pub fn touch(&mut self, worker_id: &str, epoch: u64) {
        if let Some(w) = self.workers.get_mut(worker_id) {
            if w.epoch == epoch {
                w.last_heartbeat = Instant::now();
            }
        }
    }

    /// Flips the liveness latch. Returns true only on the first flip, so the
    /// health sweep and the read loop cannot both hand the same worker to
    /// recovery.
    pub fn mark_dead(&mut self, worker_id: &str) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(w) if w.alive => {
                w.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Like [`mark_dead`], but a no-op unless the record still belongs to the
    /// given connection epoch. Used by read loops, which may have been
    /// orphaned by a re-registration.
    ///
    /// [`mark_dead`]: MasterState::mark_dead
    pub fn mark_dead_if_epoch(&mut self, worker_id: &str, epoch: u64) -> bool {
        match self.workers.get_mut(worker_id) {
            Some(w) if w.alive && w.epoch == epoch => {
                w.alive = false;
                true
            }
            _ => false,
        }
    }

    /// Workers silent for longer than `timeout`, latched dead in one sweep.
    pub fn expire_silent_workers(&mut self, timeout: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        for w in self.workers.values_mut() {
            if w.alive && w.last_heartbeat.elapsed() > timeout {
                w.alive = false;
                expired.push(w.worker_id.clone());
            }
        }
        expired
    }

    /// Deletes a worker's record and its primary index entry. Replica-list
    /// scrubbing is the recovery engine's job and happens first.
    pub fn remove_worker(&mut self, worker_id: &str) {
        self.workers.remove(worker_id);
        self.order.retain(|id| id != worker_id);
        self.worker_segments.remove(worker_id);
    }

    pub fn worker(&self, worker_id: &str) -> Option<&WorkerRecord> {
        self.workers.get(worker_id)
    }

    pub fn is_live(&self, worker_id: &str) -> bool {
        self.workers.get(worker_id).is_some_and(|w| w.alive)
    }

    /// Live worker ids in registration order.
    pub fn live_workers(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| self.is_live(id))
            .cloned()
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.order.iter().filter(|id| self.is_live(id)).count()
    }

    /// Enqueues an envelope on a worker's outbound queue. A closed queue means
    /// the connection is already gone; the read loop or health sweep will deal
    /// with the worker, so the send error is ignored here.
    pub fn send_to(&self, worker_id: &str, envelope: Envelope) {
        if let Some(w) = self.workers.get(worker_id) {
            let _ = w.tx.send(envelope);
        }
    }

    /// Inserts an array, replacing any previous version under the same id.
    /// The old version's ownership entries are dropped first so the indices
    /// cannot point at segments that no longer exist.
    pub fn insert_array(&mut self, array: DistributedArray) {
        let array_id = array.array_id.clone();
        for set in self.worker_segments.values_mut() {
            set.retain(|r| r.array_id != array_id);
        }
        self.segment_replicas.retain(|r, _| r.array_id != array_id);
        self.arrays.insert(array_id, array);
    }

    pub fn array(&self, array_id: &str) -> Option<&DistributedArray> {
        self.arrays.get(array_id)
    }

    pub fn arrays(&self) -> impl Iterator<Item = &DistributedArray> {
        self.arrays.values()
    }

    /// Segments the given worker is primary for, in deterministic order.
    pub fn primaries_of(&self, worker_id: &str) -> Vec<SegmentRef> {
        self.worker_segments
            .get(worker_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn replicas_of(&self, seg: &SegmentRef) -> &[String] {
        self.segment_replicas
            .get(seg)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Records `worker_id` as the segment's primary, updating the segment
    /// object and both directions of the primary index.
    pub fn assign_primary(&mut self, seg: &SegmentRef, worker_id: &str) {
        if let Some(array) = self.arrays.get_mut(&seg.array_id) {
            if let Some(segment) = array.segment_mut(seg.segment_id) {
                if let Some(old) = segment.primary.take() {
                    if let Some(set) = self.worker_segments.get_mut(&old) {
                        set.remove(seg);
                    }
                }
                segment.primary = Some(worker_id.to_string());
                self.worker_segments
                    .entry(worker_id.to_string())
                    .or_default()
                    .insert(seg.clone());
            }
        }
    }

    /// Clears a segment's primary (the unrecoverable case: its data is lost).
    pub fn clear_primary(&mut self, seg: &SegmentRef) {
        if let Some(array) = self.arrays.get_mut(&seg.array_id) {
            if let Some(segment) = array.segment_mut(seg.segment_id) {
                if let Some(old) = segment.primary.take() {
                    if let Some(set) = self.worker_segments.get_mut(&old) {
                        set.remove(seg);
                    }
                }
            }
        }
    }

    /// Appends a replica, updating the segment object and the replica index.
    pub fn add_replica(&mut self, seg: &SegmentRef, worker_id: &str) {
        if let Some(array) = self.arrays.get_mut(&seg.array_id) {
            if let Some(segment) = array.segment_mut(seg.segment_id) {
                segment.replicas.push(worker_id.to_string());
                self.segment_replicas
                    .entry(seg.clone())
                    .or_default()
                    .push(worker_id.to_string());
            }
        }
    }

    /// Removes one worker from a segment's replica list (both sides).
    pub fn remove_replica(&mut self, seg: &SegmentRef, worker_id: &str) {
        if let Some(array) = self.arrays.get_mut(&seg.array_id) {
            if let Some(segment) = array.segment_mut(seg.segment_id) {
                segment.replicas.retain(|id| id != worker_id);
            }
        }
        if let Some(list) = self.segment_replicas.get_mut(seg) {
            list.retain(|id| id != worker_id);
        }
    }

    /// Scrubs a worker from every replica list across all arrays.
    pub fn scrub_replica_everywhere(&mut self, worker_id: &str) {
        for array in self.arrays.values_mut() {
            for segment in &mut array.segments {
                segment.replicas.retain(|id| id != worker_id);
            }
        }
        for list in self.segment_replicas.values_mut() {
            list.retain(|id| id != worker_id);
        }
    }
}
