//! Long-lived worker channels.
//!
//! Each registered worker gets two tasks: this read loop (the sole reader of
//! the socket) and a writer task that alone owns the write half, draining the
//! record's outbound queue so frames from concurrent producers never
//! interleave.

use std::sync::Arc;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};

use crate::protocol::{forward_frames, Envelope, FramedReader, Payload};

use super::recovery;
use super::state::MasterState;

/// Registers the worker and runs its read loop until the connection dies.
/// On exit, the worker is marked dead and recovered, unless a newer
/// registration has replaced this record in the meantime.
pub async fn run(
    state: Arc<Mutex<MasterState>>,
    reader: FramedReader<OwnedReadHalf>,
    write_half: OwnedWriteHalf,
    register: Envelope,
) {
    let worker_id = register.from.clone();
    let Payload::RegisterWorker {
        host,
        port,
        cores,
        memory,
    } = register.payload
    else {
        return;
    };

    let (tx, rx) = mpsc::unbounded_channel();
    let epoch = {
        let mut s = state.lock().await;
        s.register_worker(&worker_id, host, port, cores, memory, tx)
    };
    tracing::info!(worker_id = %worker_id, cores, memory_mib = memory, "worker registered");

    let writer = tokio::spawn(forward_frames(write_half, rx));
    read_loop(&state, &worker_id, epoch, reader).await;

    {
        let mut s = state.lock().await;
        if s.mark_dead_if_epoch(&worker_id, epoch) {
            tracing::warn!(worker_id = %worker_id, "lost connection to worker");
            recovery::handle_worker_failure(&mut s, &worker_id);
        }
    }
    // Removing the record dropped its queue sender, which ends the writer.
    let _ = writer.await;
}

/// Reads envelopes until EOF or a transport error. Every envelope refreshes
/// the worker's heartbeat clock.
async fn read_loop(
    state: &Arc<Mutex<MasterState>>,
    worker_id: &str,
    epoch: u64,
    mut reader: FramedReader<OwnedReadHalf>,
) {
    loop {
        let envelope = match reader.next().await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(worker_id = %worker_id, "worker channel read: {}", e);
                return;
            }
        };

        state.lock().await.touch(worker_id, epoch);

        match envelope.payload {
            Payload::Heartbeat {} => {
                tracing::trace!(worker_id = %worker_id, "heartbeat");
            }
            Payload::SegmentResult {
                array_id,
                segment_id,
                status,
                ..
            } => {
                tracing::info!(
                    worker_id = %worker_id,
                    array_id = %array_id,
                    segment_id,
                    status = %status,
                    "segment result received"
                );
            }
            Payload::RecoveryComplete {
                array_id,
                segment_id,
                status,
            } => {
                tracing::info!(
                    worker_id = %worker_id,
                    array_id = %array_id,
                    segment_id,
                    status = %status,
                    "recovery completed by worker"
                );
            }
            other => {
                tracing::warn!(
                    worker_id = %worker_id,
                    message_type = other.type_tag(),
                    "unexpected message on worker channel"
                );
            }
        }
    }
}
