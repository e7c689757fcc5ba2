//! Worker node: master connection, heartbeat loop, and message dispatch.

pub mod compute;
mod store;

pub use store::{SegmentRole, SegmentStore, StoredSegment};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::protocol::{forward_frames, Envelope, FramedReader, Payload, MASTER_ID};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub master_host: String,
    pub master_port: u16,
    pub heartbeat_interval: Duration,
}

impl WorkerConfig {
    pub fn new(
        worker_id: impl Into<String>,
        master_host: impl Into<String>,
        master_port: u16,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            master_host: master_host.into(),
            master_port,
            heartbeat_interval: Duration::from_secs(3),
        }
    }
}

/// Connects to the master, registers, and serves messages until the master
/// sends `SHUTDOWN` or the connection drops. Failure to connect is fatal;
/// there is no reconnection.
pub async fn run(cfg: WorkerConfig) -> Result<()> {
    let stream = TcpStream::connect((cfg.master_host.as_str(), cfg.master_port))
        .await
        .with_context(|| {
            format!(
                "connect to master at {}:{}",
                cfg.master_host, cfg.master_port
            )
        })?;
    let local = stream.local_addr().context("local address")?;
    let (read_half, write_half) = stream.into_split();

    // All writes (registration, heartbeats, results) go through one queue so
    // the heartbeat task and compute tasks cannot interleave frames.
    let (tx, rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_frames(write_half, rx));

    tx.send(Envelope::new(
        &cfg.worker_id,
        MASTER_ID,
        Payload::RegisterWorker {
            host: local.ip().to_string(),
            port: local.port(),
            cores: num_cpus::get() as u32,
            memory: physical_memory_mib(),
        },
    ))
    .ok();
    tracing::info!(worker_id = %cfg.worker_id, "registered with master");

    let heartbeat = tokio::spawn(heartbeat_loop(
        cfg.worker_id.clone(),
        tx.clone(),
        cfg.heartbeat_interval,
    ));

    let store = Arc::new(Mutex::new(SegmentStore::new()));
    let mut reader = FramedReader::new(read_half);
    loop {
        match reader.next().await {
            Ok(Some(envelope)) => {
                if !dispatch(&cfg.worker_id, &store, &tx, envelope) {
                    tracing::info!(worker_id = %cfg.worker_id, "shutdown requested by master");
                    break;
                }
            }
            Ok(None) => {
                tracing::info!(worker_id = %cfg.worker_id, "master connection closed");
                break;
            }
            Err(e) => {
                tracing::warn!(worker_id = %cfg.worker_id, "master connection read: {}", e);
                break;
            }
        }
    }

    heartbeat.abort();
    drop(tx);
    let _ = writer.await;
    Ok(())
}

/// Writes one `HEARTBEAT` per interval until the outbound queue closes.
async fn heartbeat_loop(
    worker_id: String,
    tx: mpsc::UnboundedSender<Envelope>,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; registration already proved liveness.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if tx
            .send(Envelope::new(&worker_id, MASTER_ID, Payload::Heartbeat {}))
            .is_err()
        {
            return;
        }
    }
}

/// Handles one envelope from the master. Returns false on `SHUTDOWN`.
fn dispatch(
    worker_id: &str,
    store: &Arc<Mutex<SegmentStore>>,
    tx: &mpsc::UnboundedSender<Envelope>,
    envelope: Envelope,
) -> bool {
    match envelope.payload {
        Payload::DistributeArray {
            array_id,
            segment_id,
            start_index,
            end_index,
            data_type,
            data,
            is_primary,
        } => {
            let role = if is_primary {
                SegmentRole::Primary
            } else {
                SegmentRole::Replica
            };
            store_segment(
                store,
                &array_id,
                StoredSegment {
                    segment_id,
                    start_index,
                    end_index,
                    values: data.coerce(data_type),
                },
                role,
            );
        }
        // Same shape as DISTRIBUTE_ARRAY, but the role is forced to replica
        // regardless of what the payload claims.
        Payload::ReplicateData {
            array_id,
            segment_id,
            start_index,
            end_index,
            data_type,
            data,
            ..
        } => {
            store_segment(
                store,
                &array_id,
                StoredSegment {
                    segment_id,
                    start_index,
                    end_index,
                    values: data.coerce(data_type),
                },
                SegmentRole::Replica,
            );
        }
        Payload::RecoverData {
            array_id,
            segment_id,
            make_primary,
        } => {
            if !make_primary {
                tracing::debug!(array_id = %array_id, segment_id, "ignoring non-promoting recover");
            } else if store.lock().unwrap().promote(&array_id, segment_id) {
                tracing::info!(array_id = %array_id, segment_id, "promoted replica to primary");
                tx.send(Envelope::new(
                    worker_id,
                    MASTER_ID,
                    Payload::RecoveryComplete {
                        array_id,
                        segment_id,
                        status: "completed".into(),
                    },
                ))
                .ok();
            } else {
                tracing::warn!(array_id = %array_id, segment_id, "no replica to promote");
            }
        }
        Payload::ProcessSegment {
            array_id,
            operation,
        } => {
            process_segment(worker_id, store, tx, array_id, operation);
        }
        Payload::Shutdown {} => return false,
        other => {
            tracing::warn!(
                message_type = other.type_tag(),
                "unexpected message from master"
            );
        }
    }
    true
}

fn store_segment(
    store: &Arc<Mutex<SegmentStore>>,
    array_id: &str,
    segment: StoredSegment,
    role: SegmentRole,
) {
    tracing::info!(
        array_id = %array_id,
        segment_id = segment.segment_id,
        elements = segment.values.len(),
        primary = (role == SegmentRole::Primary),
        "stored segment"
    );
    store.lock().unwrap().store(array_id, segment, role);
}

/// Runs the kernel over this worker's primary segment of the array, off the
/// read loop. Holding no primary for the array is a silent no-op.
fn process_segment(
    worker_id: &str,
    store: &Arc<Mutex<SegmentStore>>,
    tx: &mpsc::UnboundedSender<Envelope>,
    array_id: String,
    operation: String,
) {
    let segment = match store.lock().unwrap().primary_for(&array_id) {
        Some(segment) => segment.clone(),
        None => {
            tracing::debug!(array_id = %array_id, "no primary segment for operation");
            return;
        }
    };

    let worker_id = worker_id.to_string();
    let store = Arc::clone(store);
    let tx = tx.clone();
    tokio::task::spawn_blocking(move || {
        let Some(result) = compute::apply_operation(&operation, &segment.values) else {
            tracing::warn!(
                array_id = %array_id,
                operation = %operation,
                "unknown operation or mismatched element type"
            );
            return;
        };
        tracing::info!(
            array_id = %array_id,
            operation = %operation,
            segment_id = segment.segment_id,
            elements = result.len(),
            "operation completed"
        );
        store.lock().unwrap().store_result(&array_id, result.clone());
        tx.send(Envelope::new(
            worker_id,
            MASTER_ID,
            Payload::SegmentResult {
                array_id,
                segment_id: segment.segment_id,
                status: "completed".into(),
                data: result,
            },
        ))
        .ok();
    });
}

/// Mebibytes of physical memory, advertised at registration. Informational;
/// the master never reads it after storing the record.
#[cfg(unix)]
fn physical_memory_mib() -> u64 {
    // SAFETY: sysconf has no memory-safety preconditions.
    let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGE_SIZE) };
    if pages <= 0 || page_size <= 0 {
        return 0;
    }
    (pages as u64).saturating_mul(page_size as u64) / (1024 * 1024)
}

#[cfg(not(unix))]
fn physical_memory_mib() -> u64 {
    0
}
