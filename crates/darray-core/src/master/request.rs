//! One-shot client requests: create, apply, get.
//!
//! The connection is answered with a single `OPERATION_COMPLETE` frame and
//! closed. Distribution writes are enqueued before the create reply is sent,
//! so a later `APPLY_OPERATION` can never overtake its array's segments on a
//! worker channel.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::array::{DistributedArray, ElementType, Values};
use crate::protocol::{encode, Envelope, OpStatus, Payload, MASTER_ID};

use super::placement;
use super::state::MasterState;
use super::MasterConfig;

pub async fn handle(
    state: Arc<Mutex<MasterState>>,
    cfg: MasterConfig,
    mut write_half: OwnedWriteHalf,
    request: Envelope,
) {
    let client = request.from.clone();
    let reply = match request.payload {
        Payload::CreateArray {
            array_id,
            data_type,
            values,
        } => create_array(&state, &cfg, array_id, data_type, values).await,
        Payload::ApplyOperation {
            array_id,
            operation,
        } => apply_operation(&state, array_id, operation).await,
        Payload::GetResult { array_id } => get_result(array_id),
        other => {
            tracing::warn!(
                message_type = other.type_tag(),
                "unsupported client request dropped"
            );
            return;
        }
    };

    let envelope = Envelope::new(MASTER_ID, client, reply);
    match encode(&envelope) {
        Ok(bytes) => {
            if let Err(e) = write_half.write_all(&bytes).await {
                tracing::debug!("client reply write: {}", e);
            }
        }
        Err(e) => tracing::warn!("client reply encode: {}", e),
    }
}

/// Creates the array, partitions it over the live fleet, and pushes every
/// segment to its primary and replicas before replying `created`.
async fn create_array(
    state: &Arc<Mutex<MasterState>>,
    cfg: &MasterConfig,
    array_id: String,
    data_type: ElementType,
    values: Values,
) -> Payload {
    let mut s = state.lock().await;
    let workers = s.live_workers();
    if workers.is_empty() {
        tracing::warn!(array_id = %array_id, "refusing CREATE_ARRAY: no live workers");
        return Payload::OperationComplete {
            status: OpStatus::Error,
            array_id: Some(array_id),
            result: Some("no live workers registered".into()),
        };
    }

    let array = match DistributedArray::new(&array_id, data_type, values, workers.len()) {
        Ok(array) => array,
        Err(e) => {
            return Payload::OperationComplete {
                status: OpStatus::Error,
                array_id: Some(array_id),
                result: Some(e.to_string()),
            };
        }
    };
    let segment_ids: Vec<usize> = array.segments.iter().map(|seg| seg.id()).collect();
    tracing::info!(
        array_id = %array_id,
        elements = array.total_size,
        segments = segment_ids.len(),
        "creating array"
    );

    s.insert_array(array);
    let assignments = placement::plan(&segment_ids, &workers, cfg.replication_factor);
    placement::distribute(&mut s, &array_id, &assignments);

    Payload::OperationComplete {
        status: OpStatus::Created,
        array_id: Some(array_id),
        result: None,
    }
}

/// Broadcasts `PROCESS_SEGMENT` to every live worker and replies immediately;
/// workers holding no primary segment of the array do nothing. The master
/// does not wait for results.
async fn apply_operation(
    state: &Arc<Mutex<MasterState>>,
    array_id: String,
    operation: String,
) -> Payload {
    let s = state.lock().await;
    let workers = s.live_workers();
    tracing::info!(
        array_id = %array_id,
        operation = %operation,
        fleet = workers.len(),
        "broadcasting operation"
    );
    for worker_id in &workers {
        s.send_to(
            worker_id,
            Envelope::new(
                MASTER_ID,
                worker_id,
                Payload::ProcessSegment {
                    array_id: array_id.clone(),
                    operation: operation.clone(),
                },
            ),
        );
    }

    Payload::OperationComplete {
        status: OpStatus::Processing,
        array_id: Some(array_id),
        result: None,
    }
}

/// Result retrieval is a fixed-contract stub: workers hold their computed
/// buffers, but nothing aggregates them back to the client yet.
fn get_result(array_id: String) -> Payload {
    tracing::debug!(array_id = %array_id, "result requested");
    Payload::OperationComplete {
        status: OpStatus::Complete,
        array_id: None,
        result: Some("Operation completed successfully".into()),
    }
}
