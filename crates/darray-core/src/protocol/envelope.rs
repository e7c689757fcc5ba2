//! Envelope and payload types for the master/worker/client protocol.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::array::{ElementType, Values};

/// Reserved node id of the coordinator.
pub const MASTER_ID: &str = "master";

/// Milliseconds since the Unix epoch, as carried in `timestamp`.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One framed wire message. `payload` flattens to the `type` tag plus the
/// typed `data` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub payload: Payload,
    pub from: String,
    pub to: String,
    pub timestamp: i64,
}

impl Envelope {
    /// Builds an envelope stamped with the current time.
    pub fn new(from: impl Into<String>, to: impl Into<String>, payload: Payload) -> Self {
        Self {
            payload,
            from: from.into(),
            to: to.into(),
            timestamp: now_millis(),
        }
    }
}

/// Status values carried by `OPERATION_COMPLETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpStatus {
    Created,
    Processing,
    Complete,
    Error,
}

/// The closed set of message types and their payload shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Payload {
    RegisterWorker {
        host: String,
        port: u16,
        cores: u32,
        /// Mebibytes of physical memory. Informational only.
        memory: u64,
    },
    Heartbeat {},
    Shutdown {},
    CreateArray {
        array_id: String,
        data_type: ElementType,
        values: Values,
    },
    ApplyOperation {
        array_id: String,
        operation: String,
    },
    GetResult {
        array_id: String,
    },
    OperationComplete {
        status: OpStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        array_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
    },
    DistributeArray {
        array_id: String,
        segment_id: usize,
        start_index: usize,
        end_index: usize,
        data_type: ElementType,
        data: Values,
        is_primary: bool,
    },
    ReplicateData {
        array_id: String,
        segment_id: usize,
        start_index: usize,
        end_index: usize,
        data_type: ElementType,
        data: Values,
        is_primary: bool,
    },
    ProcessSegment {
        array_id: String,
        operation: String,
    },
    SegmentResult {
        array_id: String,
        segment_id: usize,
        status: String,
        data: Values,
    },
    RecoverData {
        array_id: String,
        segment_id: usize,
        make_primary: bool,
    },
    RecoveryComplete {
        array_id: String,
        segment_id: usize,
        status: String,
    },
    // Reserved tags, retained for catalogue completeness.
    NodeFailure {},
    WorkerStatus {},
}

impl Payload {
    /// The on-wire `type` tag.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::RegisterWorker { .. } => "REGISTER_WORKER",
            Payload::Heartbeat {} => "HEARTBEAT",
            Payload::Shutdown {} => "SHUTDOWN",
            Payload::CreateArray { .. } => "CREATE_ARRAY",
            Payload::ApplyOperation { .. } => "APPLY_OPERATION",
            Payload::GetResult { .. } => "GET_RESULT",
            Payload::OperationComplete { .. } => "OPERATION_COMPLETE",
            Payload::DistributeArray { .. } => "DISTRIBUTE_ARRAY",
            Payload::ReplicateData { .. } => "REPLICATE_DATA",
            Payload::ProcessSegment { .. } => "PROCESS_SEGMENT",
            Payload::SegmentResult { .. } => "SEGMENT_RESULT",
            Payload::RecoverData { .. } => "RECOVER_DATA",
            Payload::RecoveryComplete { .. } => "RECOVERY_COMPLETE",
            Payload::NodeFailure {} => "NODE_FAILURE",
            Payload::WorkerStatus {} => "WORKER_STATUS",
        }
    }
}

const KNOWN_TYPES: &[&str] = &[
    "REGISTER_WORKER",
    "HEARTBEAT",
    "SHUTDOWN",
    "CREATE_ARRAY",
    "APPLY_OPERATION",
    "GET_RESULT",
    "OPERATION_COMPLETE",
    "DISTRIBUTE_ARRAY",
    "REPLICATE_DATA",
    "PROCESS_SEGMENT",
    "SEGMENT_RESULT",
    "RECOVER_DATA",
    "RECOVERY_COMPLETE",
    "NODE_FAILURE",
    "WORKER_STATUS",
];

/// Whether `tag` is in the closed message-type set.
pub fn known_type(tag: &str) -> bool {
    KNOWN_TYPES.contains(&tag)
}
