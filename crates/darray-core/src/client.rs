//! Client API: one TCP connection per request.
//!
//! Clients are ephemeral: each call dials the master, writes one envelope,
//! reads the single `OPERATION_COMPLETE` reply, and closes.

use anyhow::{bail, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::array::{ElementType, Values};
use crate::protocol::{encode, Envelope, FramedReader, OpStatus, Payload, MASTER_ID};

/// Parsed `OPERATION_COMPLETE` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationReply {
    pub status: OpStatus,
    pub array_id: Option<String>,
    pub result: Option<String>,
}

pub struct MasterClient {
    host: String,
    port: u16,
    client_id: String,
}

impl MasterClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: "client".into(),
        }
    }

    /// Creates an array on the master, which partitions and distributes it.
    pub async fn create_array(
        &self,
        array_id: &str,
        data_type: ElementType,
        values: Values,
    ) -> Result<OperationReply> {
        self.round_trip(Payload::CreateArray {
            array_id: array_id.into(),
            data_type,
            values,
        })
        .await
    }

    /// Applies an element-wise operation; the master replies as soon as the
    /// broadcast is enqueued, before any worker finishes.
    pub async fn apply_operation(&self, array_id: &str, operation: &str) -> Result<OperationReply> {
        self.round_trip(Payload::ApplyOperation {
            array_id: array_id.into(),
            operation: operation.into(),
        })
        .await
    }

    /// Fetches the operation result. The master currently answers with a
    /// fixed completion message rather than aggregated data.
    pub async fn get_result(&self, array_id: &str) -> Result<OperationReply> {
        self.round_trip(Payload::GetResult {
            array_id: array_id.into(),
        })
        .await
    }

    async fn round_trip(&self, payload: Payload) -> Result<OperationReply> {
        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("connect to master at {}:{}", self.host, self.port))?;
        let (read_half, mut write_half) = stream.into_split();

        let envelope = Envelope::new(&self.client_id, MASTER_ID, payload);
        let bytes = encode(&envelope).context("encode request")?;
        write_half.write_all(&bytes).await.context("send request")?;

        let mut reader = FramedReader::new(read_half);
        let reply = reader
            .next()
            .await
            .context("read reply")?
            .context("master closed the connection without a reply")?;

        match reply.payload {
            Payload::OperationComplete {
                status,
                array_id,
                result,
            } => Ok(OperationReply {
                status,
                array_id,
                result,
            }),
            other => bail!("unexpected reply type {}", other.type_tag()),
        }
    }
}
