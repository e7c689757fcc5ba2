//! Master node: the accept loop and first-frame connection routing.
//!
//! Every inbound TCP connection is classified by its first framed envelope:
//! `REGISTER_WORKER` turns it into a long-lived worker channel, anything else
//! is a one-shot client request answered and closed.

mod channel;
mod health;
mod placement;
mod recovery;
mod request;
mod state;

pub use placement::{plan as placement_plan, SegmentAssignment};
pub use recovery::{plan as recovery_plan, RecoveryStep};
pub use state::{MasterState, SegmentRef, WorkerRecord};

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::protocol::{FramedReader, Payload};

/// Tunable master parameters (see [`crate::config::DarrayConfig`] for the
/// on-disk form).
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub port: u16,
    /// Total copies per segment (primary + replicas).
    pub replication_factor: usize,
    pub health_check_interval: Duration,
    pub liveness_timeout: Duration,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            replication_factor: 2,
            health_check_interval: Duration::from_secs(5),
            liveness_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Master {
    cfg: MasterConfig,
    state: Arc<Mutex<MasterState>>,
}

impl Master {
    pub fn new(cfg: MasterConfig) -> Self {
        Self {
            cfg,
            state: Arc::new(Mutex::new(MasterState::new())),
        }
    }

    /// Shared handle to the cluster state, for inspection.
    pub fn state_handle(&self) -> Arc<Mutex<MasterState>> {
        Arc::clone(&self.state)
    }

    /// Binds the configured port and serves until the process is stopped.
    /// Failure to bind is fatal.
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.cfg.port))
            .await
            .with_context(|| format!("bind master listener on port {}", self.cfg.port))?;
        tracing::info!(port = self.cfg.port, "master node started");
        self.serve(listener).await
    }

    /// Accept loop over an already-bound listener (lets callers bind port 0).
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        health::spawn(
            Arc::clone(&self.state),
            self.cfg.health_check_interval,
            self.cfg.liveness_timeout,
        );

        loop {
            let (stream, peer) = listener.accept().await.context("accept connection")?;
            let state = Arc::clone(&self.state);
            let cfg = self.cfg.clone();
            tokio::spawn(async move {
                handle_connection(state, cfg, stream).await;
                tracing::debug!(%peer, "connection closed");
            });
        }
    }
}

/// Reads exactly one framed envelope to classify the connection, then hands
/// it to the worker channel or the client request path.
async fn handle_connection(state: Arc<Mutex<MasterState>>, cfg: MasterConfig, stream: TcpStream) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedReader::new(read_half);

    let first = match reader.next().await {
        Ok(Some(envelope)) => envelope,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!("connection dropped before first frame: {}", e);
            return;
        }
    };

    if matches!(first.payload, Payload::RegisterWorker { .. }) {
        channel::run(state, reader, write_half, first).await;
    } else {
        request::handle(state, cfg, write_half, first).await;
    }
}
