//! `darray worker`: run a worker node until the master disconnects or sends
//! a shutdown.

use anyhow::Result;
use darray_core::config::DarrayConfig;
use darray_core::worker::{self, WorkerConfig};

pub async fn run_worker(
    cfg: &DarrayConfig,
    worker_id: String,
    master_host: String,
    master_port: u16,
) -> Result<()> {
    let mut worker_cfg = WorkerConfig::new(worker_id, master_host, master_port);
    worker_cfg.heartbeat_interval = cfg.heartbeat_interval();
    println!(
        "darray worker {} connecting to {}:{}",
        worker_cfg.worker_id, worker_cfg.master_host, worker_cfg.master_port
    );
    worker::run(worker_cfg).await
}
