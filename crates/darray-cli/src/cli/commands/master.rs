//! `darray master`: run the coordinator until interrupted.

use anyhow::Result;
use darray_core::config::DarrayConfig;
use darray_core::master::Master;

pub async fn run_master(cfg: &DarrayConfig, port_override: Option<u16>) -> Result<()> {
    let master_cfg = cfg.master_config(port_override);
    println!("darray master listening on port {}", master_cfg.port);
    Master::new(master_cfg).run().await
}
