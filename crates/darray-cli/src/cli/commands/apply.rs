//! `darray apply`: broadcast an element-wise operation to the fleet.

use anyhow::Result;
use darray_core::client::MasterClient;
use darray_core::config::DarrayConfig;

pub async fn run_apply(
    cfg: &DarrayConfig,
    array_id: &str,
    operation: &str,
    host: &str,
    port: Option<u16>,
) -> Result<()> {
    let client = MasterClient::new(host, port.unwrap_or(cfg.master_port));
    let reply = client.apply_operation(array_id, operation).await?;
    println!("apply {} on {}: {:?}", operation, array_id, reply.status);
    Ok(())
}
