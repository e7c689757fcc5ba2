//! `darray get`: fetch the result of the last operation on an array.

use anyhow::Result;
use darray_core::client::MasterClient;
use darray_core::config::DarrayConfig;

pub async fn run_get(
    cfg: &DarrayConfig,
    array_id: &str,
    host: &str,
    port: Option<u16>,
) -> Result<()> {
    let client = MasterClient::new(host, port.unwrap_or(cfg.master_port));
    let reply = client.get_result(array_id).await?;
    println!(
        "get {}: {:?} {}",
        array_id,
        reply.status,
        reply.result.unwrap_or_default()
    );
    Ok(())
}
