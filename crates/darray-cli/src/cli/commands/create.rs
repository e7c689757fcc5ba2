//! `darray create-int` / `create-double`: generate a random array and create
//! it on the master.

use anyhow::Result;
use darray_core::array::{ElementType, Values};
use darray_core::client::MasterClient;
use darray_core::config::DarrayConfig;
use rand::Rng;

pub async fn run_create(
    cfg: &DarrayConfig,
    array_id: &str,
    size: usize,
    doubles: bool,
    host: &str,
    port: Option<u16>,
) -> Result<()> {
    let mut rng = rand::thread_rng();
    let (data_type, values) = if doubles {
        (
            ElementType::Double,
            Values::Double((0..size).map(|_| rng.gen_range(1.0..100.0)).collect()),
        )
    } else {
        (
            ElementType::Int,
            Values::Int((0..size).map(|_| rng.gen_range(1..=1000)).collect()),
        )
    };

    let client = MasterClient::new(host, port.unwrap_or(cfg.master_port));
    let reply = client.create_array(array_id, data_type, values).await?;
    match reply.result {
        Some(detail) => println!("create {}: {:?} ({})", array_id, reply.status, detail),
        None => println!("create {}: {:?} ({} elements)", array_id, reply.status, size),
    }
    Ok(())
}
