//! Shared helpers for the cluster integration tests.

pub mod stub_worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use darray_core::master::{Master, MasterConfig, MasterState};
use tokio::sync::Mutex;

/// Starts a master on an ephemeral port and returns its address plus a handle
/// to the cluster state for assertions.
pub async fn start_master(cfg: MasterConfig) -> (SocketAddr, Arc<Mutex<MasterState>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let master = Master::new(cfg);
    let state = master.state_handle();
    tokio::spawn(async move {
        let _ = master.serve(listener).await;
    });
    (addr, state)
}

/// Polls `pred` against the locked master state every 10 ms until it holds or
/// `timeout` elapses.
pub async fn wait_for_state<F>(
    state: &Arc<Mutex<MasterState>>,
    timeout: Duration,
    mut pred: F,
) -> bool
where
    F: FnMut(&MasterState) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if pred(&*state.lock().await) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
