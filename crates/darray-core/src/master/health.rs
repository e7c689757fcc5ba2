//! Periodic liveness sweep over the worker registry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use super::recovery;
use super::state::MasterState;

/// Spawns the health monitor: every `check_interval`, workers silent for
/// longer than `liveness_timeout` are latched dead and handed to recovery.
/// The latch guarantees the read-loop failure path and this sweep never
/// double-handle one worker.
pub fn spawn(
    state: Arc<Mutex<MasterState>>,
    check_interval: Duration,
    liveness_timeout: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut state = state.lock().await;
            for worker_id in state.expire_silent_workers(liveness_timeout) {
                tracing::warn!(worker_id = %worker_id, "worker failed health check");
                recovery::handle_worker_failure(&mut state, &worker_id);
            }
        }
    })
}
