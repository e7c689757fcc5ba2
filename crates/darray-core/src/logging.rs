//! Logging init: per-node file under the XDG state dir, or stderr fallback.
//!
//! Each node logs to its own file (`master.log`, `worker-<id>.log`) so
//! colocated processes on one host do not interleave.

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,darray=debug"))
}

/// Initialize structured logging to `~/.local/state/darray/<node>.log`.
/// On failure (e.g. log dir unwritable), returns Err so the caller can fall
/// back to [`init_logging_stderr`].
pub fn init_logging(node: &str) -> Result<()> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("darray")?;
    let log_dir = xdg_dirs.get_state_home();
    fs::create_dir_all(&log_dir)?;
    let log_file_path: PathBuf = log_dir.join(format!("{node}.log"));

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();

    tracing::info!("darray logging initialized at {}", log_file_path.display());
    Ok(())
}

/// Initialize logging to stderr only (no file). Use when [`init_logging`]
/// fails so the process still reports what it is doing.
pub fn init_logging_stderr() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
