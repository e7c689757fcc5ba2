use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::master::MasterConfig;

/// Global configuration loaded from `~/.config/darray/config.toml`.
///
/// Timer periods are tunable so small deployments (and tests) can shrink the
/// failure-detection window; the defaults match the protocol's intended
/// 3 s / 5 s / 10 s cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DarrayConfig {
    /// TCP port the master listens on.
    pub master_port: u16,
    /// Total copies of each segment (primary + replicas).
    pub replication_factor: usize,
    /// Seconds between worker heartbeats.
    pub heartbeat_interval_secs: u64,
    /// Seconds of silence before a worker is declared dead.
    pub liveness_timeout_secs: u64,
    /// Seconds between health-monitor sweeps.
    pub health_check_interval_secs: u64,
}

impl Default for DarrayConfig {
    fn default() -> Self {
        Self {
            master_port: 5000,
            replication_factor: 2,
            heartbeat_interval_secs: 3,
            liveness_timeout_secs: 10,
            health_check_interval_secs: 5,
        }
    }
}

impl DarrayConfig {
    /// Master-side view of this config. `port_override` wins over the file.
    pub fn master_config(&self, port_override: Option<u16>) -> MasterConfig {
        MasterConfig {
            port: port_override.unwrap_or(self.master_port),
            replication_factor: self.replication_factor.max(1),
            health_check_interval: Duration::from_secs(self.health_check_interval_secs),
            liveness_timeout: Duration::from_secs(self.liveness_timeout_secs),
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("darray")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<DarrayConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = DarrayConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: DarrayConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = DarrayConfig::default();
        assert_eq!(cfg.master_port, 5000);
        assert_eq!(cfg.replication_factor, 2);
        assert_eq!(cfg.heartbeat_interval_secs, 3);
        assert_eq!(cfg.liveness_timeout_secs, 10);
        assert_eq!(cfg.health_check_interval_secs, 5);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = DarrayConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: DarrayConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.master_port, cfg.master_port);
        assert_eq!(parsed.replication_factor, cfg.replication_factor);
        assert_eq!(parsed.heartbeat_interval_secs, cfg.heartbeat_interval_secs);
    }

    #[test]
    fn master_config_honors_port_override_and_floor() {
        let mut cfg = DarrayConfig::default();
        cfg.replication_factor = 0;
        let mc = cfg.master_config(Some(6001));
        assert_eq!(mc.port, 6001);
        // A factor below one would mean segments with no copy at all.
        assert_eq!(mc.replication_factor, 1);
        assert_eq!(mc.liveness_timeout, Duration::from_secs(10));
    }
}
