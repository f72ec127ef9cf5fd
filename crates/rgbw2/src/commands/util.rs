//! Shared helpers for command handlers.

use std::path::{Path, PathBuf};

use rgbw2_config::Config;
use rgbw2_core::ChannelSnapshot;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Load the config, failing when it lists no devices.
pub fn load_devices_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let cfg = rgbw2_config::load_config(global.config.as_deref())?;
    if cfg.devices.is_empty() {
        let path = global
            .config
            .clone()
            .unwrap_or_else(rgbw2_config::config_path);
        return Err(CliError::NoDevices {
            path: path.display().to_string(),
        });
    }
    Ok(cfg)
}

/// Look a device up by id or host.
pub fn find_device<'a>(
    cfg: &'a Config,
    identifier: &str,
) -> Result<&'a rgbw2_config::Device, CliError> {
    cfg.device(identifier)
        .or_else(|| cfg.devices.iter().find(|d| d.host.trim() == identifier))
        .ok_or_else(|| CliError::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "config show".into(),
        })
}

/// State file used by `run` when `--state` is not given.
pub fn default_state_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(rgbw2_config::config_path)
        .with_file_name("state.json")
}

/// Read persisted channel snapshots. A missing file means no snapshots.
pub fn load_state(path: &Path) -> Result<Vec<ChannelSnapshot>, CliError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)?;
    let snapshots = serde_json::from_str(&contents)?;
    Ok(snapshots)
}

/// Persist channel snapshots as pretty JSON.
pub fn save_state(path: &Path, snapshots: &[ChannelSnapshot]) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(snapshots)?)?;
    Ok(())
}
