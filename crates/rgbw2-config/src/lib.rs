//! Configuration for the rgbw2 engine and CLI.
//!
//! TOML file + `RGBW2_` environment overrides, device password resolution
//! (env + keyring + plaintext), and translation to
//! `rgbw2_core::EngineConfig`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rgbw2_core::{ChannelConfig, ControllerTuning, DeviceConfig, EngineConfig, Transitions};

/// Keyring service under which device passwords are stored.
pub const KEYRING_SERVICE: &str = "rgbw2";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Values applied to every device that does not override them.
    #[serde(default)]
    pub defaults: Defaults,

    /// Channel controller timing.
    #[serde(default)]
    pub tuning: Tuning,

    #[serde(default)]
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
            retries: default_retries(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    5
}
fn default_request_timeout_ms() -> u64 {
    2500
}
fn default_retries() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Tuning {
    /// Quiet period before a brightness burst is written.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Window after a write during which polls skip the channel.
    #[serde(default = "default_refresh_cooldown_ms")]
    pub refresh_cooldown_ms: u64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            refresh_cooldown_ms: default_refresh_cooldown_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    200
}
fn default_refresh_cooldown_ms() -> u64 {
    500
}

/// One RGBW2 device.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Device {
    /// Stable identifier. The host is used when absent.
    pub id: Option<String>,

    /// IP address, hostname or URL.
    #[serde(default)]
    pub host: String,

    pub username: Option<String>,

    /// Password (plaintext, prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    pub request_timeout_ms: Option<u64>,

    pub retries: Option<u32>,

    pub poll_interval_secs: Option<u64>,

    /// Fade duration when turning on or changing brightness.
    pub transition_on_ms: Option<u64>,

    /// Fade duration when turning off.
    pub transition_off_ms: Option<u64>,

    /// Channels to expose; channel 0 when empty.
    #[serde(default)]
    pub channels: Vec<Channel>,
}

impl Device {
    /// Key used in logs, state snapshots and the keyring.
    pub fn key(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.host,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Channel {
    /// Channel index, 0-3. Out-of-range entries are skipped at start.
    pub channel: i64,
    pub name: Option<String>,
}

impl Config {
    /// Copy with every plaintext password masked, for display.
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        for device in &mut cfg.devices {
            if device.password.is_some() {
                device.password = Some(REDACTED.into());
            }
        }
        cfg
    }

    pub fn device(&self, key: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.key() == key)
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "rgbw2", "rgbw2").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("rgbw2");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from `path` (or the default location) plus environment.
///
/// A missing file at the default location yields the defaults; an
/// explicitly given path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) if !path.exists() => Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        }),
        Some(path) => load_config_from(path),
        None => load_config_from(&config_path()),
    }
}

/// Load the config from a specific file + environment.
///
/// Environment keys use `__` between levels, e.g.
/// `RGBW2_TUNING__DEBOUNCE_MS=300`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("RGBW2_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a device password: `password_env` → keyring → plaintext.
pub fn resolve_password(device: &Device) -> Option<SecretString> {
    resolve_password_with(device, |name| std::env::var(name).ok(), keyring_password)
}

fn resolve_password_with(
    device: &Device,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(&str) -> Option<String>,
) -> Option<SecretString> {
    // 1. Device's password_env → env var lookup
    if let Some(value) = device.password_env.as_deref().and_then(&env) {
        return Some(SecretString::from(value));
    }

    // 2. System keyring
    if let Some(value) = keyring(device.key()) {
        return Some(SecretString::from(value));
    }

    // 3. Plaintext in config
    device.password.clone().map(SecretString::from)
}

fn keyring_password(device_key: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{device_key}/password"))
        .ok()?
        .get_password()
        .ok()
}

// ── Translation ─────────────────────────────────────────────────────

/// Build the engine configuration, applying `[defaults]` to devices.
///
/// Passwords are only resolved for devices with a username.
pub fn to_engine_config(cfg: &Config) -> EngineConfig {
    to_engine_config_with(cfg, resolve_password)
}

fn to_engine_config_with(
    cfg: &Config,
    password: impl Fn(&Device) -> Option<SecretString>,
) -> EngineConfig {
    let devices = cfg
        .devices
        .iter()
        .map(|device| {
            let credentials = device.username.is_some().then(|| password(device)).flatten();
            DeviceConfig {
                id: device.id.clone(),
                host: device.host.trim().to_owned(),
                username: device.username.clone(),
                password: credentials,
                request_timeout: Some(Duration::from_millis(
                    device
                        .request_timeout_ms
                        .unwrap_or(cfg.defaults.request_timeout_ms),
                )),
                retries: Some(device.retries.unwrap_or(cfg.defaults.retries)),
                transitions: Transitions {
                    on: device.transition_on_ms.map(Duration::from_millis),
                    off: device.transition_off_ms.map(Duration::from_millis),
                },
                poll_interval: Some(Duration::from_secs(
                    device
                        .poll_interval_secs
                        .unwrap_or(cfg.defaults.poll_interval_secs),
                )),
                channels: device
                    .channels
                    .iter()
                    .map(|ch| ChannelConfig {
                        channel: ch.channel,
                        name: ch.name.clone(),
                    })
                    .collect(),
            }
        })
        .collect();

    EngineConfig {
        devices,
        tuning: ControllerTuning {
            debounce: Duration::from_millis(cfg.tuning.debounce_ms),
            refresh_cooldown: Duration::from_millis(cfg.tuning.refresh_cooldown_ms),
        },
        polling_enabled: true,
    }
}
