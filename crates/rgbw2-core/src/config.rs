// ── Runtime engine configuration ──
//
// These types describe *which* devices and channels to drive and how to
// talk to them. They never touch disk: `rgbw2-config` (or any other host)
// builds an `EngineConfig` and hands it in.

use std::collections::HashSet;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use rgbw2_api::{BasicAuth, MAX_CHANNEL, TransportConfig};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_millis(500);

/// One configured channel entry, as written by the user.
///
/// The index is kept signed and unchecked here; [`DeviceConfig::valid_channels`]
/// filters out anything outside `0..=3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: i64,
    pub name: Option<String>,
}

impl ChannelConfig {
    pub fn new(channel: i64) -> Self {
        Self {
            channel,
            name: None,
        }
    }

    pub fn named(channel: i64, name: impl Into<String>) -> Self {
        Self {
            channel,
            name: Some(name.into()),
        }
    }
}

/// Device-side fade durations for the two kinds of writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transitions {
    /// Used when turning on or changing brightness.
    pub on: Option<Duration>,
    /// Used when turning off.
    pub off: Option<Duration>,
}

impl Transitions {
    pub fn on_ms(&self) -> Option<f64> {
        self.on.map(duration_ms)
    }

    pub fn off_ms(&self) -> Option<f64> {
        self.off.map(duration_ms)
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Configuration for a single RGBW2 device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Stable identifier; falls back to `host` when absent.
    pub id: Option<String>,
    /// Address or URL of the device (`192.168.1.40`, `http://shelly-kitchen`).
    pub host: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Per-attempt request timeout (default 2500 ms).
    pub request_timeout: Option<Duration>,
    /// Extra attempts after a transport failure (default 1).
    pub retries: Option<u32>,
    pub transitions: Transitions,
    /// Base poll interval, clamped to 2..=60 s (default 5 s).
    pub poll_interval: Option<Duration>,
    /// Channels to expose. Empty means channel 0 only.
    pub channels: Vec<ChannelConfig>,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            id: None,
            host: host.into(),
            username: None,
            password: None,
            request_timeout: None,
            retries: None,
            transitions: Transitions::default(),
            poll_interval: None,
            channels: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_channels(mut self, channels: Vec<ChannelConfig>) -> Self {
        self.channels = channels;
        self
    }

    /// Registry key for this device: the id if set, otherwise the host.
    pub fn key(&self) -> &str {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => &self.host,
        }
    }

    /// Transport settings derived from the device entry.
    pub fn transport(&self) -> TransportConfig {
        let mut transport = TransportConfig::default().with_auth(BasicAuth::from_parts(
            self.username.clone(),
            self.password.clone(),
        ));
        if let Some(timeout) = self.request_timeout {
            transport = transport.with_timeout(timeout);
        }
        if let Some(retries) = self.retries {
            transport = transport.with_retries(retries);
        }
        transport
    }

    /// Channel indices in `0..=3` paired with their display names.
    ///
    /// Out-of-range and duplicate entries are logged and dropped. An empty
    /// channel list yields channel 0.
    pub fn valid_channels(&self) -> Vec<(u8, String)> {
        if self.channels.is_empty() {
            return vec![(0, self.default_channel_name(0))];
        }

        let mut seen = HashSet::new();
        let mut valid = Vec::with_capacity(self.channels.len());
        for entry in &self.channels {
            let index = match u8::try_from(entry.channel) {
                Ok(index) if index <= MAX_CHANNEL => index,
                _ => {
                    warn!(
                        device = self.key(),
                        channel = entry.channel,
                        "invalid channel, valid range is 0-3"
                    );
                    continue;
                }
            };
            if !seen.insert(index) {
                warn!(device = self.key(), channel = index, "duplicate channel entry ignored");
                continue;
            }
            let name = entry
                .name
                .clone()
                .unwrap_or_else(|| self.default_channel_name(index));
            valid.push((index, name));
        }
        valid
    }

    fn default_channel_name(&self, index: u8) -> String {
        format!("{} CH{index}", self.key())
    }
}

/// Timing knobs for channel controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerTuning {
    /// Quiet period before a brightness burst is committed.
    pub debounce: Duration,
    /// Window after a successful write during which polls are skipped.
    pub refresh_cooldown: Duration,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            refresh_cooldown: DEFAULT_REFRESH_COOLDOWN,
        }
    }
}

/// Everything the [`Engine`](crate::Engine) needs to start.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub devices: Vec<DeviceConfig>,
    pub tuning: ControllerTuning,
    /// Spawn a poller per device. Disabled for one-shot use.
    pub polling_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            tuning: ControllerTuning::default(),
            polling_enabled: true,
        }
    }
}

impl EngineConfig {
    pub fn new(devices: Vec<DeviceConfig>) -> Self {
        Self {
            devices,
            ..Self::default()
        }
    }
}
