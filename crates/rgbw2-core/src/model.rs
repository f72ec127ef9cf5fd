// ── Domain model ──
//
// Channel identity, cached channel state, and the notifications handed
// to the host.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::reconcile::{Changes, Characteristic};

/// Stable identity of one channel: device key plus channel index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub device: String,
    pub channel: u8,
}

impl ChannelKey {
    pub fn new(device: impl Into<String>, channel: u8) -> Self {
        Self {
            device: device.into(),
            channel,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:ch{}", self.device, self.channel)
    }
}

/// Cached state of one channel.
///
/// `last_non_zero_brightness` is the level restored when the channel is
/// turned on from off. It only moves when the device reports the channel
/// lit at a non-zero level and never drops to 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelState {
    pub is_on: bool,
    pub brightness: u8,
    pub last_non_zero_brightness: u8,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            is_on: false,
            brightness: 0,
            last_non_zero_brightness: 100,
        }
    }
}

impl ChannelState {
    /// Brightness to request when the host asks to turn the channel on.
    pub fn restore_brightness(&self) -> u8 {
        if self.brightness > 0 {
            self.brightness
        } else if self.last_non_zero_brightness > 0 {
            self.last_non_zero_brightness
        } else {
            100
        }
    }
}

/// A channel state paired with its key, as persisted by hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub key: ChannelKey,
    pub state: ChannelState,
}

/// Notification for the host: one characteristic of one channel changed
/// (or was confirmed by a write).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub key: ChannelKey,
    pub value: Characteristic,
}

/// Result of a poll-driven refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A write completed moments ago; the device was not queried.
    Skipped,
    /// The device was queried and its report applied.
    Applied(Changes),
}
