// ── Status reconciliation ──
//
// Diffs a device report against the cached channel state. The cache always
// takes the reported values; the returned `Changes` say what the host
// should be told about.

use std::fmt;

use serde::Serialize;

use rgbw2_api::WhiteStatus;

use crate::model::ChannelState;

/// A host-visible characteristic of a light channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "characteristic", content = "value")]
pub enum Characteristic {
    On(bool),
    Brightness(u8),
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On(on) => write!(f, "on={on}"),
            Self::Brightness(level) => write!(f, "brightness={level}"),
        }
    }
}

/// Characteristics to notify after applying a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub on: Option<bool>,
    pub brightness: Option<u8>,
}

impl Changes {
    pub fn is_empty(self) -> bool {
        self.on.is_none() && self.brightness.is_none()
    }

    /// Notifications in host order: `On` before `Brightness`.
    pub fn characteristics(self) -> impl Iterator<Item = Characteristic> {
        self.on
            .map(Characteristic::On)
            .into_iter()
            .chain(self.brightness.map(Characteristic::Brightness))
    }
}

/// Apply `status` to `state` and report what changed.
///
/// The device keeps its dim level while off; the cache stores 0 instead so
/// `is_on == (brightness > 0)` always holds. The restore level only moves
/// on a lit report.
///
/// With `force` set every field is reported, even if unchanged: writes are
/// confirmed to the host regardless of the prior cached value.
pub fn reconcile(state: &mut ChannelState, status: WhiteStatus, force: bool) -> Changes {
    let brightness = if status.is_on { status.brightness } else { 0 };
    let is_on = brightness > 0;

    let on_changed = force || state.is_on != is_on;
    let brightness_changed = force || state.brightness != brightness;

    state.is_on = is_on;
    state.brightness = brightness;
    if is_on {
        state.last_non_zero_brightness = brightness;
    }

    Changes {
        on: on_changed.then_some(is_on),
        brightness: brightness_changed.then_some(brightness),
    }
}
