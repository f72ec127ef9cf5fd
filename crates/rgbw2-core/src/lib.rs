//! Synchronization engine between Shelly RGBW2 white channels and a
//! home-automation host.
//!
//! - **[`ChannelController`]**: one per (device, channel). Owns the cached
//!   [`ChannelState`], a FIFO worker task that runs every write and refresh
//!   strictly one at a time, and the brightness debounce timer. Writes are
//!   always reported to the host; refreshes only report what changed.
//!
//! - **[`DevicePoller`]**: one background task per device. Refreshes the
//!   device's channels sequentially and backs off while the device is
//!   failing.
//!
//! - **[`Engine`]**: two-phase facade for hosts: [`configure()`](Engine::configure)
//!   restores cached channel snapshots, [`start()`](Engine::start) builds the
//!   controllers and pollers from configuration. Owns the channel registry
//!   and the [`StateChange`] broadcast.
//!
//! - **[`reconcile()`]**: pure diff of a device report against cached state.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod poll;
pub mod reconcile;
pub mod timer;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use channel::{ChannelController, ChannelSpec};
pub use config::{ChannelConfig, ControllerTuning, DeviceConfig, EngineConfig, Transitions};
pub use engine::{Engine, StartReport, client_for};
pub use error::CoreError;
pub use model::{ChannelKey, ChannelSnapshot, ChannelState, RefreshOutcome, StateChange};
pub use poll::{DeviceHealth, DevicePoller, PollCycleState};
pub use reconcile::{Changes, Characteristic, reconcile};

pub use rgbw2_api::{WhiteChannelApi, WhiteStatus};
