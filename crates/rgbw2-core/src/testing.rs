// In-memory RGBW2 device for controller, poller and engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use rgbw2_api::{Error, WhiteChannelApi, WhiteStatus, clamp_brightness};

use crate::channel::{ChannelController, ChannelSpec};
use crate::config::{ControllerTuning, Transitions};
use crate::model::{ChannelKey, ChannelState};

/// A device call as received by the fake.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    GetStatus(u8),
    SetOn {
        channel: u8,
        on: bool,
        transition_ms: Option<f64>,
    },
    SetOnWithBrightness {
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    },
    SetBrightness {
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    },
}

impl Call {
    fn is_write(&self) -> bool {
        !matches!(self, Self::GetStatus(_))
    }
}

#[derive(Default)]
struct FakeState {
    channels: HashMap<u8, WhiteStatus>,
    calls: Vec<Call>,
    failures: u32,
    latency: Duration,
}

/// Behaves like a device in white mode: turning off keeps the brightness,
/// setting brightness alone does not switch the channel on.
#[derive(Default)]
pub(crate) struct FakeDevice {
    state: Mutex<FakeState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeDevice {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_status(&self, channel: u8, is_on: bool, brightness: u8) {
        self.lock()
            .channels
            .insert(channel, WhiteStatus { is_on, brightness });
    }

    /// Fail the next `n` calls with a timeout.
    pub(crate) fn fail_next(&self, n: u32) {
        self.lock().failures = n;
    }

    pub(crate) fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub(crate) fn writes(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_write())
            .cloned()
            .collect()
    }

    pub(crate) fn status_reads(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| !call.is_write())
            .count()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, call: Call) -> Result<WhiteStatus, Error> {
        let latency = {
            let mut state = self.lock();
            state.calls.push(call.clone());
            state.latency
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.lock();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(Error::Timeout { timeout_ms: 2500 });
        }

        let channel = match call {
            Call::GetStatus(channel)
            | Call::SetOn { channel, .. }
            | Call::SetOnWithBrightness { channel, .. }
            | Call::SetBrightness { channel, .. } => channel,
        };
        let status = state.channels.entry(channel).or_insert(WhiteStatus {
            is_on: false,
            brightness: 0,
        });
        match call {
            Call::GetStatus(_) => {}
            Call::SetOn { on, .. } => status.is_on = on,
            Call::SetOnWithBrightness { brightness, .. } => {
                status.is_on = true;
                status.brightness = clamp_brightness(brightness);
            }
            Call::SetBrightness { brightness, .. } => {
                status.brightness = clamp_brightness(brightness);
            }
        }
        Ok(*status)
    }
}

#[async_trait]
impl WhiteChannelApi for FakeDevice {
    async fn get_status(&self, channel: u8) -> Result<WhiteStatus, Error> {
        self.handle(Call::GetStatus(channel)).await
    }

    async fn set_on(
        &self,
        channel: u8,
        on: bool,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        self.handle(Call::SetOn {
            channel,
            on,
            transition_ms,
        })
        .await
    }

    async fn set_on_with_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        self.handle(Call::SetOnWithBrightness {
            channel,
            brightness,
            transition_ms,
        })
        .await
    }

    async fn set_brightness(
        &self,
        channel: u8,
        brightness: f64,
        transition_ms: Option<f64>,
    ) -> Result<WhiteStatus, Error> {
        self.handle(Call::SetBrightness {
            channel,
            brightness,
            transition_ms,
        })
        .await
    }
}

/// Spawn a controller for `key` on `device` with default tuning and a
/// throwaway notification channel.
pub(crate) fn controller(
    device: &Arc<FakeDevice>,
    key: ChannelKey,
    initial: ChannelState,
    cancel: &CancellationToken,
) -> ChannelController {
    let (changes, _) = broadcast::channel(16);
    let name = key.to_string();
    let (controller, _handle) = ChannelController::spawn(
        ChannelSpec {
            key,
            name,
            transitions: Transitions::default(),
        },
        Arc::clone(device) as Arc<dyn WhiteChannelApi>,
        ControllerTuning::default(),
        initial,
        changes,
        cancel.child_token(),
    );
    controller
}
