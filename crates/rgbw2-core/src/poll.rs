// ── Device poll scheduler ──
//
// One background task per device. Each cycle refreshes the device's
// channels one after another; the failure counter is shared by all of a
// device's channels and carried across cycles, so a device that keeps
// failing is polled less often until it answers again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::ChannelController;

pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Upper bound on the delay between two cycles, backoff included.
pub const MAX_POLL_DELAY: Duration = Duration::from_secs(30);

const MAX_BACKOFF_FACTOR: u32 = 4;

// ── Backoff ──────────────────────────────────────────────────────────

/// Configured interval clamped to 2..=60 s, 5 s when unset.
pub fn base_interval(configured: Option<Duration>) -> Duration {
    configured.map_or(DEFAULT_POLL_INTERVAL, |interval| {
        interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
    })
}

/// Delay before the next cycle after `failures` consecutive failures.
pub fn next_delay(base: Duration, failures: u32) -> Duration {
    let factor = failures.saturating_add(1).min(MAX_BACKOFF_FACTOR);
    base.saturating_mul(factor).min(MAX_POLL_DELAY)
}

/// Failures are logged on the first one and then every third.
pub fn should_log_failure(failures: u32) -> bool {
    failures == 1 || (failures > 0 && failures % 3 == 0)
}

// ── State ────────────────────────────────────────────────────────────

/// Backoff state of one device, carried from cycle to cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollCycleState {
    pub consecutive_failures: u32,
    pub next_delay: Duration,
}

impl PollCycleState {
    pub fn new(base: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            next_delay: base,
        }
    }
}

/// Read-only view of a device's polling health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceHealth {
    pub consecutive_failures: u32,
    pub next_delay: Duration,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

// ── Poller ───────────────────────────────────────────────────────────

pub struct DevicePoller {
    device: String,
    base: Duration,
    channels: Vec<ChannelController>,
    health: watch::Sender<DeviceHealth>,
}

impl DevicePoller {
    pub fn new(
        device: impl Into<String>,
        interval: Option<Duration>,
        channels: Vec<ChannelController>,
    ) -> Self {
        let base = base_interval(interval);
        let (health, _) = watch::channel(DeviceHealth {
            next_delay: base,
            ..DeviceHealth::default()
        });
        Self {
            device: device.into(),
            base,
            channels,
            health,
        }
    }

    pub fn base_interval(&self) -> Duration {
        self.base
    }

    pub fn health(&self) -> watch::Receiver<DeviceHealth> {
        self.health.subscribe()
    }

    /// Refresh every channel once and return the delay before the next
    /// cycle.
    pub async fn run_cycle(&self, cycle: &mut PollCycleState) -> Duration {
        let mut failures = cycle.consecutive_failures;
        let mut last_success = None;
        let mut last_error = None;

        for controller in &self.channels {
            match controller.refresh().await {
                Ok(_) => {
                    failures = 0;
                    last_success = Some(Utc::now());
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    if should_log_failure(failures) {
                        warn!(
                            device = %self.device,
                            channel = controller.key().channel,
                            failures,
                            error = %e,
                            "polling failed"
                        );
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        cycle.consecutive_failures = failures;
        cycle.next_delay = next_delay(self.base, failures);

        self.health.send_modify(|health| {
            health.consecutive_failures = cycle.consecutive_failures;
            health.next_delay = cycle.next_delay;
            if last_success.is_some() {
                health.last_success = last_success;
            }
            if failures == 0 {
                health.last_error = None;
            } else if last_error.is_some() {
                health.last_error = last_error;
            }
        });

        cycle.next_delay
    }

    /// Spawn the poll loop: one cycle immediately, then one after every
    /// computed delay, until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(poll_task(self, cancel))
    }
}

async fn poll_task(poller: DevicePoller, cancel: CancellationToken) {
    let mut cycle = PollCycleState::new(poller.base_interval());
    debug!(
        device = %poller.device,
        interval_ms = poller.base_interval().as_millis(),
        channels = poller.channels.len(),
        "poller started"
    );

    loop {
        let delay = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            delay = poller.run_cycle(&mut cycle) => delay,
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!(device = %poller.device, "poller stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::{ChannelKey, ChannelState};
    use crate::testing::{FakeDevice, controller};

    const BASE: Duration = Duration::from_secs(2);

    #[test]
    fn interval_is_clamped() {
        assert_eq!(base_interval(None), Duration::from_secs(5));
        assert_eq!(base_interval(Some(Duration::from_secs(1))), BASE);
        assert_eq!(
            base_interval(Some(Duration::from_secs(120))),
            Duration::from_secs(60)
        );
        assert_eq!(
            base_interval(Some(Duration::from_secs(10))),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn backoff_grows_to_four_times_base() {
        let delays: Vec<u128> = (0..6)
            .map(|failures| next_delay(BASE, failures).as_millis())
            .collect();
        assert_eq!(delays, vec![2000, 4000, 6000, 8000, 8000, 8000]);
    }

    #[test]
    fn backoff_is_capped() {
        let base = Duration::from_secs(20);
        assert_eq!(next_delay(base, 0), Duration::from_secs(20));
        assert_eq!(next_delay(base, 1), MAX_POLL_DELAY);
        assert_eq!(next_delay(base, 9), MAX_POLL_DELAY);
    }

    #[test]
    fn failure_logging_is_throttled() {
        let logged: Vec<u32> = (0..10).filter(|&f| should_log_failure(f)).collect();
        assert_eq!(logged, vec![1, 3, 6, 9]);
    }

    fn poller(device: &Arc<FakeDevice>, channels: &[u8], cancel: &CancellationToken) -> DevicePoller {
        let controllers = channels
            .iter()
            .map(|&ch| {
                device.set_status(ch, true, 50);
                controller(device, ChannelKey::new("porch", ch), ChannelState::default(), cancel)
            })
            .collect();
        DevicePoller::new("porch", Some(BASE), controllers)
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_delays_follow_failures() {
        let device = FakeDevice::new();
        let cancel = CancellationToken::new();
        let poller = poller(&device, &[0], &cancel);
        let mut cycle = PollCycleState::new(poller.base_interval());

        let mut delays = vec![poller.run_cycle(&mut cycle).await];
        device.fail_next(1);
        delays.push(poller.run_cycle(&mut cycle).await);
        device.fail_next(1);
        delays.push(poller.run_cycle(&mut cycle).await);
        delays.push(poller.run_cycle(&mut cycle).await);

        let millis: Vec<u128> = delays.iter().map(Duration::as_millis).collect();
        assert_eq!(millis, vec![2000, 4000, 6000, 2000]);
        assert_eq!(cycle.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn later_success_in_cycle_resets_counter() {
        let device = FakeDevice::new();
        let cancel = CancellationToken::new();
        let poller = poller(&device, &[0, 1], &cancel);
        let mut cycle = PollCycleState::new(poller.base_interval());

        device.fail_next(1);
        let delay = poller.run_cycle(&mut cycle).await;

        assert_eq!(delay, BASE);
        assert_eq!(cycle.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_accumulate_across_channels() {
        let device = FakeDevice::new();
        let cancel = CancellationToken::new();
        let poller = poller(&device, &[0, 1], &cancel);
        let mut cycle = PollCycleState::new(poller.base_interval());

        device.fail_next(2);
        let delay = poller.run_cycle(&mut cycle).await;

        assert_eq!(cycle.consecutive_failures, 2);
        assert_eq!(delay, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn health_tracks_cycles() {
        let device = FakeDevice::new();
        let cancel = CancellationToken::new();
        let poller = poller(&device, &[0], &cancel);
        let health = poller.health();
        let mut cycle = PollCycleState::new(poller.base_interval());

        device.fail_next(1);
        poller.run_cycle(&mut cycle).await;
        {
            let health = health.borrow();
            assert_eq!(health.consecutive_failures, 1);
            assert_eq!(health.next_delay, Duration::from_secs(4));
            assert!(health.last_success.is_none());
            assert!(health.last_error.is_some());
        }

        poller.run_cycle(&mut cycle).await;
        let health = health.borrow();
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_success.is_some());
        assert!(health.last_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn task_polls_immediately_then_on_interval() {
        let device = FakeDevice::new();
        let cancel = CancellationToken::new();
        let handle = poller(&device, &[0], &cancel).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(device.status_reads(), 1);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(device.status_reads(), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(device.status_reads(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn devices_poll_independently() {
        let slow = FakeDevice::new();
        let fast = FakeDevice::new();
        let cancel = CancellationToken::new();
        slow.set_latency(Duration::from_secs(10));

        let slow_handle = poller(&slow, &[0], &cancel).spawn(cancel.clone());
        let fast_handle = poller(&fast, &[0], &cancel).spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(slow.status_reads(), 1);
        assert_eq!(fast.status_reads(), 3);

        cancel.cancel();
        slow_handle.await.unwrap();
        fast_handle.await.unwrap();
    }
}
