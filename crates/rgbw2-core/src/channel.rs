// ── Channel controller ──
//
// One controller per (device, channel). Host requests and poll refreshes
// are funnelled through a single worker task per channel, so at most one
// device call is in flight for a channel at any time and jobs complete in
// the order they were enqueued. Brightness requests are debounced before
// they reach the queue.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rgbw2_api::{WhiteChannelApi, WhiteStatus, clamp_brightness};

use crate::config::{ControllerTuning, Transitions};
use crate::error::CoreError;
use crate::model::{ChannelKey, ChannelState, RefreshOutcome, StateChange};
use crate::reconcile::{Changes, reconcile};
use crate::timer::DebounceTimer;

type Reply<T> = oneshot::Sender<Result<T, CoreError>>;

/// Identity and per-channel settings of a controller.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub key: ChannelKey,
    pub name: String,
    pub transitions: Transitions,
}

// ── Jobs ─────────────────────────────────────────────────────────────

/// Device write selected for a host request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Off,
    OnWithBrightness(u8),
    Brightness(u8),
}

impl WriteOp {
    /// Write for a committed brightness target.
    fn for_brightness(level: u8, was_on: bool) -> Self {
        match level {
            0 => Self::Off,
            level if was_on => Self::Brightness(level),
            level => Self::OnWithBrightness(level),
        }
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("turn=off"),
            Self::OnWithBrightness(level) => write!(f, "turn=on brightness={level}"),
            Self::Brightness(level) => write!(f, "brightness={level}"),
        }
    }
}

/// A pending command on the channel queue.
enum Job {
    Write {
        op: WriteOp,
        waiters: Vec<Reply<ChannelState>>,
    },
    Refresh {
        reply: Reply<RefreshOutcome>,
    },
}

#[derive(Default)]
struct Debounce {
    target: Option<u8>,
    waiters: Vec<Reply<ChannelState>>,
    timer: DebounceTimer,
}

// ── Controller ───────────────────────────────────────────────────────

/// Handle to one channel's cached state and command queue.
///
/// Cheaply cloneable. The worker task runs until the cancellation token
/// passed to [`spawn`](Self::spawn) fires.
#[derive(Clone)]
pub struct ChannelController {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    key: ChannelKey,
    name: String,
    client: Arc<dyn WhiteChannelApi>,
    transitions: Transitions,
    tuning: ControllerTuning,
    state: watch::Sender<ChannelState>,
    changes: broadcast::Sender<StateChange>,
    jobs: mpsc::UnboundedSender<Job>,
    debounce: Mutex<Debounce>,
    last_write: Mutex<Option<Instant>>,
    cancel: CancellationToken,
}

impl ChannelController {
    /// Create a controller seeded with `initial` and spawn its worker.
    ///
    /// Host notifications are published on `changes`.
    pub fn spawn(
        spec: ChannelSpec,
        client: Arc<dyn WhiteChannelApi>,
        tuning: ControllerTuning,
        initial: ChannelState,
        changes: broadcast::Sender<StateChange>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (jobs, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(initial);

        let inner = Arc::new(ChannelInner {
            key: spec.key,
            name: spec.name,
            client,
            transitions: spec.transitions,
            tuning,
            state,
            changes,
            jobs,
            debounce: Mutex::new(Debounce::default()),
            last_write: Mutex::new(None),
            cancel,
        });

        let handle = tokio::spawn(worker_task(Arc::clone(&inner), rx));
        (Self { inner }, handle)
    }

    pub fn key(&self) -> &ChannelKey {
        &self.inner.key
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current cached state.
    pub fn snapshot(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Subscribe to cached state updates.
    pub fn subscribe(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    // ── Host requests ────────────────────────────────────────────────

    /// Turn the channel on or off.
    ///
    /// Not debounced. A pending brightness request is cancelled and its
    /// callers receive the outcome of this write instead. Turning on
    /// restores the current brightness, or the last non-zero level, or 100.
    pub async fn set_on(&self, on: bool) -> Result<ChannelState, CoreError> {
        self.ensure_running()?;

        let (tx, rx) = oneshot::channel();
        let mut waiters = {
            let mut debounce = self.inner.lock_debounce();
            if debounce.target.take().is_some() {
                debug!(channel = %self.inner.key, "pending brightness superseded by on/off");
            }
            debounce.timer.cancel();
            std::mem::take(&mut debounce.waiters)
        };
        waiters.push(tx);

        let op = if on {
            WriteOp::OnWithBrightness(self.snapshot().restore_brightness())
        } else {
            WriteOp::Off
        };
        self.inner.enqueue(Job::Write { op, waiters });

        rx.await.map_err(|_| CoreError::ControllerStopped)?
    }

    /// Request a brightness level (0-100, rounded and clamped).
    ///
    /// Debounced: requests arriving within the debounce window replace
    /// the target and restart the timer. Every caller of a burst receives
    /// the outcome of the single write that follows it.
    pub async fn set_brightness(&self, brightness: f64) -> Result<ChannelState, CoreError> {
        self.ensure_running()?;

        let level = clamp_brightness(brightness);
        let (tx, rx) = oneshot::channel();
        {
            let mut debounce = self.inner.lock_debounce();
            debounce.target = Some(level);
            debounce.waiters.push(tx);
            let weak = Arc::downgrade(&self.inner);
            debounce
                .timer
                .schedule(self.inner.tuning.debounce, move |generation| {
                    debounce_elapsed(weak, generation)
                });
        }
        debug!(channel = %self.inner.key, brightness = level, "brightness debounced");

        rx.await.map_err(|_| CoreError::ControllerStopped)?
    }

    /// Re-read the channel from the device.
    ///
    /// Skipped while a successful write is inside the refresh cooldown.
    /// Changes are reported without forcing.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CoreError> {
        self.ensure_running()?;

        if self.inner.in_cooldown() {
            debug!(channel = %self.inner.key, "refresh skipped, recent write");
            return Ok(RefreshOutcome::Skipped);
        }

        let (tx, rx) = oneshot::channel();
        self.inner.enqueue(Job::Refresh { reply: tx });
        rx.await.map_err(|_| CoreError::ControllerStopped)?
    }

    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::ControllerStopped);
        }
        Ok(())
    }
}

impl fmt::Debug for ChannelController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelController")
            .field("key", &self.inner.key)
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

// ── Worker ───────────────────────────────────────────────────────────

impl ChannelInner {
    fn lock_debounce(&self) -> MutexGuard<'_, Debounce> {
        self.debounce.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_cooldown(&self) -> bool {
        let last_write = *self.last_write.lock().unwrap_or_else(PoisonError::into_inner);
        last_write.is_some_and(|at| at.elapsed() < self.tuning.refresh_cooldown)
    }

    fn enqueue(&self, job: Job) {
        if let Err(mpsc::error::SendError(job)) = self.jobs.send(job) {
            match job {
                Job::Write { waiters, .. } => {
                    for waiter in waiters {
                        let _ = waiter.send(Err(CoreError::ControllerStopped));
                    }
                }
                Job::Refresh { reply } => {
                    let _ = reply.send(Err(CoreError::ControllerStopped));
                }
            }
        }
    }

    async fn execute(&self, job: Job) {
        match job {
            Job::Write { op, waiters } => {
                let result = self.write(op).await;
                for waiter in waiters {
                    let _ = waiter.send(result.clone());
                }
            }
            Job::Refresh { reply } => {
                let _ = reply.send(self.poll_device().await);
            }
        }
    }

    async fn write(&self, op: WriteOp) -> Result<ChannelState, CoreError> {
        let channel = self.key.channel;
        let result = match op {
            WriteOp::Off => {
                self.client
                    .set_on(channel, false, self.transitions.off_ms())
                    .await
            }
            WriteOp::OnWithBrightness(level) => {
                self.client
                    .set_on_with_brightness(channel, f64::from(level), self.transitions.on_ms())
                    .await
            }
            WriteOp::Brightness(level) => {
                self.client
                    .set_brightness(channel, f64::from(level), self.transitions.on_ms())
                    .await
            }
        };

        match result {
            Ok(status) => {
                *self.last_write.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(Instant::now());
                self.apply(status, true);
                info!(
                    channel = %self.key,
                    %op,
                    is_on = status.is_on,
                    brightness = status.brightness,
                    "write applied"
                );
                Ok(*self.state.borrow())
            }
            Err(e) => {
                let err = CoreError::from(e);
                warn!(channel = %self.key, %op, error = %err, "write failed");
                Err(err)
            }
        }
    }

    async fn poll_device(&self) -> Result<RefreshOutcome, CoreError> {
        // A write may have landed while this refresh was queued.
        if self.in_cooldown() {
            debug!(channel = %self.key, "queued refresh skipped, recent write");
            return Ok(RefreshOutcome::Skipped);
        }

        match self.client.get_status(self.key.channel).await {
            Ok(status) => Ok(RefreshOutcome::Applied(self.apply(status, false))),
            Err(e) => {
                let err = CoreError::from(e);
                debug!(channel = %self.key, error = %err, "refresh failed");
                Err(err)
            }
        }
    }

    /// Reconcile a device report into the cache and notify the host.
    fn apply(&self, status: WhiteStatus, force: bool) -> Changes {
        let mut changes = Changes::default();
        self.state.send_if_modified(|state| {
            let before = *state;
            changes = reconcile(state, status, force);
            *state != before
        });

        for value in changes.characteristics() {
            let _ = self.changes.send(StateChange {
                key: self.key.clone(),
                value,
            });
        }
        changes
    }
}

async fn debounce_elapsed(inner: Weak<ChannelInner>, generation: u64) {
    let Some(inner) = inner.upgrade() else { return };

    let (target, waiters) = {
        let mut debounce = inner.lock_debounce();
        if !debounce.timer.fire(generation) {
            return;
        }
        (debounce.target.take(), std::mem::take(&mut debounce.waiters))
    };
    let Some(level) = target else { return };

    let was_on = inner.state.borrow().is_on;
    let op = WriteOp::for_brightness(level, was_on);
    inner.enqueue(Job::Write { op, waiters });
}

/// Execute queued jobs one at a time, in order.
///
/// A job that has started always runs to completion; cancellation is only
/// observed between jobs.
async fn worker_task(inner: Arc<ChannelInner>, mut rx: mpsc::UnboundedReceiver<Job>) {
    loop {
        let job = tokio::select! {
            biased;
            () = inner.cancel.cancelled() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                job
            }
        };
        inner.execute(job).await;
    }

    let waiters = {
        let mut debounce = inner.lock_debounce();
        debounce.timer.cancel();
        debounce.target = None;
        std::mem::take(&mut debounce.waiters)
    };
    for waiter in waiters {
        let _ = waiter.send(Err(CoreError::ControllerStopped));
    }
    debug!(channel = %inner.key, "channel worker stopped");
}
