// ── Engine ──
//
// Host-facing facade. Two phases: `configure()` loads channel snapshots the
// host persisted, `start()` builds one controller per configured channel
// (restoring a snapshot where one exists) and one poller per device.
// Channels are addressed by `ChannelKey` through the engine's registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rgbw2_api::{WhiteChannelApi, WhiteClient};

use crate::channel::{ChannelController, ChannelSpec};
use crate::config::{DeviceConfig, EngineConfig};
use crate::error::CoreError;
use crate::model::{ChannelKey, ChannelSnapshot, ChannelState, RefreshOutcome, StateChange};
use crate::poll::{DeviceHealth, DevicePoller};

const EVENT_CHANNEL_SIZE: usize = 256;

/// Builds the device client for a configured device.
pub type ClientFactory =
    Arc<dyn Fn(&DeviceConfig) -> Result<Arc<dyn WhiteChannelApi>, CoreError> + Send + Sync>;

/// Default factory: an HTTP [`WhiteClient`] using the device's transport
/// settings.
pub fn client_for(device: &DeviceConfig) -> Result<Arc<dyn WhiteChannelApi>, CoreError> {
    let client: Arc<dyn WhiteChannelApi> =
        Arc::new(WhiteClient::new(&device.host, &device.transport())?);
    Ok(client)
}

/// What [`Engine::start`] did with each channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartReport {
    /// Configured channels seeded from a cached snapshot.
    pub restored: Vec<ChannelKey>,
    /// Configured channels without a snapshot, seeded with defaults.
    pub added: Vec<ChannelKey>,
    /// Cached snapshots with no configured channel; discarded.
    pub removed: Vec<ChannelKey>,
    /// Devices that were not started (no host, duplicate key, no valid
    /// channel, or no client).
    pub skipped_devices: Vec<String>,
}

// ── Engine ───────────────────────────────────────────────────────────

/// Registry of channel controllers and device pollers.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    factory: ClientFactory,
    cached: DashMap<ChannelKey, ChannelState>,
    channels: DashMap<ChannelKey, ChannelController>,
    health: DashMap<String, watch::Receiver<DeviceHealth>>,
    changes: broadcast::Sender<StateChange>,
    cancel: CancellationToken,
    started: AtomicBool,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Create an engine that talks HTTP to the configured devices.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_client_factory(config, Arc::new(client_for))
    }

    /// Create an engine with a custom device client factory.
    pub fn with_client_factory(config: EngineConfig, factory: ClientFactory) -> Self {
        let (changes, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self {
            inner: Arc::new(EngineInner {
                config,
                factory,
                cached: DashMap::new(),
                channels: DashMap::new(),
                health: DashMap::new(),
                changes,
                cancel: CancellationToken::new(),
                started: AtomicBool::new(false),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Load channel snapshots persisted by the host.
    ///
    /// Only meaningful before [`start()`](Self::start). The first snapshot
    /// for a key wins.
    pub fn configure(&self, cached: impl IntoIterator<Item = ChannelSnapshot>) {
        if self.inner.started.load(Ordering::Acquire) {
            warn!("engine already started, cached snapshots ignored");
            return;
        }

        for snapshot in cached {
            match self.inner.cached.entry(snapshot.key) {
                Entry::Occupied(entry) => {
                    debug!(channel = %entry.key(), "duplicate cached snapshot skipped");
                }
                Entry::Vacant(entry) => {
                    entry.insert(snapshot.state);
                }
            }
        }
    }

    /// Build controllers and pollers for every configured device.
    ///
    /// Idempotent: a second call does nothing and returns an empty report.
    pub async fn start(&self) -> StartReport {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            info!("engine already started");
            return StartReport::default();
        }

        let mut report = StartReport::default();
        let mut handles = Vec::new();
        let mut seen = HashSet::new();

        for device in &self.inner.config.devices {
            self.start_device(device, &mut seen, &mut report, &mut handles);
        }

        // Snapshots left over belong to channels no longer configured.
        let mut removed: Vec<ChannelKey> = self
            .inner
            .cached
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        removed.sort();
        for key in &removed {
            info!(channel = %key, "removing stale cached channel");
        }
        self.inner.cached.clear();
        report.removed = removed;

        self.inner.task_handles.lock().await.extend(handles);

        info!(
            restored = report.restored.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            skipped = report.skipped_devices.len(),
            polling = self.inner.config.polling_enabled,
            "engine started"
        );
        report
    }

    fn start_device(
        &self,
        device: &DeviceConfig,
        seen: &mut HashSet<String>,
        report: &mut StartReport,
        handles: &mut Vec<JoinHandle<()>>,
    ) {
        if device.host.trim().is_empty() {
            warn!(id = ?device.id, "device without host skipped");
            report
                .skipped_devices
                .push(device.id.clone().unwrap_or_default());
            return;
        }

        let key = device.key().to_owned();
        if device.id.as_deref().is_none_or(str::is_empty) {
            warn!(host = %device.host, "device has no id, using host as its key");
        }
        if !seen.insert(key.clone()) {
            warn!(device = %key, "duplicate device key, entry skipped");
            report.skipped_devices.push(key);
            return;
        }

        let channels = device.valid_channels();
        if channels.is_empty() {
            warn!(device = %key, "no valid channels configured");
            report.skipped_devices.push(key);
            return;
        }

        let client = match (self.inner.factory)(device) {
            Ok(client) => client,
            Err(e) => {
                warn!(device = %key, error = %e, "cannot create device client");
                report.skipped_devices.push(key);
                return;
            }
        };

        let device_cancel = self.inner.cancel.child_token();
        let mut controllers = Vec::with_capacity(channels.len());
        for (index, name) in channels {
            let channel_key = ChannelKey::new(key.clone(), index);
            let initial = if let Some((_, state)) = self.inner.cached.remove(&channel_key) {
                info!(channel = %channel_key, %name, "restoring channel");
                report.restored.push(channel_key.clone());
                state
            } else {
                info!(channel = %channel_key, %name, "adding channel");
                report.added.push(channel_key.clone());
                ChannelState::default()
            };

            let (controller, handle) = ChannelController::spawn(
                ChannelSpec {
                    key: channel_key.clone(),
                    name,
                    transitions: device.transitions,
                },
                Arc::clone(&client),
                self.inner.config.tuning,
                initial,
                self.inner.changes.clone(),
                device_cancel.clone(),
            );
            handles.push(handle);
            controllers.push(controller.clone());
            self.inner.channels.insert(channel_key, controller);
        }

        let poller = DevicePoller::new(key.clone(), device.poll_interval, controllers);
        self.inner.health.insert(key, poller.health());
        if self.inner.config.polling_enabled {
            handles.push(poller.spawn(device_cancel));
        }
    }

    /// Stop pollers and channel workers and wait for them to exit.
    ///
    /// Writes already executing finish first.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("engine stopped");
    }

    /// One-shot: start without polling, run closure, stop.
    pub async fn oneshot<F, Fut, T>(config: EngineConfig, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Engine) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut cfg = config;
        cfg.polling_enabled = false;

        let engine = Engine::new(cfg);
        engine.start().await;
        let result = f(engine.clone()).await;
        engine.stop().await;
        result
    }

    // ── Channel operations ───────────────────────────────────────────

    pub fn channel(&self, key: &ChannelKey) -> Option<ChannelController> {
        self.inner.channels.get(key).map(|entry| entry.value().clone())
    }

    fn require(&self, key: &ChannelKey) -> Result<ChannelController, CoreError> {
        self.channel(key).ok_or_else(|| CoreError::ChannelNotFound {
            key: key.to_string(),
        })
    }

    pub async fn set_on(&self, key: &ChannelKey, on: bool) -> Result<ChannelState, CoreError> {
        self.require(key)?.set_on(on).await
    }

    pub async fn set_brightness(
        &self,
        key: &ChannelKey,
        brightness: f64,
    ) -> Result<ChannelState, CoreError> {
        self.require(key)?.set_brightness(brightness).await
    }

    pub async fn refresh(&self, key: &ChannelKey) -> Result<RefreshOutcome, CoreError> {
        self.require(key)?.refresh().await
    }

    // ── State observation ────────────────────────────────────────────

    pub fn snapshot(&self, key: &ChannelKey) -> Result<ChannelState, CoreError> {
        self.require(key).map(|controller| controller.snapshot())
    }

    /// Every channel's cached state, ordered by key.
    pub fn snapshots(&self) -> Vec<ChannelSnapshot> {
        let mut snapshots: Vec<ChannelSnapshot> = self
            .inner
            .channels
            .iter()
            .map(|entry| ChannelSnapshot {
                key: entry.key().clone(),
                state: entry.value().snapshot(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.key.cmp(&b.key));
        snapshots
    }

    /// Every channel controller, ordered by key.
    pub fn channels(&self) -> Vec<ChannelController> {
        let mut channels: Vec<ChannelController> = self
            .inner
            .channels
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        channels.sort_by(|a, b| a.key().cmp(b.key()));
        channels
    }

    /// Subscribe to host notifications.
    pub fn events(&self) -> broadcast::Receiver<StateChange> {
        self.inner.changes.subscribe()
    }

    pub fn device_health(&self, device: &str) -> Option<watch::Receiver<DeviceHealth>> {
        self.inner.health.get(device).map(|entry| entry.value().clone())
    }
}
