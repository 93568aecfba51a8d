//! Alert delivery for fired alarms.
//!
//! When an alarm fires the service:
//!
//! 1. acquires the keep-awake guarantee, bounded by a ceiling,
//! 2. posts a persistent notification,
//! 3. starts the alert cycle: sound + haptic pulse, wait, repeat,
//! 4. waits for [`AlarmDeliveryService::acknowledge`].
//!
//! Channel failures degrade the alert instead of aborting it: a missing
//! sound falls back to vibration-only, a denied wake lock leaves the
//! notification and the cycle running. Failures are logged with `tracing`
//! and never reach the platform caller.
//!
//! The ceiling bounds only the keep-awake guarantee: once it elapses the
//! wake lock is released, while the notification and the cycle keep going
//! until acknowledged.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::scheduler::{AlarmId, AlarmReceiver, TimerKind};
use crate::error::DeliveryError;

/// Keep-awake primitive (CPU wake lock on phones).
pub trait WakeLock: Send + Sync {
    /// Acquire, asking the platform to drop it on its own after `ceiling`.
    fn acquire(&self, ceiling: Duration) -> Result<(), DeliveryError>;
    fn release(&self);
}

/// Output channels of an alert.
pub trait AlertSink: Send + Sync {
    /// Post the persistent, user-dismissable notification.
    fn show_notification(&self, kind: TimerKind) -> Result<(), DeliveryError>;
    fn clear_notification(&self);
    fn play_sound(&self) -> Result<(), DeliveryError>;
    fn vibrate(&self) -> Result<(), DeliveryError>;
}

/// Delivery tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Pause between two alert pulses.
    pub interval: Duration,
    /// Maximum time the wake lock is held for one delivery.
    pub wake_ceiling: Duration,
    /// Pulse haptics alongside the sound.
    pub vibration: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            wake_ceiling: Duration::from_secs(10 * 60),
            vibration: true,
        }
    }
}

/// Observable state of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Idle,
    /// Alert cycle running.
    Alerting,
    /// Ceiling reached and wake lock released; the alert cycle keeps running.
    WakeReleased,
}

struct ActiveDelivery {
    id: u64,
    kind: TimerKind,
    wake_held: bool,
    ceiling_reached: bool,
    cycle: JoinHandle<()>,
    ceiling: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    next_id: u64,
    active: Option<ActiveDelivery>,
}

/// Reacts to fired alarms with a repeating alert until acknowledged.
///
/// At most one delivery is active at a time; it exclusively owns the wake
/// lock while it runs.
pub struct AlarmDeliveryService {
    handle: Handle,
    sink: Arc<dyn AlertSink>,
    wake: Arc<dyn WakeLock>,
    config: DeliveryConfig,
    state: Arc<Mutex<State>>,
}

impl AlarmDeliveryService {
    pub fn new(
        handle: Handle,
        sink: Arc<dyn AlertSink>,
        wake: Arc<dyn WakeLock>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            handle,
            sink,
            wake,
            config,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        let state = lock(&self.state);
        match &state.active {
            None => DeliveryStatus::Idle,
            Some(active) if active.ceiling_reached => DeliveryStatus::WakeReleased,
            Some(_) => DeliveryStatus::Alerting,
        }
    }

    /// Kind of the delivery awaiting acknowledgement, if any.
    pub fn active_kind(&self) -> Option<TimerKind> {
        lock(&self.state).active.as_ref().map(|a| a.kind)
    }

    /// Start alerting for `kind`.
    ///
    /// A second fire while an alert is already running is absorbed by the
    /// running alert.
    pub fn deliver(&self, kind: TimerKind) {
        let mut state = lock(&self.state);
        if state.active.is_some() {
            tracing::debug!(%kind, "alert already active, ignoring duplicate fire");
            return;
        }

        let wake_held = match self.wake.acquire(self.config.wake_ceiling) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "wake lock unavailable, alerting without it");
                false
            }
        };

        if let Err(e) = self.sink.show_notification(kind) {
            tracing::warn!(error = %e, "failed to post alert notification");
        }

        state.next_id += 1;
        let id = state.next_id;
        let cycle = self.spawn_cycle();
        let ceiling = self.spawn_ceiling(id);

        tracing::info!(%kind, wake_held, "rest alert started");
        state.active = Some(ActiveDelivery {
            id,
            kind,
            wake_held,
            ceiling_reached: false,
            cycle,
            ceiling,
        });
    }

    /// Stop the alert. Returns `true` if an alert was active.
    ///
    /// Idempotent: the wake lock is released and the notification removed
    /// exactly once per delivery.
    pub fn acknowledge(&self) -> bool {
        let Some(active) = lock(&self.state).active.take() else {
            return false;
        };

        active.cycle.abort();
        active.ceiling.abort();
        if active.wake_held {
            self.wake.release();
        }
        self.sink.clear_notification();
        tracing::info!(kind = %active.kind, "rest alert acknowledged");
        true
    }

    fn spawn_cycle(&self) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        let interval = self.config.interval;
        let vibration = self.config.vibration;
        self.handle.spawn(async move {
            let mut sound_ok = true;
            loop {
                if sound_ok {
                    if let Err(e) = sink.play_sound() {
                        tracing::warn!(error = %e, "alert sound failed, falling back to vibration");
                        sound_ok = false;
                    }
                }
                if vibration || !sound_ok {
                    if let Err(e) = sink.vibrate() {
                        tracing::warn!(error = %e, "alert vibration failed");
                    }
                }
                tokio::time::sleep(interval).await;
            }
        })
    }

    fn spawn_ceiling(&self, id: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let wake = Arc::clone(&self.wake);
        let ceiling = self.config.wake_ceiling;
        self.handle.spawn(async move {
            tokio::time::sleep(ceiling).await;
            let mut state = lock(&state);
            let Some(active) = state.active.as_mut().filter(|a| a.id == id) else {
                return;
            };
            active.ceiling_reached = true;
            if active.wake_held {
                active.wake_held = false;
                wake.release();
            }
            tracing::warn!(
                ceiling_secs = ceiling.as_secs(),
                "alert not acknowledged before ceiling, wake lock released, still alerting"
            );
        })
    }
}

impl AlarmReceiver for AlarmDeliveryService {
    fn on_alarm(&self, _id: AlarmId, kind: TimerKind) {
        self.deliver(kind);
    }
}

fn lock(state: &Mutex<State>) -> std::sync::MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}
