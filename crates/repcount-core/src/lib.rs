//! # Repcount Core Library
//!
//! Core logic of a strength-training companion: it walks the operator
//! through the exercises of a day-slot, counts series, runs the rest
//! countdown between series and raises an alarm when rest is over, even if
//! the front-end is asleep.
//!
//! ## Architecture
//!
//! - **Session**: an explicit state machine ([`TrainingSession`]) with a
//!   command/query API and a broadcast stream of [`SessionEvent`]s, driven
//!   by a [`SessionRunner`] task
//! - **Timer**: a wall-clock countdown that never drifts under late ticks
//! - **Alarm**: out-of-band scheduling, alert delivery with a wake lock,
//!   and a journal that survives restarts
//! - **Storage**: SQLite workout storage and TOML configuration
//!
//! ## Key Components
//!
//! - [`TrainingSession`]: series/rest state machine
//! - [`WallClockTimer`]: drift-free countdown
//! - [`AlarmScheduler`] / [`AlarmDeliveryService`]: rest-over alarm
//! - [`Database`]: [`WorkoutStore`] and [`AlarmJournal`] on SQLite
//! - [`Config`]: application configuration

pub mod alarm;
pub mod clock;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod store;
pub mod timer;

pub use alarm::{
    recover_alarms, AlarmDeliveryService, AlarmId, AlarmJournal, AlarmReceiver, AlarmScheduler,
    AlarmToken, AlertSink, DeliveryConfig, DeliveryStatus, JournaledScheduler, RecoveryReport,
    TimerKind, TokioAlarmScheduler, WakeLock,
};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use error::{AlarmError, ConfigError, CoreError, DeliveryError, StoreError, ValidationError};
pub use events::SessionEvent;
pub use session::{
    Advance, Command, Outcome, Phase, SeriesOutcome, SessionHandle, SessionPlan, SessionRunner,
    SessionSnapshot, TrainingSession, WARM_UP_SERIES,
};
pub use storage::{Config, Database};
pub use store::{MemoryStore, WorkoutStore};
pub use timer::{RestPeriod, TimerState, WallClockTimer};
