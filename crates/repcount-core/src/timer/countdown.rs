//! Drift-resistant countdown.
//!
//! The countdown stores an absolute deadline and derives the remaining time
//! from `deadline - now` on every query. Nothing is ever subtracted per tick,
//! so a late or skipped tick (device sleep, scheduler jitter) cannot make the
//! countdown fall behind the wall clock.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Running -> (Paused -> Running)* -> Expired
//!           |                                  |
//!           +------------ stop() --------------+--> Idle
//! ```
//!
//! Every `start`, `pause`, `resume` and `stop` bumps the generation counter.
//! Tick producers tag their ticks with the generation they were started for;
//! a tick whose generation no longer matches belongs to a superseded timer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    /// Reached zero through natural countdown.
    Expired,
}

/// Wall-clock countdown with a single terminal expiry.
///
/// Operates on instants passed in by the caller -- no internal thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallClockTimer {
    state: TimerState,
    generation: u64,
    duration_secs: u64,
    started_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    remaining_at_pause: u64,
}

impl WallClockTimer {
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            generation: 0,
            duration_secs: 0,
            started_at: None,
            deadline: None,
            remaining_at_pause: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    /// Duration passed to the most recent `start`.
    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Absolute deadline while running.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            TimerState::Running => self.deadline,
            _ => None,
        }
    }

    /// Whole seconds left, rounded up.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.state {
            TimerState::Running => self
                .deadline
                .map(|deadline| secs_until(deadline, now))
                .unwrap_or(0),
            TimerState::Paused => self.remaining_at_pause,
            TimerState::Idle | TimerState::Expired => 0,
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start counting down `duration_secs` from `now`.
    ///
    /// Supersedes whatever the timer was doing. Returns the new generation.
    pub fn start(&mut self, duration_secs: u64, now: DateTime<Utc>) -> u64 {
        self.generation += 1;
        self.state = TimerState::Running;
        self.duration_secs = duration_secs;
        self.started_at = Some(now);
        self.deadline = Some(deadline_after(now, duration_secs));
        self.remaining_at_pause = 0;
        self.generation
    }

    /// Freeze the countdown. Returns the remaining seconds, or `None` when
    /// the timer was not running.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if self.state != TimerState::Running {
            return None;
        }
        let remaining = self.remaining_secs(now);
        self.generation += 1;
        self.state = TimerState::Paused;
        self.deadline = None;
        self.remaining_at_pause = remaining;
        Some(remaining)
    }

    /// Continue a paused countdown with a freshly derived deadline.
    ///
    /// Returns the new generation, or `None` when the timer was not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Option<u64> {
        if self.state != TimerState::Paused {
            return None;
        }
        let remaining = self.remaining_at_pause;
        let generation = self.start(remaining, now);
        Some(generation)
    }

    /// Operator stop: clears the countdown without signalling expiry.
    ///
    /// Returns `true` when a running or paused countdown was cleared.
    pub fn stop(&mut self) -> bool {
        let was_active = matches!(self.state, TimerState::Running | TimerState::Paused);
        if self.state != TimerState::Idle {
            self.generation += 1;
        }
        self.state = TimerState::Idle;
        self.deadline = None;
        self.remaining_at_pause = 0;
        was_active
    }

    /// Re-derive the countdown at `now`.
    ///
    /// Returns `true` exactly once, on the poll that first observes the
    /// deadline passing.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TimerState::Running {
            return false;
        }
        if self.remaining_secs(now) > 0 {
            return false;
        }
        self.state = TimerState::Expired;
        self.deadline = None;
        true
    }
}

impl Default for WallClockTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// `now + secs`, saturating at the latest representable instant.
fn deadline_after(now: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// `max(0, ceil((deadline - now) / 1s))`
fn secs_until(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let ms = (deadline - now).num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    (ms as u64).div_ceil(1_000)
}
