//! Training session state machine.
//!
//! Drives exercise and series progression and owns the rest period between
//! series. All commands are synchronous: they may start a countdown or arm
//! an alarm, but they return immediately.
//!
//! ## States
//!
//! ```text
//! NotStarted -> Active -> Completed
//!
//! Active:
//!   SetPending --start_series--> SetRunning --stop_series--> RestPending
//!       ^                            |                        |      ^
//!       |                     (last series:                 pause  resume
//!       |                   confirm requested)                v      |
//!       +---- stop_timer ------------------------------- RestPaused -+
//!       |
//!   RestExpired <--natural expiry-- RestPending
//! ```
//!
//! Sequencing mistakes never fail: a command issued in the wrong state
//! returns an `Ignored` outcome and changes nothing. Store failures are
//! reported to the caller but never hold the workout back.

use std::ops::RangeInclusive;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{Exercise, ExerciseId, HistoryEntry, SessionPlan};
use crate::alarm::AlarmScheduler;
use crate::clock::Clock;
use crate::error::StoreError;
use crate::events::SessionEvent;
use crate::store::WorkoutStore;
use crate::timer::{RestPeriod, TimerState};

/// Extra series performed on top of a set's nominal series count.
///
/// A set with `series = 3` runs until series 4 before asking to finish.
pub const WARM_UP_SERIES: u32 = 1;

pub const REST_MINUTES: RangeInclusive<u32> = 1..=99;

pub const DEFAULT_REST_MINUTES: u32 = 2;

const EVENT_CAPACITY: usize = 256;

/// Weight edits smaller than this are not a change.
const WEIGHT_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotStarted,
    Active,
    Completed,
}

/// Externally visible state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    /// Waiting for the next series to start.
    SetPending,
    /// Performing reps.
    SetRunning,
    /// Rest countdown running.
    RestPending,
    RestPaused,
    /// Rest ran out; waiting for the next series.
    RestExpired,
    Completed,
}

/// Result of a command that either applies or is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Ignored,
}

impl Outcome {
    pub fn applied(self) -> bool {
        self == Outcome::Applied
    }
}

/// Result of [`TrainingSession::stop_series`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesOutcome {
    /// Series counted, rest period started.
    Continue,
    /// No series left; confirm with `confirm_finish_exercise` or back out
    /// with `cancel_finish`.
    ConfirmFinish,
    Ignored,
}

/// Result of finishing an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "advance", rename_all = "snake_case")]
pub enum Advance {
    NextExercise { index: usize },
    Completed,
    Ignored,
}

/// Serializable view of a session for front-ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub exercise_index: usize,
    pub exercise_count: usize,
    pub exercise_name: Option<String>,
    pub current_series: u32,
    pub max_series: u32,
    pub start_series_enabled: bool,
    pub awaiting_confirmation: bool,
    pub rest_minutes: u32,
    pub rest_state: TimerState,
    pub remaining_secs: u64,
    pub pending_weight: f64,
    pub pending_notes: String,
}

/// Exercise currently on screen, with the stored values edits are
/// compared against.
#[derive(Debug, Clone)]
struct Loaded {
    exercise: Exercise,
    set_index: usize,
    baseline_weight: f64,
    baseline_notes: String,
}

#[derive(Debug, Default)]
struct Commit {
    weight: bool,
    notes: bool,
    errors: Vec<StoreError>,
}

pub struct TrainingSession<S, A> {
    plan: SessionPlan,
    store: S,
    alarms: A,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,

    lifecycle: Lifecycle,
    current_exercise_index: usize,
    current_series: u32,
    series_running: bool,
    awaiting_confirmation: bool,
    finished_exercises: usize,

    rest_minutes: u32,
    rest: RestPeriod,
    last_reported_secs: Option<u64>,

    loaded: Option<Loaded>,
    pending_weight: f64,
    pending_notes: String,
}

impl<S: WorkoutStore, A: AlarmScheduler> TrainingSession<S, A> {
    pub fn new(plan: SessionPlan, store: S, alarms: A, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            plan,
            store,
            alarms,
            clock,
            events,
            lifecycle: Lifecycle::NotStarted,
            current_exercise_index: 0,
            current_series: 1,
            series_running: false,
            awaiting_confirmation: false,
            finished_exercises: 0,
            rest_minutes: DEFAULT_REST_MINUTES,
            rest: RestPeriod::new(),
            last_reported_secs: None,
            loaded: None,
            pending_weight: 0.0,
            pending_notes: String::new(),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        match self.lifecycle {
            Lifecycle::NotStarted => Phase::NotStarted,
            Lifecycle::Completed => Phase::Completed,
            Lifecycle::Active if self.series_running => Phase::SetRunning,
            Lifecycle::Active => match self.rest.state() {
                TimerState::Idle => Phase::SetPending,
                TimerState::Running => Phase::RestPending,
                TimerState::Paused => Phase::RestPaused,
                TimerState::Expired => Phase::RestExpired,
            },
        }
    }

    pub fn plan(&self) -> &SessionPlan {
        &self.plan
    }

    pub fn is_active(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    pub fn is_completed(&self) -> bool {
        self.lifecycle == Lifecycle::Completed
    }

    pub fn is_series_running(&self) -> bool {
        self.series_running
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    pub fn current_exercise_index(&self) -> usize {
        self.current_exercise_index
    }

    pub fn current_series(&self) -> u32 {
        self.current_series
    }

    pub fn current_exercise(&self) -> Option<&Exercise> {
        self.loaded.as_ref().map(|l| &l.exercise)
    }

    /// Nominal series of the selected set plus the warm-up series.
    pub fn max_series(&self) -> u32 {
        let nominal = self
            .loaded
            .as_ref()
            .and_then(|l| l.exercise.set(l.set_index))
            .map(|s| s.series)
            .unwrap_or(0);
        nominal + WARM_UP_SERIES
    }

    pub fn start_series_enabled(&self) -> bool {
        self.lifecycle == Lifecycle::Active
            && !self.series_running
            && !self.awaiting_confirmation
            && matches!(self.rest.state(), TimerState::Idle | TimerState::Expired)
    }

    pub fn rest_minutes(&self) -> u32 {
        self.rest_minutes
    }

    pub fn rest_state(&self) -> TimerState {
        self.rest.state()
    }

    /// Generation of the current countdown; tick producers tag ticks with it.
    pub fn rest_generation(&self) -> u64 {
        self.rest.generation()
    }

    pub fn remaining_secs(&self) -> u64 {
        self.rest.remaining_secs(self.clock.now())
    }

    pub fn pending_weight(&self) -> f64 {
        self.pending_weight
    }

    pub fn pending_notes(&self) -> &str {
        &self.pending_notes
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn alarms(&self) -> &A {
        &self.alarms
    }

    /// Receive every [`SessionEvent`] emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            exercise_index: self.current_exercise_index,
            exercise_count: self.plan.exercises.len(),
            exercise_name: self.current_exercise().map(|e| e.name.clone()),
            current_series: self.current_series,
            max_series: self.max_series(),
            start_series_enabled: self.start_series_enabled(),
            awaiting_confirmation: self.awaiting_confirmation,
            rest_minutes: self.rest_minutes,
            rest_state: self.rest.state(),
            remaining_secs: self.remaining_secs(),
            pending_weight: self.pending_weight,
            pending_notes: self.pending_notes.clone(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin the workout on the first exercise.
    ///
    /// Returns `Ok(false)` when the plan is empty or the session was already
    /// started. An error means the first exercise could not be loaded; the
    /// session is active regardless.
    pub fn start_training(&mut self) -> Result<bool, StoreError> {
        if self.lifecycle != Lifecycle::NotStarted {
            tracing::debug!("start_training ignored: session already started");
            return Ok(false);
        }
        if self.plan.exercises.is_empty() {
            tracing::warn!(slot = self.plan.day_slot_id, "cannot start training without exercises");
            return Ok(false);
        }

        self.lifecycle = Lifecycle::Active;
        self.current_exercise_index = 0;
        self.current_series = 1;
        tracing::info!(
            slot = self.plan.day_slot_id,
            exercises = self.plan.exercises.len(),
            "training started"
        );
        self.emit(SessionEvent::TrainingStarted {
            day_slot_id: self.plan.day_slot_id,
            exercise_count: self.plan.exercises.len(),
            at: self.clock.now(),
        });
        self.load_current()?;
        Ok(true)
    }

    pub fn start_series(&mut self) -> Outcome {
        self.refresh();
        if !self.start_series_enabled() {
            return self.ignored("start_series");
        }
        if self.rest.state() == TimerState::Expired {
            self.rest.cancel(&mut self.alarms);
        }

        self.series_running = true;
        self.emit(SessionEvent::SeriesStarted {
            exercise_index: self.current_exercise_index,
            series: self.current_series,
            at: self.clock.now(),
        });
        Outcome::Applied
    }

    /// End the running series.
    ///
    /// Counts the series and starts the rest period while series remain
    /// (up to the nominal count plus [`WARM_UP_SERIES`]); otherwise asks for
    /// confirmation and changes nothing.
    pub fn stop_series(&mut self) -> SeriesOutcome {
        if self.lifecycle != Lifecycle::Active || !self.series_running {
            self.ignored("stop_series");
            return SeriesOutcome::Ignored;
        }
        if self.awaiting_confirmation {
            return SeriesOutcome::ConfirmFinish;
        }

        let max_series = self.max_series();
        if self.current_series + 1 <= max_series {
            self.current_series += 1;
            self.series_running = false;
            self.emit(SessionEvent::SeriesCompleted {
                exercise_index: self.current_exercise_index,
                series: self.current_series,
                at: self.clock.now(),
            });
            self.begin_rest();
            SeriesOutcome::Continue
        } else {
            self.awaiting_confirmation = true;
            self.emit(SessionEvent::FinishConfirmationRequested {
                exercise_index: self.current_exercise_index,
                at: self.clock.now(),
            });
            SeriesOutcome::ConfirmFinish
        }
    }

    /// Decline a pending finish confirmation and go back to `SetPending`.
    pub fn cancel_finish(&mut self) -> Outcome {
        if self.lifecycle != Lifecycle::Active || !self.awaiting_confirmation {
            return self.ignored("cancel_finish");
        }
        self.awaiting_confirmation = false;
        self.series_running = false;
        Outcome::Applied
    }

    pub fn pause_timer(&mut self) -> Outcome {
        self.refresh();
        if self.lifecycle != Lifecycle::Active {
            return self.ignored("pause_timer");
        }
        let now = self.clock.now();
        let Some(remaining_secs) = self.rest.pause(now, &mut self.alarms) else {
            return self.ignored("pause_timer");
        };
        self.last_reported_secs = Some(remaining_secs);
        self.emit(SessionEvent::RestPaused {
            remaining_secs,
            at: now,
        });
        Outcome::Applied
    }

    pub fn resume_timer(&mut self) -> Outcome {
        if self.lifecycle != Lifecycle::Active {
            return self.ignored("resume_timer");
        }
        let now = self.clock.now();
        let Some(generation) = self.rest.resume(now, &mut self.alarms) else {
            return self.ignored("resume_timer");
        };
        let remaining_secs = self.rest.remaining_secs(now);
        self.last_reported_secs = Some(remaining_secs);
        self.emit(SessionEvent::RestResumed {
            generation,
            remaining_secs,
            deadline: self.rest.deadline().unwrap_or(now),
            at: now,
        });
        Outcome::Applied
    }

    /// Start the rest over from the full configured duration.
    pub fn restart_timer(&mut self) -> Outcome {
        self.refresh();
        if !self.rest_in_progress() {
            return self.ignored("restart_timer");
        }
        self.begin_rest();
        Outcome::Applied
    }

    /// Cut the rest short. Enables the next series without an alert.
    pub fn stop_timer_manually(&mut self) -> Outcome {
        self.refresh();
        if !self.rest_in_progress() {
            return self.ignored("stop_timer_manually");
        }
        self.rest.cancel(&mut self.alarms);
        self.last_reported_secs = None;
        self.emit(SessionEvent::RestStopped {
            at: self.clock.now(),
        });
        Outcome::Applied
    }

    /// Process a countdown tick produced for `generation`.
    ///
    /// Ticks from a superseded countdown are dropped. Returns the remaining
    /// seconds when the tick was current.
    pub fn tick(&mut self, generation: u64) -> Option<u64> {
        if self.lifecycle != Lifecycle::Active || generation != self.rest.generation() {
            tracing::trace!(generation, current = self.rest.generation(), "stale tick dropped");
            return None;
        }
        if self.refresh() {
            return Some(0);
        }
        if self.rest.state() != TimerState::Running {
            return None;
        }

        let now = self.clock.now();
        let remaining_secs = self.rest.remaining_secs(now);
        if self.last_reported_secs != Some(remaining_secs) {
            self.last_reported_secs = Some(remaining_secs);
            self.emit(SessionEvent::RestTick {
                remaining_secs,
                at: now,
            });
        }
        Some(remaining_secs)
    }

    /// Change the rest duration. Only while no countdown is running or
    /// paused, and only within [`REST_MINUTES`].
    pub fn set_rest_minutes(&mut self, minutes: u32) -> Outcome {
        self.refresh();
        if self.lifecycle == Lifecycle::Completed || self.rest_in_progress() {
            return self.ignored("set_rest_minutes");
        }
        if !REST_MINUTES.contains(&minutes) {
            tracing::warn!(minutes, "rest minutes outside 1..=99 rejected");
            return Outcome::Ignored;
        }
        self.rest_minutes = minutes;
        self.emit(SessionEvent::RestMinutesChanged {
            minutes,
            at: self.clock.now(),
        });
        Outcome::Applied
    }

    /// Stage a new weight for the selected set of the current exercise.
    pub fn set_pending_weight(&mut self, weight_kg: f64) -> Outcome {
        if self.lifecycle != Lifecycle::Active || !weight_kg.is_finite() || weight_kg < 0.0 {
            return self.ignored("set_pending_weight");
        }
        self.pending_weight = weight_kg;
        Outcome::Applied
    }

    /// Stage new notes for the current exercise.
    pub fn set_pending_notes(&mut self, notes: impl Into<String>) -> Outcome {
        if self.lifecycle != Lifecycle::Active {
            return self.ignored("set_pending_notes");
        }
        self.pending_notes = notes.into();
        Outcome::Applied
    }

    /// Accept the finish requested by [`stop_series`](Self::stop_series).
    ///
    /// An error means a store call failed after the session had already
    /// advanced; query [`phase`](Self::phase) for where it landed.
    pub fn confirm_finish_exercise(&mut self) -> Result<Advance, StoreError> {
        if self.lifecycle != Lifecycle::Active || !self.awaiting_confirmation {
            self.ignored("confirm_finish_exercise");
            return Ok(Advance::Ignored);
        }
        self.advance()
    }

    /// Finish the current exercise at any point of the workout.
    pub fn finish_exercise_manually(&mut self) -> Result<Advance, StoreError> {
        if self.lifecycle != Lifecycle::Active {
            self.ignored("finish_exercise_manually");
            return Ok(Advance::Ignored);
        }
        self.advance()
    }

    /// End the workout. Terminal and idempotent.
    ///
    /// Returns `Ok(false)` when the session had already ended.
    pub fn end_training(&mut self) -> Result<bool, StoreError> {
        match self.lifecycle {
            Lifecycle::Completed => Ok(false),
            Lifecycle::NotStarted => {
                self.lifecycle = Lifecycle::Completed;
                self.emit(SessionEvent::TrainingEnded {
                    day_slot_id: self.plan.day_slot_id,
                    completed_exercises: 0,
                    at: self.clock.now(),
                });
                Ok(true)
            }
            Lifecycle::Active => {
                let commit = self.commit_pending();
                let mut errors = commit.errors;
                errors.extend(self.finish());
                first_error(errors)?;
                Ok(true)
            }
        }
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn rest_in_progress(&self) -> bool {
        matches!(self.rest.state(), TimerState::Running | TimerState::Paused)
    }

    /// Re-derive the countdown and handle a natural expiry.
    fn refresh(&mut self) -> bool {
        let now = self.clock.now();
        if !self.rest.poll(now) {
            return false;
        }
        self.last_reported_secs = Some(0);
        tracing::info!(exercise = self.current_exercise_index, "rest expired");
        self.emit(SessionEvent::RestExpired { at: now });
        true
    }

    fn begin_rest(&mut self) {
        let now = self.clock.now();
        let duration_secs = u64::from(self.rest_minutes) * 60;
        let generation = self.rest.arm(duration_secs, now, &mut self.alarms);
        self.last_reported_secs = Some(duration_secs);
        tracing::debug!(generation, duration_secs, "rest started");
        self.emit(SessionEvent::RestStarted {
            generation,
            duration_secs,
            deadline: self.rest.deadline().unwrap_or(now),
            at: now,
        });
    }

    fn advance(&mut self) -> Result<Advance, StoreError> {
        let commit = self.commit_pending();
        let mut errors = commit.errors;

        self.rest.cancel(&mut self.alarms);
        self.series_running = false;
        self.awaiting_confirmation = false;
        self.last_reported_secs = None;

        let index = self.current_exercise_index;
        if let Some(exercise_id) = self.plan.exercises.get(index).map(|r| r.exercise_id) {
            self.emit(SessionEvent::ExerciseFinished {
                index,
                exercise_id,
                weight_committed: commit.weight,
                notes_committed: commit.notes,
                at: self.clock.now(),
            });
        }
        self.finished_exercises += 1;
        self.current_exercise_index += 1;

        let advance = if self.current_exercise_index < self.plan.exercises.len() {
            self.current_series = 1;
            if let Err(e) = self.load_current() {
                errors.push(e);
            }
            Advance::NextExercise {
                index: self.current_exercise_index,
            }
        } else {
            self.loaded = None;
            errors.extend(self.finish());
            Advance::Completed
        };

        first_error(errors)?;
        Ok(advance)
    }

    /// Close the session without committing edits.
    fn finish(&mut self) -> Option<StoreError> {
        self.rest.cancel(&mut self.alarms);
        self.series_running = false;
        self.awaiting_confirmation = false;
        self.lifecycle = Lifecycle::Completed;

        let slot = self.plan.day_slot_id;
        let error = match self.store.mark_day_slot_completed(slot) {
            Ok(()) => None,
            Err(e) => {
                self.report_store_error(None, &e);
                Some(e)
            }
        };
        tracing::info!(slot, exercises = self.finished_exercises, "training ended");
        self.emit(SessionEvent::TrainingEnded {
            day_slot_id: slot,
            completed_exercises: self.finished_exercises,
            at: self.clock.now(),
        });
        error
    }

    fn load_current(&mut self) -> Result<(), StoreError> {
        self.loaded = None;
        self.pending_weight = 0.0;
        self.pending_notes.clear();

        let index = self.current_exercise_index;
        let Some(selected) = self.plan.exercises.get(index).copied() else {
            return Ok(());
        };
        let exercise = match self.store.exercise(selected.exercise_id) {
            Ok(exercise) => exercise,
            Err(e) => {
                self.report_store_error(Some(selected.exercise_id), &e);
                return Err(e);
            }
        };

        let baseline_weight = exercise
            .set(selected.set_index)
            .map(|s| s.weight_kg)
            .unwrap_or(0.0);
        self.pending_weight = baseline_weight;
        self.pending_notes = exercise.notes.clone();
        self.loaded = Some(Loaded {
            baseline_notes: exercise.notes.clone(),
            exercise,
            set_index: selected.set_index,
            baseline_weight,
        });

        let name = self
            .current_exercise()
            .map(|e| e.name.clone())
            .unwrap_or_default();
        self.emit(SessionEvent::ExerciseLoaded {
            index,
            exercise_id: selected.exercise_id,
            name,
            max_series: self.max_series(),
            weight_kg: baseline_weight,
            at: self.clock.now(),
        });
        Ok(())
    }

    /// Write staged edits that differ from the stored baseline.
    ///
    /// A weight change also appends a history record with the set's
    /// nominal series and reps.
    fn commit_pending(&mut self) -> Commit {
        let mut commit = Commit::default();
        let now = self.clock.now();
        let Some(loaded) = self.loaded.as_mut() else {
            return commit;
        };
        let id = loaded.exercise.id;

        if (self.pending_weight - loaded.baseline_weight).abs() > WEIGHT_EPSILON {
            let weight_kg = self.pending_weight;
            match self.store.update_weight(id, loaded.set_index, weight_kg) {
                Ok(()) => {
                    loaded.baseline_weight = weight_kg;
                    commit.weight = true;
                    let (series, reps) = loaded
                        .exercise
                        .set(loaded.set_index)
                        .map(|s| (s.series, s.reps))
                        .unwrap_or((0, 0));
                    let entry = HistoryEntry {
                        exercise_id: id,
                        series,
                        reps,
                        weight_kg,
                        recorded_at: now,
                    };
                    if let Err(e) = self.store.append_history(&entry) {
                        commit.errors.push(e);
                    }
                }
                Err(e) => commit.errors.push(e),
            }
        }

        if self.pending_notes != loaded.baseline_notes {
            match self.store.update_notes(id, &self.pending_notes) {
                Ok(()) => {
                    loaded.baseline_notes = self.pending_notes.clone();
                    commit.notes = true;
                }
                Err(e) => commit.errors.push(e),
            }
        }

        for e in &commit.errors {
            self.report_store_error(Some(id), e);
        }
        commit
    }

    fn report_store_error(&self, exercise_id: Option<ExerciseId>, error: &StoreError) {
        tracing::warn!(?exercise_id, error = %error, "store call failed, session continues");
        self.emit(SessionEvent::StoreFailed {
            exercise_id,
            message: error.to_string(),
            at: self.clock.now(),
        });
    }

    fn ignored(&self, command: &'static str) -> Outcome {
        tracing::debug!(command, phase = ?self.phase(), "command ignored");
        Outcome::Ignored
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn first_error(errors: Vec<StoreError>) -> Result<(), StoreError> {
    match errors.into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
