use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{DaySlotId, ExerciseId};

/// Every state change of a training session produces an event.
/// Front-ends subscribe to them instead of polling the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    TrainingStarted {
        day_slot_id: DaySlotId,
        exercise_count: usize,
        at: DateTime<Utc>,
    },
    /// A new exercise is on screen with its stored weight and notes.
    ExerciseLoaded {
        index: usize,
        exercise_id: ExerciseId,
        name: String,
        max_series: u32,
        weight_kg: f64,
        at: DateTime<Utc>,
    },
    SeriesStarted {
        exercise_index: usize,
        series: u32,
        at: DateTime<Utc>,
    },
    /// A series ended and `series` is the one to perform next.
    SeriesCompleted {
        exercise_index: usize,
        series: u32,
        at: DateTime<Utc>,
    },
    /// The last series ended; the front-end should ask whether to finish.
    FinishConfirmationRequested {
        exercise_index: usize,
        at: DateTime<Utc>,
    },
    RestStarted {
        generation: u64,
        duration_secs: u64,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Remaining whole seconds changed.
    RestTick {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    RestPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    RestResumed {
        generation: u64,
        remaining_secs: u64,
        deadline: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Operator stopped the rest early.
    RestStopped {
        at: DateTime<Utc>,
    },
    /// Rest ran out through natural countdown.
    RestExpired {
        at: DateTime<Utc>,
    },
    RestMinutesChanged {
        minutes: u32,
        at: DateTime<Utc>,
    },
    ExerciseFinished {
        index: usize,
        exercise_id: ExerciseId,
        weight_committed: bool,
        notes_committed: bool,
        at: DateTime<Utc>,
    },
    /// A store call failed; the session moved on regardless.
    StoreFailed {
        exercise_id: Option<ExerciseId>,
        message: String,
        at: DateTime<Utc>,
    },
    TrainingEnded {
        day_slot_id: DaySlotId,
        completed_exercises: usize,
        at: DateTime<Utc>,
    },
}
