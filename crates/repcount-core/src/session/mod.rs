//! Training session: exercise and series progression with rest periods.

mod engine;
mod model;
mod runner;

pub use engine::{
    Advance, Outcome, Phase, SeriesOutcome, SessionSnapshot, TrainingSession,
    DEFAULT_REST_MINUTES, REST_MINUTES, WARM_UP_SERIES,
};
pub use model::{
    DaySlotId, Exercise, ExerciseId, ExerciseRef, HistoryEntry, SessionPlan, SetVariant,
};
pub use runner::{Command, Reply, Response, RunnerStopped, SessionHandle, SessionRunner};
