//! Workout data the session reads and writes back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type ExerciseId = i64;
pub type DaySlotId = i64;

/// Target configuration of an exercise: `series` x `reps` @ `weight_kg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetVariant {
    pub series: u32,
    pub reps: u32,
    pub weight_kg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub name: String,
    pub muscle_group: String,
    /// Ordered set variants.
    pub sets: Vec<SetVariant>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub image: Option<String>,
}

impl Exercise {
    pub fn set(&self, index: usize) -> Option<&SetVariant> {
        self.sets.get(index)
    }
}

/// An exercise assigned to a day-slot, with the set variant to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseRef {
    pub exercise_id: ExerciseId,
    pub set_index: usize,
}

/// Everything needed to run one workout: the day-slot and its exercises
/// in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPlan {
    pub day_slot_id: DaySlotId,
    pub exercises: Vec<ExerciseRef>,
}

/// One appended history record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub exercise_id: ExerciseId,
    pub series: u32,
    pub reps: u32,
    pub weight_kg: f64,
    pub recorded_at: DateTime<Utc>,
}
