//! Persistence seam consumed by the training session.

use std::collections::HashMap;

use crate::error::StoreError;
use crate::session::{DaySlotId, Exercise, ExerciseId, HistoryEntry};

/// Exercise and history persistence.
///
/// Calls are made one at a time from the session's task, so writes for the
/// same exercise never overlap.
pub trait WorkoutStore: Send {
    fn exercise(&self, id: ExerciseId) -> Result<Exercise, StoreError>;
    /// Set the weight of one set variant of an exercise.
    fn update_weight(
        &mut self,
        id: ExerciseId,
        set_index: usize,
        weight_kg: f64,
    ) -> Result<(), StoreError>;
    fn update_notes(&mut self, id: ExerciseId, notes: &str) -> Result<(), StoreError>;
    fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), StoreError>;
    fn mark_day_slot_completed(&mut self, slot: DaySlotId) -> Result<(), StoreError>;
}

/// Volatile store, for tests and for embedding without a database.
///
/// Keeps every write call so callers can assert on what was persisted.
#[derive(Debug, Default)]
pub struct MemoryStore {
    exercises: HashMap<ExerciseId, Exercise>,
    history: Vec<HistoryEntry>,
    completed_slots: Vec<DaySlotId>,
    weight_writes: usize,
    notes_writes: usize,
    failing: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exercises(exercises: impl IntoIterator<Item = Exercise>) -> Self {
        let mut store = Self::new();
        for exercise in exercises {
            store.insert(exercise);
        }
        store
    }

    pub fn insert(&mut self, exercise: Exercise) {
        self.exercises.insert(exercise.id, exercise);
    }

    /// Make every subsequent write fail with [`StoreError::Rejected`].
    pub fn set_failing(&mut self, failing: bool) {
        self.failing = failing;
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Every `mark_day_slot_completed` call, in order.
    pub fn completed_slots(&self) -> &[DaySlotId] {
        &self.completed_slots
    }

    pub fn weight_writes(&self) -> usize {
        self.weight_writes
    }

    pub fn notes_writes(&self) -> usize {
        self.notes_writes
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.failing {
            return Err(StoreError::Rejected("store is read-only".into()));
        }
        Ok(())
    }

    fn exercise_mut(&mut self, id: ExerciseId) -> Result<&mut Exercise, StoreError> {
        self.exercises.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "exercise",
            id,
        })
    }
}

impl WorkoutStore for MemoryStore {
    fn exercise(&self, id: ExerciseId) -> Result<Exercise, StoreError> {
        self.exercises.get(&id).cloned().ok_or(StoreError::NotFound {
            entity: "exercise",
            id,
        })
    }

    fn update_weight(
        &mut self,
        id: ExerciseId,
        set_index: usize,
        weight_kg: f64,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        let exercise = self.exercise_mut(id)?;
        let set = exercise
            .sets
            .get_mut(set_index)
            .ok_or(StoreError::NotFound {
                entity: "set variant",
                id: i64::try_from(set_index).unwrap_or(i64::MAX),
            })?;
        set.weight_kg = weight_kg;
        self.weight_writes += 1;
        Ok(())
    }

    fn update_notes(&mut self, id: ExerciseId, notes: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.exercise_mut(id)?.notes = notes.to_string();
        self.notes_writes += 1;
        Ok(())
    }

    fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.check_writable()?;
        self.history.push(entry.clone());
        Ok(())
    }

    fn mark_day_slot_completed(&mut self, slot: DaySlotId) -> Result<(), StoreError> {
        self.check_writable()?;
        self.completed_slots.push(slot);
        Ok(())
    }
}
