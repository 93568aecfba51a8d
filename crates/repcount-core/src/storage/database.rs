//! SQLite-based workout storage.
//!
//! Provides persistent storage for:
//! - The exercise catalogue and its set variants
//! - Day-slots (planned workouts) and their completion
//! - Weight history
//! - The armed-alarm journal

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::{data_dir, migrations};
use crate::alarm::{AlarmId, AlarmJournal, JournaledAlarm, TimerKind};
use crate::error::{CoreError, StoreError};
use crate::session::{
    DaySlotId, Exercise, ExerciseId, ExerciseRef, HistoryEntry, SessionPlan, SetVariant,
};
use crate::store::WorkoutStore;

/// A day-slot as listed by [`Database::day_slots`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaySlotSummary {
    pub id: DaySlotId,
    pub name: String,
    pub exercise_count: usize,
    pub completed_at: Option<DateTime<Utc>>,
}

/// SQLite database for workouts.
pub struct Database {
    conn: Connection,
}

fn parse_time(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn to_index(idx: usize, value: i64) -> Result<usize, rusqlite::Error> {
    usize::try_from(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/repcount/repcount.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unusable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("repcount.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::migrate(&conn).map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Insert an exercise with its ordered set variants.
    pub fn insert_exercise(
        &self,
        name: &str,
        muscle_group: &str,
        sets: &[SetVariant],
    ) -> Result<ExerciseId, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO exercises (name, muscle_group) VALUES (?1, ?2)",
            params![name, muscle_group],
        )?;
        let id = tx.last_insert_rowid();
        for (position, set) in sets.iter().enumerate() {
            tx.execute(
                "INSERT INTO set_variants (exercise_id, position, series, reps, weight_kg)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, position as i64, set.series, set.reps, set.weight_kg],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// Create a day-slot whose exercises run in the given order.
    pub fn create_day_slot(
        &self,
        name: &str,
        exercises: &[ExerciseRef],
    ) -> Result<DaySlotId, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("INSERT INTO day_slots (name) VALUES (?1)", params![name])?;
        let id = tx.last_insert_rowid();
        for (position, exercise) in exercises.iter().enumerate() {
            tx.execute(
                "INSERT INTO day_slot_exercises (day_slot_id, position, exercise_id, set_index)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id,
                    position as i64,
                    exercise.exercise_id,
                    exercise.set_index as i64
                ],
            )?;
        }
        tx.commit()?;
        Ok(id)
    }

    /// The ordered exercises of a day-slot, ready to start a session.
    pub fn day_slot_plan(&self, slot: DaySlotId) -> Result<SessionPlan, StoreError> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM day_slots WHERE id = ?1", [slot], |_| Ok(()))
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::NotFound {
                entity: "day slot",
                id: slot,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT exercise_id, set_index FROM day_slot_exercises
             WHERE day_slot_id = ?1 ORDER BY position",
        )?;
        let exercises = stmt
            .query_map([slot], |row| {
                Ok(ExerciseRef {
                    exercise_id: row.get(0)?,
                    set_index: to_index(1, row.get(1)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(SessionPlan {
            day_slot_id: slot,
            exercises,
        })
    }

    pub fn day_slots(&self) -> Result<Vec<DaySlotSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.name, d.completed_at, COUNT(e.exercise_id)
             FROM day_slots d
             LEFT JOIN day_slot_exercises e ON e.day_slot_id = d.id
             GROUP BY d.id ORDER BY d.id",
        )?;
        let slots = stmt
            .query_map([], |row| {
                let completed_at: Option<String> = row.get(2)?;
                Ok(DaySlotSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    completed_at: completed_at.as_deref().map(|s| parse_time(2, s)).transpose()?,
                    exercise_count: to_index(3, row.get(3)?)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }

    /// When the day-slot was last completed, if ever.
    pub fn day_slot_completed(&self, slot: DaySlotId) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT completed_at FROM day_slots WHERE id = ?1",
                [slot],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Err(StoreError::NotFound {
                entity: "day slot",
                id: slot,
            }),
            Some(None) => Ok(None),
            Some(Some(s)) => Ok(Some(parse_time(0, &s)?)),
        }
    }

    /// Weight history of an exercise, oldest first.
    pub fn history(&self, exercise_id: ExerciseId) -> Result<Vec<HistoryEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT exercise_id, series, reps, weight_kg, recorded_at FROM history
             WHERE exercise_id = ?1 ORDER BY recorded_at, id",
        )?;
        let entries = stmt
            .query_map([exercise_id], |row| {
                let recorded_at: String = row.get(4)?;
                Ok(HistoryEntry {
                    exercise_id: row.get(0)?,
                    series: row.get(1)?,
                    reps: row.get(2)?,
                    weight_kg: row.get(3)?,
                    recorded_at: parse_time(4, &recorded_at)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    fn set_variants(&self, id: ExerciseId) -> Result<Vec<SetVariant>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT series, reps, weight_kg FROM set_variants
             WHERE exercise_id = ?1 ORDER BY position",
        )?;
        let sets = stmt
            .query_map([id], |row| {
                Ok(SetVariant {
                    series: row.get(0)?,
                    reps: row.get(1)?,
                    weight_kg: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sets)
    }
}

impl WorkoutStore for Database {
    fn exercise(&self, id: ExerciseId) -> Result<Exercise, StoreError> {
        let exercise = self
            .conn
            .query_row(
                "SELECT id, name, muscle_group, notes, image FROM exercises WHERE id = ?1",
                [id],
                |row| {
                    Ok(Exercise {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        muscle_group: row.get(2)?,
                        sets: Vec::new(),
                        notes: row.get(3)?,
                        image: row.get(4)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "exercise",
                id,
            })?;
        Ok(Exercise {
            sets: self.set_variants(id)?,
            ..exercise
        })
    }

    fn update_weight(
        &mut self,
        id: ExerciseId,
        set_index: usize,
        weight_kg: f64,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE set_variants SET weight_kg = ?1 WHERE exercise_id = ?2 AND position = ?3",
            params![weight_kg, id, set_index as i64],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "set variant",
                id,
            });
        }
        tracing::debug!(exercise = id, set_index, weight_kg, "weight updated");
        Ok(())
    }

    fn update_notes(&mut self, id: ExerciseId, notes: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE exercises SET notes = ?1 WHERE id = ?2",
            params![notes, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "exercise",
                id,
            });
        }
        Ok(())
    }

    fn append_history(&mut self, entry: &HistoryEntry) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO history (exercise_id, series, reps, weight_kg, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.exercise_id,
                entry.series,
                entry.reps,
                entry.weight_kg,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn mark_day_slot_completed(&mut self, slot: DaySlotId) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE day_slots SET completed_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), slot],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "day slot",
                id: slot,
            });
        }
        Ok(())
    }
}

impl AlarmJournal for Database {
    fn record(&mut self, alarm: &JournaledAlarm) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO armed_alarms (id, kind, fire_at, seq) VALUES (?1, ?2, ?3, ?4)",
            params![
                alarm.id.0,
                alarm.kind.as_str(),
                alarm.fire_at.to_rfc3339(),
                alarm.seq as i64
            ],
        )?;
        Ok(())
    }

    fn clear(&mut self, id: AlarmId, seq: Option<u64>) -> Result<(), StoreError> {
        match seq {
            Some(seq) => self.conn.execute(
                "DELETE FROM armed_alarms WHERE id = ?1 AND seq = ?2",
                params![id.0, seq as i64],
            )?,
            None => self
                .conn
                .execute("DELETE FROM armed_alarms WHERE id = ?1", params![id.0])?,
        };
        Ok(())
    }

    fn pending(&self) -> Result<Vec<JournaledAlarm>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, kind, fire_at, seq FROM armed_alarms ORDER BY fire_at")?;
        let alarms = stmt
            .query_map([], |row| {
                let kind: String = row.get(1)?;
                let fire_at: String = row.get(2)?;
                let seq: i64 = row.get(3)?;
                Ok(JournaledAlarm {
                    id: AlarmId(row.get(0)?),
                    kind: kind.parse::<TimerKind>().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
                    })?,
                    fire_at: parse_time(2, &fire_at)?,
                    seq: u64::try_from(seq).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e))
                    })?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alarms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn squat_day(db: &Database) -> (ExerciseId, DaySlotId) {
        let squat = db
            .insert_exercise(
                "Squat",
                "legs",
                &[
                    SetVariant {
                        series: 5,
                        reps: 5,
                        weight_kg: 100.0,
                    },
                    SetVariant {
                        series: 3,
                        reps: 8,
                        weight_kg: 80.0,
                    },
                ],
            )
            .unwrap();
        let slot = db
            .create_day_slot(
                "Leg day",
                &[ExerciseRef {
                    exercise_id: squat,
                    set_index: 1,
                }],
            )
            .unwrap();
        (squat, slot)
    }

    #[test]
    fn exercise_roundtrip_keeps_set_order() {
        let db = Database::open_memory().unwrap();
        let (squat, _) = squat_day(&db);
        let exercise = db.exercise(squat).unwrap();
        assert_eq!(exercise.name, "Squat");
        assert_eq!(exercise.sets.len(), 2);
        assert_eq!(exercise.sets[1].reps, 8);
        assert!(matches!(
            db.exercise(999),
            Err(StoreError::NotFound { entity: "exercise", .. })
        ));
    }

    #[test]
    fn plan_and_completion() {
        let mut db = Database::open_memory().unwrap();
        let (squat, slot) = squat_day(&db);

        let plan = db.day_slot_plan(slot).unwrap();
        assert_eq!(plan.exercises, vec![ExerciseRef { exercise_id: squat, set_index: 1 }]);
        assert!(db.day_slot_plan(slot + 1).is_err());

        assert!(db.day_slot_completed(slot).unwrap().is_none());
        db.mark_day_slot_completed(slot).unwrap();
        assert!(db.day_slot_completed(slot).unwrap().is_some());
        assert!(db.mark_day_slot_completed(slot + 1).is_err());

        let slots = db.day_slots().unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].exercise_count, 1);
    }

    #[test]
    fn weight_notes_and_history() {
        let mut db = Database::open_memory().unwrap();
        let (squat, _) = squat_day(&db);

        db.update_weight(squat, 1, 82.5).unwrap();
        db.update_notes(squat, "belt on").unwrap();
        assert!(db.update_weight(squat, 5, 90.0).is_err());

        let exercise = db.exercise(squat).unwrap();
        assert_eq!(exercise.sets[0].weight_kg, 100.0);
        assert_eq!(exercise.sets[1].weight_kg, 82.5);
        assert_eq!(exercise.notes, "belt on");

        let now = Utc::now();
        for (offset, kg) in [(0, 80.0), (1, 82.5)] {
            db.append_history(&HistoryEntry {
                exercise_id: squat,
                series: 3,
                reps: 8,
                weight_kg: kg,
                recorded_at: now + Duration::days(offset),
            })
            .unwrap();
        }
        let history = db.history(squat).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].weight_kg, 82.5);
    }

    #[test]
    fn alarm_journal_replaces_and_clears() {
        let mut db = Database::open_memory().unwrap();
        let at = Utc::now();
        let alarm = |seq| JournaledAlarm {
            id: AlarmId::REST_TIMER,
            kind: TimerKind::Rest,
            fire_at: at,
            seq,
        };

        db.record(&alarm(1)).unwrap();
        db.record(&alarm(2)).unwrap();
        assert_eq!(db.pending().unwrap().len(), 1);
        assert_eq!(db.pending().unwrap()[0].seq, 2);

        db.clear(AlarmId::REST_TIMER, Some(1)).unwrap();
        assert_eq!(db.pending().unwrap().len(), 1);
        db.clear(AlarmId::REST_TIMER, Some(2)).unwrap();
        assert!(db.pending().unwrap().is_empty());

        db.record(&alarm(3)).unwrap();
        db.clear(AlarmId::REST_TIMER, None).unwrap();
        assert!(db.pending().unwrap().is_empty());
    }
}
