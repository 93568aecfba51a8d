//! Crash-safe record of armed alarms.
//!
//! An in-process scheduler dies with its process. [`JournaledScheduler`]
//! writes every arming to an [`AlarmJournal`] before returning, and
//! [`JournaledReceiver`] clears the entry once the alarm has fired. On the
//! next start [`recover_alarms`] replays whatever is left: future alarms are
//! re-armed, alarms that came due while the process was gone are delivered
//! immediately, and very old ones are dropped.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::scheduler::{AlarmId, AlarmReceiver, AlarmScheduler, AlarmToken, TimerKind};
use crate::error::{AlarmError, StoreError};

/// One journaled arming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournaledAlarm {
    pub id: AlarmId,
    pub kind: TimerKind,
    pub fire_at: DateTime<Utc>,
    pub seq: u64,
}

/// Durable storage for armed alarms, keyed by [`AlarmId`].
pub trait AlarmJournal: Send {
    /// Insert or replace the entry for `alarm.id`.
    fn record(&mut self, alarm: &JournaledAlarm) -> Result<(), StoreError>;
    /// Remove the entry for `id`; with `seq`, only if it still matches.
    fn clear(&mut self, id: AlarmId, seq: Option<u64>) -> Result<(), StoreError>;
    fn pending(&self) -> Result<Vec<JournaledAlarm>, StoreError>;
}

pub type SharedJournal = Arc<Mutex<dyn AlarmJournal>>;

fn with_journal<T>(
    journal: &SharedJournal,
    f: impl FnOnce(&mut dyn AlarmJournal) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut guard = journal.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut *guard)
}

/// Scheduler decorator that journals every arming.
pub struct JournaledScheduler<S> {
    inner: S,
    journal: SharedJournal,
}

impl<S: AlarmScheduler> JournaledScheduler<S> {
    pub fn new(inner: S, journal: SharedJournal) -> Self {
        Self { inner, journal }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: AlarmScheduler> AlarmScheduler for JournaledScheduler<S> {
    fn arm(
        &mut self,
        id: AlarmId,
        kind: TimerKind,
        fire_at: DateTime<Utc>,
    ) -> Result<AlarmToken, AlarmError> {
        let token = self.inner.arm(id, kind, fire_at)?;
        let entry = JournaledAlarm {
            id,
            kind,
            fire_at,
            seq: token.seq,
        };
        if let Err(e) = with_journal(&self.journal, |j| j.record(&entry)) {
            tracing::warn!(error = %e, alarm = id.0, "failed to journal armed alarm");
        }
        Ok(token)
    }

    fn cancel(&mut self, token: AlarmToken) {
        self.inner.cancel(token);
        if let Err(e) = with_journal(&self.journal, |j| j.clear(token.id, Some(token.seq))) {
            tracing::warn!(error = %e, alarm = token.id.0, "failed to clear journaled alarm");
        }
    }
}

/// Receiver decorator that clears the journal entry of a fired alarm.
pub struct JournaledReceiver<R: ?Sized> {
    journal: SharedJournal,
    inner: Arc<R>,
}

impl<R: AlarmReceiver + ?Sized> JournaledReceiver<R> {
    pub fn new(inner: Arc<R>, journal: SharedJournal) -> Self {
        Self { journal, inner }
    }
}

impl<R: AlarmReceiver + ?Sized> AlarmReceiver for JournaledReceiver<R> {
    fn on_alarm(&self, id: AlarmId, kind: TimerKind) {
        if let Err(e) = with_journal(&self.journal, |j| j.clear(id, None)) {
            tracing::warn!(error = %e, alarm = id.0, "failed to clear fired alarm");
        }
        self.inner.on_alarm(id, kind);
    }
}

/// What happened to one journal entry during recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Deadline still ahead; armed again.
    Rearmed { id: AlarmId, fire_at: DateTime<Utc> },
    /// Came due while the process was gone; delivered now.
    Delivered {
        id: AlarmId,
        overdue_secs: i64,
    },
    /// Older than the staleness window; dropped.
    Expired {
        id: AlarmId,
        overdue_secs: i64,
    },
    /// Re-arming failed.
    Failed { id: AlarmId, error: String },
}

/// Summary of a recovery pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub total_entries: usize,
    pub rearmed_count: usize,
    pub delivered_count: usize,
    pub expired_count: usize,
    pub failed_count: usize,
    pub actions: Vec<RecoveryAction>,
}

impl RecoveryReport {
    pub fn is_empty(&self) -> bool {
        self.total_entries == 0
    }
}

/// Replay journaled alarms after a restart.
///
/// `scheduler` should be the journaled scheduler so re-armed alarms stay
/// journaled; `receiver` is the delivery entry point.
pub fn recover_alarms(
    journal: &SharedJournal,
    scheduler: &mut dyn AlarmScheduler,
    receiver: &dyn AlarmReceiver,
    now: DateTime<Utc>,
    staleness: Duration,
) -> Result<RecoveryReport, StoreError> {
    let pending = with_journal(journal, |j| j.pending())?;
    let mut report = RecoveryReport {
        total_entries: pending.len(),
        ..RecoveryReport::default()
    };

    for alarm in pending {
        if alarm.fire_at > now {
            match scheduler.arm(alarm.id, alarm.kind, alarm.fire_at) {
                Ok(_) => {
                    report.rearmed_count += 1;
                    report.actions.push(RecoveryAction::Rearmed {
                        id: alarm.id,
                        fire_at: alarm.fire_at,
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, alarm = alarm.id.0, "failed to re-arm alarm");
                    report.failed_count += 1;
                    report.actions.push(RecoveryAction::Failed {
                        id: alarm.id,
                        error: e.to_string(),
                    });
                }
            }
            continue;
        }

        let overdue = now - alarm.fire_at;
        with_journal(journal, |j| j.clear(alarm.id, Some(alarm.seq)))?;
        if overdue <= staleness {
            tracing::info!(
                alarm = alarm.id.0,
                overdue_secs = overdue.num_seconds(),
                "delivering alarm missed while not running"
            );
            receiver.on_alarm(alarm.id, alarm.kind);
            report.delivered_count += 1;
            report.actions.push(RecoveryAction::Delivered {
                id: alarm.id,
                overdue_secs: overdue.num_seconds(),
            });
        } else {
            report.expired_count += 1;
            report.actions.push(RecoveryAction::Expired {
                id: alarm.id,
                overdue_secs: overdue.num_seconds(),
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MapJournal(BTreeMap<AlarmId, JournaledAlarm>);

    impl AlarmJournal for MapJournal {
        fn record(&mut self, alarm: &JournaledAlarm) -> Result<(), StoreError> {
            self.0.insert(alarm.id, alarm.clone());
            Ok(())
        }
        fn clear(&mut self, id: AlarmId, seq: Option<u64>) -> Result<(), StoreError> {
            if seq.is_none() || self.0.get(&id).map(|a| a.seq) == seq {
                self.0.remove(&id);
            }
            Ok(())
        }
        fn pending(&self) -> Result<Vec<JournaledAlarm>, StoreError> {
            Ok(self.0.values().cloned().collect())
        }
    }

    #[derive(Default)]
    struct CountingScheduler {
        seq: u64,
        armed: Vec<(AlarmId, DateTime<Utc>)>,
        cancelled: Vec<AlarmToken>,
    }

    impl AlarmScheduler for CountingScheduler {
        fn arm(
            &mut self,
            id: AlarmId,
            _kind: TimerKind,
            fire_at: DateTime<Utc>,
        ) -> Result<AlarmToken, AlarmError> {
            self.seq += 1;
            self.armed.push((id, fire_at));
            Ok(AlarmToken { id, seq: self.seq })
        }
        fn cancel(&mut self, token: AlarmToken) {
            self.cancelled.push(token);
        }
    }

    #[derive(Default)]
    struct Delivered(Mutex<Vec<AlarmId>>);

    impl AlarmReceiver for Delivered {
        fn on_alarm(&self, id: AlarmId, _kind: TimerKind) {
            self.0.lock().unwrap().push(id);
        }
    }

    fn journal() -> (Arc<Mutex<MapJournal>>, SharedJournal) {
        let concrete = Arc::new(Mutex::new(MapJournal::default()));
        let shared: SharedJournal = concrete.clone();
        (concrete, shared)
    }

    #[test]
    fn arming_and_cancelling_updates_journal() {
        let (concrete, shared) = journal();
        let mut scheduler = JournaledScheduler::new(CountingScheduler::default(), shared);
        let fire_at = Utc::now() + Duration::minutes(2);

        let first = scheduler.arm(AlarmId::REST_TIMER, TimerKind::Rest, fire_at).unwrap();
        let second = scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, fire_at + Duration::seconds(30))
            .unwrap();
        assert_eq!(concrete.lock().unwrap().0.len(), 1);

        // The superseded token must not clear the newer entry.
        scheduler.cancel(first);
        assert_eq!(concrete.lock().unwrap().0.len(), 1);

        scheduler.cancel(second);
        assert!(concrete.lock().unwrap().0.is_empty());
        assert_eq!(scheduler.inner().cancelled.len(), 2);
    }

    #[test]
    fn fired_alarm_is_cleared_before_delivery() {
        let (concrete, shared) = journal();
        concrete
            .lock()
            .unwrap()
            .record(&JournaledAlarm {
                id: AlarmId::REST_TIMER,
                kind: TimerKind::Rest,
                fire_at: Utc::now(),
                seq: 4,
            })
            .unwrap();

        let delivered = Arc::new(Delivered::default());
        let receiver = JournaledReceiver::new(delivered.clone(), shared);
        receiver.on_alarm(AlarmId::REST_TIMER, TimerKind::Rest);

        assert!(concrete.lock().unwrap().0.is_empty());
        assert_eq!(*delivered.0.lock().unwrap(), vec![AlarmId::REST_TIMER]);
    }

    #[test]
    fn recovery_classifies_entries_by_deadline() {
        let (concrete, shared) = journal();
        let now = Utc::now();
        {
            let mut j = concrete.lock().unwrap();
            for (id, offset) in [(1, 90), (2, -45), (3, -7_200)] {
                j.record(&JournaledAlarm {
                    id: AlarmId(id),
                    kind: TimerKind::Rest,
                    fire_at: now + Duration::seconds(offset),
                    seq: 1,
                })
                .unwrap();
            }
        }

        let mut scheduler = CountingScheduler::default();
        let delivered = Delivered::default();
        let report = recover_alarms(&shared, &mut scheduler, &delivered, now, Duration::hours(1))
            .unwrap();

        assert_eq!(report.total_entries, 3);
        assert_eq!(report.rearmed_count, 1);
        assert_eq!(report.delivered_count, 1);
        assert_eq!(report.expired_count, 1);
        assert_eq!(scheduler.armed, vec![(AlarmId(1), now + Duration::seconds(90))]);
        assert_eq!(*delivered.0.lock().unwrap(), vec![AlarmId(2)]);

        // Overdue entries are gone; the re-armed one was not journaled again
        // because the plain scheduler does not journal.
        let left: Vec<_> = concrete.lock().unwrap().0.keys().copied().collect();
        assert_eq!(left, vec![AlarmId(1)]);
    }
}
