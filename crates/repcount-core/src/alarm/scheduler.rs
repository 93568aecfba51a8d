//! One-shot alarms that fire independently of the session's tick loop.
//!
//! The [`AlarmScheduler`] trait is the seam to the platform: a phone build
//! maps it onto an exact, wake-capable OS alarm. [`TokioAlarmScheduler`] is
//! the in-process backend used by the CLI; it runs on its own task, so the
//! alarm still fires when nobody is driving the session's countdown.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::AlarmError;

/// Upper bound for a single sleep while waiting for a wall-clock deadline.
///
/// The wait is re-derived from the clock after every slice, so a suspended
/// host that wakes past the deadline fires within one slice.
const WAIT_SLICE: std::time::Duration = std::time::Duration::from_secs(1);

/// Payload carried by a fired alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Rest period between two series.
    Rest,
}

impl TimerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TimerKind::Rest => "rest",
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rest" => Ok(TimerKind::Rest),
            other => Err(format!("unknown timer kind: {other}")),
        }
    }
}

/// Logical alarm slot. Arming an id that is already armed replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AlarmId(pub i64);

impl AlarmId {
    /// The single rest-timer alarm of a training session.
    pub const REST_TIMER: AlarmId = AlarmId(1);
}

/// Opaque handle for one arming of an [`AlarmId`].
///
/// A token from a superseded arming no longer cancels anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlarmToken {
    pub id: AlarmId,
    pub seq: u64,
}

/// Platform alarm backend.
pub trait AlarmScheduler: Send {
    /// Schedule `kind` to fire at `fire_at`, replacing any alarm armed
    /// under the same `id`.
    fn arm(
        &mut self,
        id: AlarmId,
        kind: TimerKind,
        fire_at: DateTime<Utc>,
    ) -> Result<AlarmToken, AlarmError>;

    /// Cancel the arming identified by `token`. Unknown, fired or
    /// superseded tokens are a no-op.
    fn cancel(&mut self, token: AlarmToken);
}

/// Entry point invoked when an alarm fires.
pub trait AlarmReceiver: Send + Sync {
    fn on_alarm(&self, id: AlarmId, kind: TimerKind);
}

impl<T: AlarmScheduler + ?Sized> AlarmScheduler for Box<T> {
    fn arm(
        &mut self,
        id: AlarmId,
        kind: TimerKind,
        fire_at: DateTime<Utc>,
    ) -> Result<AlarmToken, AlarmError> {
        (**self).arm(id, kind, fire_at)
    }

    fn cancel(&mut self, token: AlarmToken) {
        (**self).cancel(token)
    }
}

struct Armed {
    token: AlarmToken,
    task: JoinHandle<()>,
}

/// Alarm backend running one tokio task per armed alarm.
pub struct TokioAlarmScheduler {
    handle: Handle,
    clock: Arc<dyn Clock>,
    receiver: Arc<dyn AlarmReceiver>,
    armed: HashMap<AlarmId, Armed>,
    next_seq: u64,
}

impl TokioAlarmScheduler {
    pub fn new(handle: Handle, clock: Arc<dyn Clock>, receiver: Arc<dyn AlarmReceiver>) -> Self {
        Self {
            handle,
            clock,
            receiver,
            armed: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Number of alarms currently waiting to fire.
    pub fn pending(&self) -> usize {
        self.armed.values().filter(|a| !a.task.is_finished()).count()
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn arm(
        &mut self,
        id: AlarmId,
        kind: TimerKind,
        fire_at: DateTime<Utc>,
    ) -> Result<AlarmToken, AlarmError> {
        if let Some(previous) = self.armed.remove(&id) {
            previous.task.abort();
        }

        self.next_seq += 1;
        let token = AlarmToken {
            id,
            seq: self.next_seq,
        };
        let clock = Arc::clone(&self.clock);
        let receiver = Arc::clone(&self.receiver);
        let task = self.handle.spawn(async move {
            loop {
                let left = fire_at - clock.now();
                let Ok(left) = left.to_std() else { break };
                if left.is_zero() {
                    break;
                }
                tokio::time::sleep(left.min(WAIT_SLICE)).await;
            }
            tracing::debug!(alarm = id.0, %kind, "alarm fired");
            receiver.on_alarm(id, kind);
        });

        tracing::debug!(alarm = id.0, seq = token.seq, %fire_at, "alarm armed");
        self.armed.insert(id, Armed { token, task });
        Ok(token)
    }

    fn cancel(&mut self, token: AlarmToken) {
        let matches = self
            .armed
            .get(&token.id)
            .is_some_and(|armed| armed.token == token);
        if matches {
            if let Some(armed) = self.armed.remove(&token.id) {
                armed.task.abort();
                tracing::debug!(alarm = token.id.0, seq = token.seq, "alarm cancelled");
            }
        }
    }
}

impl Drop for TokioAlarmScheduler {
    fn drop(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MonotonicClock;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Fired(Mutex<Vec<(AlarmId, TimerKind)>>);

    impl AlarmReceiver for Fired {
        fn on_alarm(&self, id: AlarmId, kind: TimerKind) {
            self.0.lock().unwrap().push((id, kind));
        }
    }

    fn scheduler() -> (TokioAlarmScheduler, Arc<MonotonicClock>, Arc<Fired>) {
        let clock = Arc::new(MonotonicClock::new());
        let fired = Arc::new(Fired::default());
        let scheduler = TokioAlarmScheduler::new(Handle::current(), clock.clone(), fired.clone());
        (scheduler, clock, fired)
    }

    fn in_secs(clock: &MonotonicClock, secs: i64) -> DateTime<Utc> {
        clock.now() + chrono::Duration::seconds(secs)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_deadline() {
        let (mut scheduler, clock, fired) = scheduler();
        scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, in_secs(&clock, 5))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert!(fired.0.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            *fired.0.lock().unwrap(),
            vec![(AlarmId::REST_TIMER, TimerKind::Rest)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_previous_alarm() {
        let (mut scheduler, clock, fired) = scheduler();
        scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, in_secs(&clock, 2))
            .unwrap();
        scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, in_secs(&clock, 10))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(fired.0.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fired.0.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_ignores_stale_tokens() {
        let (mut scheduler, clock, fired) = scheduler();
        let stale = scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, in_secs(&clock, 2))
            .unwrap();
        let current = scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, in_secs(&clock, 3))
            .unwrap();

        scheduler.cancel(stale);
        assert_eq!(scheduler.pending(), 1);

        scheduler.cancel(current);
        scheduler.cancel(current);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fired.0.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_fires_immediately() {
        let (mut scheduler, clock, fired) = scheduler();
        scheduler
            .arm(AlarmId::REST_TIMER, TimerKind::Rest, in_secs(&clock, -30))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fired.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn timer_kind_roundtrips_through_str() {
        assert_eq!("rest".parse::<TimerKind>().unwrap(), TimerKind::Rest);
        assert!("focus".parse::<TimerKind>().is_err());
    }
}
