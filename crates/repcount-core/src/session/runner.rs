//! Actor that owns a [`TrainingSession`] and feeds it commands and ticks.
//!
//! Commands arrive over an mpsc channel and are answered on a oneshot.
//! While a rest countdown is running the runner keeps a ticker task alive
//! that tags every tick with the countdown's generation; the ticker is
//! replaced whenever the generation changes and aborted when the countdown
//! stops, so superseded ticks never reach the session.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{Advance, Outcome, SeriesOutcome, SessionSnapshot, TrainingSession};
use crate::alarm::AlarmScheduler;
use crate::error::StoreError;
use crate::store::WorkoutStore;
use crate::timer::TimerState;

const COMMAND_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartTraining,
    StartSeries,
    StopSeries,
    CancelFinish,
    PauseTimer,
    ResumeTimer,
    RestartTimer,
    StopTimer,
    ConfirmFinish,
    FinishExercise,
    EndTraining,
    SetWeight(f64),
    SetNotes(String),
    SetRestMinutes(u32),
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Started(bool),
    Outcome(Outcome),
    Series(SeriesOutcome),
    Advance(Advance),
    Ended(bool),
    Snapshot,
}

/// Answer to a [`Command`], with the session state after it was applied.
#[derive(Debug)]
pub struct Response {
    pub result: Result<Reply, StoreError>,
    pub snapshot: SessionSnapshot,
}

#[derive(Debug, Error)]
#[error("session runner has stopped")]
pub struct RunnerStopped;

type Envelope = (Command, oneshot::Sender<Response>);

/// Cloneable sending side of a [`SessionRunner`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Envelope>,
}

impl SessionHandle {
    pub async fn send(&self, command: Command) -> Result<Response, RunnerStopped> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .await
            .map_err(|_| RunnerStopped)?;
        reply_rx.await.map_err(|_| RunnerStopped)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, RunnerStopped> {
        Ok(self.send(Command::Snapshot).await?.snapshot)
    }
}

struct Ticker {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct SessionRunner<S, A> {
    session: TrainingSession<S, A>,
    commands: mpsc::Receiver<Envelope>,
    tick_tx: mpsc::UnboundedSender<u64>,
    ticks: mpsc::UnboundedReceiver<u64>,
    tick_interval: Duration,
    ticker: Option<Ticker>,
}

impl<S, A> SessionRunner<S, A>
where
    S: WorkoutStore + 'static,
    A: AlarmScheduler + 'static,
{
    pub fn new(session: TrainingSession<S, A>, tick_interval: Duration) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (tick_tx, ticks) = mpsc::unbounded_channel();
        let runner = Self {
            session,
            commands,
            tick_tx,
            ticks,
            tick_interval: tick_interval.max(Duration::from_millis(1)),
            ticker: None,
        };
        (runner, SessionHandle { tx })
    }

    /// Process commands until every [`SessionHandle`] is dropped, then hand
    /// the session back.
    pub async fn run(mut self) -> TrainingSession<S, A> {
        loop {
            tokio::select! {
                envelope = self.commands.recv() => match envelope {
                    Some((command, reply)) => {
                        let response = self.apply(command);
                        self.sync_ticker();
                        // Caller may have stopped waiting.
                        let _ = reply.send(response);
                    }
                    None => break,
                },
                Some(generation) = self.ticks.recv() => {
                    self.session.tick(generation);
                    self.sync_ticker();
                }
            }
        }
        self.ticker = None;
        tracing::debug!("session runner stopped");
        self.session
    }

    fn apply(&mut self, command: Command) -> Response {
        tracing::debug!(?command, "session command");
        let session = &mut self.session;
        let result = match command {
            Command::StartTraining => session.start_training().map(Reply::Started),
            Command::StartSeries => Ok(Reply::Outcome(session.start_series())),
            Command::StopSeries => Ok(Reply::Series(session.stop_series())),
            Command::CancelFinish => Ok(Reply::Outcome(session.cancel_finish())),
            Command::PauseTimer => Ok(Reply::Outcome(session.pause_timer())),
            Command::ResumeTimer => Ok(Reply::Outcome(session.resume_timer())),
            Command::RestartTimer => Ok(Reply::Outcome(session.restart_timer())),
            Command::StopTimer => Ok(Reply::Outcome(session.stop_timer_manually())),
            Command::ConfirmFinish => session.confirm_finish_exercise().map(Reply::Advance),
            Command::FinishExercise => session.finish_exercise_manually().map(Reply::Advance),
            Command::EndTraining => session.end_training().map(Reply::Ended),
            Command::SetWeight(kg) => Ok(Reply::Outcome(session.set_pending_weight(kg))),
            Command::SetNotes(notes) => Ok(Reply::Outcome(session.set_pending_notes(notes))),
            Command::SetRestMinutes(m) => Ok(Reply::Outcome(session.set_rest_minutes(m))),
            Command::Snapshot => Ok(Reply::Snapshot),
        };
        Response {
            result,
            snapshot: session.snapshot(),
        }
    }

    /// Keep exactly one ticker alive for the running countdown, if any.
    fn sync_ticker(&mut self) {
        let wanted = (self.session.rest_state() == TimerState::Running)
            .then(|| self.session.rest_generation());

        let current = self.ticker.as_ref().map(|t| t.generation);
        if current == wanted {
            return;
        }
        self.ticker = wanted.map(|generation| self.spawn_ticker(generation));
    }

    fn spawn_ticker(&self, generation: u64) -> Ticker {
        let tx = self.tick_tx.clone();
        let period = self.tick_interval;
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(generation).is_err() {
                    break;
                }
            }
        });
        tracing::trace!(generation, "ticker started");
        Ticker { generation, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmId, AlarmToken, TimerKind};
    use crate::clock::MonotonicClock;
    use crate::error::AlarmError;
    use crate::events::SessionEvent;
    use crate::session::{Exercise, ExerciseRef, Phase, SessionPlan, SetVariant};
    use crate::store::MemoryStore;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;
    use tokio::sync::broadcast;

    struct NoAlarms;

    impl AlarmScheduler for NoAlarms {
        fn arm(
            &mut self,
            _id: AlarmId,
            _kind: TimerKind,
            _fire_at: DateTime<Utc>,
        ) -> Result<AlarmToken, AlarmError> {
            Err(AlarmError::Unavailable("tests".into()))
        }
        fn cancel(&mut self, _token: AlarmToken) {}
    }

    fn spawn() -> (
        SessionHandle,
        broadcast::Receiver<SessionEvent>,
        JoinHandle<TrainingSession<MemoryStore, NoAlarms>>,
    ) {
        let exercise = Exercise {
            id: 1,
            name: "Squat".into(),
            muscle_group: "legs".into(),
            sets: vec![SetVariant {
                series: 3,
                reps: 5,
                weight_kg: 100.0,
            }],
            notes: String::new(),
            image: None,
        };
        let plan = SessionPlan {
            day_slot_id: 1,
            exercises: vec![ExerciseRef {
                exercise_id: 1,
                set_index: 0,
            }],
        };
        let clock = Arc::new(MonotonicClock::new());
        let mut session = TrainingSession::new(
            plan,
            MemoryStore::with_exercises([exercise]),
            NoAlarms,
            clock,
        );
        session.set_rest_minutes(1);
        let events = session.subscribe();
        let (runner, handle) = SessionRunner::new(session, Duration::from_millis(100));
        (handle, events, tokio::spawn(runner.run()))
    }

    fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    async fn into_rest(handle: &SessionHandle) {
        handle.send(Command::StartTraining).await.unwrap();
        handle.send(Command::StartSeries).await.unwrap();
        let response = handle.send(Command::StopSeries).await.unwrap();
        assert_eq!(
            response.result.unwrap(),
            Reply::Series(SeriesOutcome::Continue)
        );
        assert_eq!(response.snapshot.phase, Phase::RestPending);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_every_second_then_expires() {
        let (handle, mut events, task) = spawn();
        into_rest(&handle).await;

        tokio::time::sleep(Duration::from_millis(61_000)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.phase, Phase::RestExpired);
        assert!(snapshot.start_series_enabled);

        let events = drain(&mut events);
        let ticks: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::RestTick { remaining_secs, .. } => Some(*remaining_secs),
                _ => None,
            })
            .collect();
        assert_eq!(ticks.first(), Some(&59));
        assert_eq!(ticks.last(), Some(&1));
        assert!(ticks.windows(2).all(|w| w[0] > w[1]));
        let expired = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::RestExpired { .. }))
            .count();
        assert_eq!(expired, 1);

        drop(handle);
        let session = task.await.unwrap();
        assert_eq!(session.phase(), Phase::RestExpired);
    }

    #[tokio::test(start_paused = true)]
    async fn paused_countdown_stops_ticking() {
        let (handle, mut events, _task) = spawn();
        into_rest(&handle).await;

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        let paused = handle.send(Command::PauseTimer).await.unwrap();
        assert_eq!(paused.snapshot.remaining_secs, 50);
        drain(&mut events);

        tokio::time::sleep(Duration::from_millis(120_000)).await;
        assert!(drain(&mut events).is_empty());

        let resumed = handle.send(Command::ResumeTimer).await.unwrap();
        assert_eq!(resumed.snapshot.phase, Phase::RestPending);
        assert_eq!(resumed.snapshot.remaining_secs, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_runner_rejects_commands() {
        let (handle, _events, task) = spawn();
        task.abort();
        let _ = task.await;
        assert!(handle.send(Command::Snapshot).await.is_err());
    }
}
