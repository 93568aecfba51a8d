//! Rest period: the in-process countdown and its OS alarm as one value.
//!
//! Every operation that moves the countdown also moves the alarm, so the
//! two can never disagree about the deadline. An alarm that cannot be armed
//! is logged and the countdown keeps running without it.

use chrono::{DateTime, Utc};

use super::countdown::{TimerState, WallClockTimer};
use crate::alarm::{AlarmId, AlarmScheduler, AlarmToken, TimerKind};

#[derive(Debug, Default)]
pub struct RestPeriod {
    timer: WallClockTimer,
    alarm: Option<AlarmToken>,
}

impl RestPeriod {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> TimerState {
        self.timer.state()
    }

    pub fn generation(&self) -> u64 {
        self.timer.generation()
    }

    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        self.timer.remaining_secs(now)
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.timer.deadline()
    }

    /// Whether an alarm token is currently held.
    pub fn alarm_armed(&self) -> bool {
        self.alarm.is_some()
    }

    /// Start a fresh countdown and arm the alarm for its deadline.
    ///
    /// Any previous countdown and alarm are replaced. Returns the timer
    /// generation.
    pub fn arm<A: AlarmScheduler + ?Sized>(
        &mut self,
        duration_secs: u64,
        now: DateTime<Utc>,
        alarms: &mut A,
    ) -> u64 {
        self.release_alarm(alarms);
        let generation = self.timer.start(duration_secs, now);
        self.arm_alarm(alarms);
        generation
    }

    /// Freeze the countdown and withdraw its alarm.
    pub fn pause<A: AlarmScheduler + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        alarms: &mut A,
    ) -> Option<u64> {
        let remaining = self.timer.pause(now)?;
        self.release_alarm(alarms);
        Some(remaining)
    }

    /// Resume with a new deadline and re-arm the alarm for it.
    pub fn resume<A: AlarmScheduler + ?Sized>(
        &mut self,
        now: DateTime<Utc>,
        alarms: &mut A,
    ) -> Option<u64> {
        let generation = self.timer.resume(now)?;
        self.arm_alarm(alarms);
        Some(generation)
    }

    /// Clear the countdown and cancel the alarm. No expiry is signalled.
    ///
    /// Also drops the alarm token left over from a natural expiry.
    pub fn cancel<A: AlarmScheduler + ?Sized>(&mut self, alarms: &mut A) -> bool {
        let was_active = self.timer.stop();
        self.release_alarm(alarms);
        was_active
    }

    /// Re-derive the countdown. Returns `true` once, on natural expiry.
    ///
    /// The alarm is left armed on expiry: it is the channel that raises the
    /// alert, and it fires on its own at the same deadline.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        self.timer.poll(now)
    }

    fn arm_alarm<A: AlarmScheduler + ?Sized>(&mut self, alarms: &mut A) {
        let Some(deadline) = self.timer.deadline() else {
            return;
        };
        match alarms.arm(AlarmId::REST_TIMER, TimerKind::Rest, deadline) {
            Ok(token) => self.alarm = Some(token),
            Err(e) => {
                tracing::warn!(error = %e, "rest alarm not armed, relying on in-process countdown");
                self.alarm = None;
            }
        }
    }

    fn release_alarm<A: AlarmScheduler + ?Sized>(&mut self, alarms: &mut A) {
        if let Some(token) = self.alarm.take() {
            alarms.cancel(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlarmError;
    use chrono::Duration;

    #[derive(Default)]
    struct Alarms {
        seq: u64,
        live: Option<AlarmToken>,
        armed_at: Vec<DateTime<Utc>>,
        cancelled: Vec<AlarmToken>,
        deny: bool,
    }

    impl AlarmScheduler for Alarms {
        fn arm(
            &mut self,
            id: AlarmId,
            _kind: TimerKind,
            fire_at: DateTime<Utc>,
        ) -> Result<AlarmToken, AlarmError> {
            if self.deny {
                return Err(AlarmError::PermissionDenied);
            }
            self.seq += 1;
            let token = AlarmToken { id, seq: self.seq };
            self.live = Some(token);
            self.armed_at.push(fire_at);
            Ok(token)
        }

        fn cancel(&mut self, token: AlarmToken) {
            if self.live == Some(token) {
                self.live = None;
            }
            self.cancelled.push(token);
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn arm_pairs_timer_and_alarm() {
        let mut alarms = Alarms::default();
        let mut rest = RestPeriod::new();

        rest.arm(120, t0(), &mut alarms);
        assert_eq!(rest.state(), TimerState::Running);
        assert_eq!(alarms.armed_at, vec![t0() + Duration::seconds(120)]);
        assert!(alarms.live.is_some());
    }

    #[test]
    fn rearm_cancels_previous_alarm_once() {
        let mut alarms = Alarms::default();
        let mut rest = RestPeriod::new();

        rest.arm(120, t0(), &mut alarms);
        let first = alarms.live.unwrap();
        rest.arm(120, t0() + Duration::seconds(10), &mut alarms);

        assert_eq!(alarms.cancelled, vec![first]);
        assert_eq!(alarms.armed_at.len(), 2);
    }

    #[test]
    fn pause_withdraws_and_resume_rearms() {
        let mut alarms = Alarms::default();
        let mut rest = RestPeriod::new();

        rest.arm(60, t0(), &mut alarms);
        assert_eq!(rest.pause(t0() + Duration::seconds(15), &mut alarms), Some(45));
        assert!(alarms.live.is_none());

        let later = t0() + Duration::seconds(300);
        rest.resume(later, &mut alarms).unwrap();
        assert_eq!(alarms.armed_at.last(), Some(&(later + Duration::seconds(45))));
        assert!(alarms.live.is_some());
    }

    #[test]
    fn cancel_stops_both() {
        let mut alarms = Alarms::default();
        let mut rest = RestPeriod::new();

        rest.arm(60, t0(), &mut alarms);
        assert!(rest.cancel(&mut alarms));
        assert_eq!(rest.state(), TimerState::Idle);
        assert!(alarms.live.is_none());
        assert!(!rest.alarm_armed());

        // Second cancel has nothing left to cancel.
        assert!(!rest.cancel(&mut alarms));
        assert_eq!(alarms.cancelled.len(), 1);
    }

    #[test]
    fn expiry_keeps_alarm_until_released() {
        let mut alarms = Alarms::default();
        let mut rest = RestPeriod::new();

        rest.arm(1, t0(), &mut alarms);
        assert!(rest.poll(t0() + Duration::seconds(1)));
        assert!(rest.alarm_armed());

        rest.cancel(&mut alarms);
        assert!(!rest.alarm_armed());
    }

    #[test]
    fn denied_alarm_still_counts_down() {
        let mut alarms = Alarms {
            deny: true,
            ..Alarms::default()
        };
        let mut rest = RestPeriod::new();

        rest.arm(5, t0(), &mut alarms);
        assert_eq!(rest.state(), TimerState::Running);
        assert!(!rest.alarm_armed());
        assert!(rest.poll(t0() + Duration::seconds(5)));
    }
}
