//! Out-of-band rest alarms: scheduling, delivery and crash recovery.

mod delivery;
mod journal;
mod scheduler;

pub use delivery::{AlarmDeliveryService, AlertSink, DeliveryConfig, DeliveryStatus, WakeLock};
pub use journal::{
    recover_alarms, AlarmJournal, JournaledAlarm, JournaledReceiver, JournaledScheduler,
    RecoveryAction, RecoveryReport, SharedJournal,
};
pub use scheduler::{
    AlarmId, AlarmReceiver, AlarmScheduler, AlarmToken, TimerKind, TokioAlarmScheduler,
};
