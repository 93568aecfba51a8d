use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Subcommand;
use tokio::io::{AsyncBufReadExt, BufReader};

use repcount_core::alarm::{JournaledReceiver, SharedJournal};
use repcount_core::{
    recover_alarms, AlarmDeliveryService, AlarmJournal, Clock, Config, Database,
    JournaledScheduler, SystemClock, TokioAlarmScheduler,
};

use crate::alert::{ProcessWakeLock, TerminalAlert};

#[derive(Subcommand)]
pub enum AlarmsAction {
    /// List journaled alarms
    List,
    /// Replay alarms left armed by a previous run
    Recover {
        /// Overdue alarms older than this are dropped instead of delivered
        #[arg(long, default_value_t = 60)]
        staleness_minutes: i64,
    },
}

pub async fn run(action: AlarmsAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AlarmsAction::List => {
            let db = Database::open()?;
            println!("{}", serde_json::to_string_pretty(&db.pending()?)?);
        }
        AlarmsAction::Recover { staleness_minutes } => recover(staleness_minutes).await?,
    }
    Ok(())
}

async fn recover(staleness_minutes: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let journal: SharedJournal = Arc::new(Mutex::new(Database::open()?));
    let handle = tokio::runtime::Handle::current();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let delivery = Arc::new(AlarmDeliveryService::new(
        handle.clone(),
        Arc::new(TerminalAlert::new(config.alert.sound.clone().map(PathBuf::from))),
        Arc::new(ProcessWakeLock::default()),
        config.delivery(),
    ));
    let receiver = Arc::new(JournaledReceiver::new(delivery.clone(), journal.clone()));
    let mut scheduler = JournaledScheduler::new(
        TokioAlarmScheduler::new(handle, clock.clone(), receiver.clone()),
        journal.clone(),
    );

    let report = recover_alarms(
        &journal,
        &mut scheduler,
        receiver.as_ref(),
        clock.now(),
        chrono::Duration::minutes(staleness_minutes.max(0)),
    )?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if delivery.active_kind().is_some() {
        println!("press Enter to acknowledge");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        tokio::select! {
            _ = lines.next_line() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
        delivery.acknowledge();
    }
    Ok(())
}
