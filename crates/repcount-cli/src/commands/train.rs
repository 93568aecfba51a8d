//! Interactive training session on stdin.

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use repcount_core::alarm::{JournaledReceiver, SharedJournal};
use repcount_core::session::{Reply, Response, REST_MINUTES};
use repcount_core::{
    recover_alarms, Advance, AlarmDeliveryService, Clock, Command, Config, Database,
    JournaledScheduler, Outcome, Phase, SeriesOutcome, SessionEvent, SessionRunner,
    SessionSnapshot, SystemClock, TokioAlarmScheduler, TrainingSession, ValidationError,
};

use crate::alert::{ProcessWakeLock, TerminalAlert};

const HELP: &str = "\
commands:
  start          start the next series
  stop           stop the running series
  pause/resume   pause or resume the rest countdown
  restart        restart the rest countdown from full
  skip-rest      stop the rest countdown now
  confirm        finish the exercise after the last series
  cancel         keep going after the last series
  finish         finish the current exercise now
  weight <kg>    stage a new weight
  notes <text>   stage new notes
  rest <min>     rest minutes between series (1-99)
  ack            silence the rest alarm
  status         show the session
  end            end the workout";

#[derive(Debug, Clone, PartialEq)]
enum Input {
    Session(Command),
    Ack,
    Help,
    Empty,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let line = line.trim();
    let (word, arg) = match line.split_once(char::is_whitespace) {
        Some((word, arg)) => (word, arg.trim()),
        None => (line, ""),
    };

    let command = match word {
        "" => return Ok(Input::Empty),
        "help" | "?" => return Ok(Input::Help),
        "ack" => return Ok(Input::Ack),
        "start" => Command::StartSeries,
        "stop" => Command::StopSeries,
        "pause" => Command::PauseTimer,
        "resume" => Command::ResumeTimer,
        "restart" => Command::RestartTimer,
        "skip-rest" => Command::StopTimer,
        "confirm" => Command::ConfirmFinish,
        "cancel" => Command::CancelFinish,
        "finish" => Command::FinishExercise,
        "end" => Command::EndTraining,
        "status" => Command::Snapshot,
        "weight" => {
            let kg: f64 = arg
                .parse()
                .map_err(|_| format!("weight needs a number, got '{arg}'"))?;
            if !kg.is_finite() || kg < 0.0 {
                return Err(format!("weight must be zero or more, got {arg}"));
            }
            Command::SetWeight(kg)
        }
        "notes" => Command::SetNotes(arg.to_string()),
        "rest" => {
            let minutes: u32 = arg
                .parse()
                .map_err(|_| format!("rest needs whole minutes, got '{arg}'"))?;
            Command::SetRestMinutes(minutes)
        }
        other => return Err(format!("unknown command '{other}', type `help`")),
    };
    Ok(Input::Session(command))
}

fn format_clock(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Line to print for an event; `None` for events shown elsewhere.
fn describe(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::ExerciseLoaded {
            index,
            name,
            max_series,
            weight_kg,
            ..
        } => format!(
            "exercise {}: {name} ({max_series} series incl. warm-up) @ {weight_kg} kg",
            index + 1
        ),
        SessionEvent::SeriesStarted { series, .. } => format!("series {series} running"),
        SessionEvent::FinishConfirmationRequested { .. } => {
            "last series done: `confirm` to finish the exercise or `cancel`".to_string()
        }
        SessionEvent::RestStarted { duration_secs, .. } => {
            format!("rest {}", format_clock(*duration_secs))
        }
        SessionEvent::RestPaused { remaining_secs, .. } => {
            format!("rest paused at {}", format_clock(*remaining_secs))
        }
        SessionEvent::RestResumed { remaining_secs, .. } => {
            format!("rest resumed at {}", format_clock(*remaining_secs))
        }
        SessionEvent::RestStopped { .. } => "rest skipped".to_string(),
        SessionEvent::RestExpired { .. } => "rest over".to_string(),
        SessionEvent::RestMinutesChanged { minutes, .. } => format!("rest set to {minutes} min"),
        SessionEvent::ExerciseFinished {
            weight_committed,
            notes_committed,
            ..
        } => {
            let mut saved = Vec::new();
            if *weight_committed {
                saved.push("weight");
            }
            if *notes_committed {
                saved.push("notes");
            }
            if saved.is_empty() {
                "exercise finished".to_string()
            } else {
                format!("exercise finished, saved {}", saved.join(" and "))
            }
        }
        SessionEvent::StoreFailed { message, .. } => format!("could not save: {message}"),
        SessionEvent::TrainingEnded {
            completed_exercises,
            ..
        } => format!("workout over, {completed_exercises} exercises done"),
        SessionEvent::TrainingStarted { .. }
        | SessionEvent::SeriesCompleted { .. }
        | SessionEvent::RestTick { .. } => return None,
    };
    Some(line)
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::RestTick { remaining_secs, .. }) => {
                let mut out = std::io::stdout().lock();
                let _ = write!(out, "\r  rest {}  ", format_clock(remaining_secs));
                let _ = out.flush();
            }
            Ok(event) => {
                if let Some(line) = describe(&event) {
                    println!("\r{line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "event printer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_status(snapshot: &SessionSnapshot) {
    let name = snapshot.exercise_name.as_deref().unwrap_or("-");
    println!(
        "{:?}: exercise {}/{} {name}, series {}/{}, rest {} min ({}), weight {} kg",
        snapshot.phase,
        (snapshot.exercise_index + 1).min(snapshot.exercise_count),
        snapshot.exercise_count,
        snapshot.current_series,
        snapshot.max_series,
        snapshot.rest_minutes,
        format_clock(snapshot.remaining_secs),
        snapshot.pending_weight,
    );
}

fn report(command: &Command, response: &Response) {
    match &response.result {
        Ok(Reply::Outcome(Outcome::Ignored))
        | Ok(Reply::Series(SeriesOutcome::Ignored))
        | Ok(Reply::Advance(Advance::Ignored)) => {
            println!("not now ({:?})", response.snapshot.phase);
        }
        Ok(Reply::Snapshot) => print_status(&response.snapshot),
        Ok(_) => {
            if let Command::SetWeight(kg) = command {
                println!("weight {kg} kg staged");
            }
        }
        // The failure was already announced through the event stream.
        Err(e) => tracing::debug!(error = %e, "command finished with a store error"),
    }
}

pub async fn run(slot: i64, rest: Option<u32>) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let rest_minutes = rest.unwrap_or(config.session.rest_minutes);
    if !REST_MINUTES.contains(&rest_minutes) {
        return Err(ValidationError::OutOfRange {
            field: "rest".into(),
            value: i64::from(rest_minutes),
            min: i64::from(*REST_MINUTES.start()),
            max: i64::from(*REST_MINUTES.end()),
        }
        .into());
    }

    let db = Database::open()?;
    let plan = db.day_slot_plan(slot)?;
    if plan.exercises.is_empty() {
        return Err(
            ValidationError::EmptyCollection(format!("day slot {slot} has no exercises")).into(),
        );
    }

    let journal: SharedJournal = Arc::new(Mutex::new(Database::open()?));
    let runtime = tokio::runtime::Handle::current();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let delivery = Arc::new(AlarmDeliveryService::new(
        runtime.clone(),
        Arc::new(TerminalAlert::new(config.alert.sound.clone().map(PathBuf::from))),
        Arc::new(ProcessWakeLock::default()),
        config.delivery(),
    ));
    let receiver = Arc::new(JournaledReceiver::new(delivery.clone(), journal.clone()));
    let mut scheduler = JournaledScheduler::new(
        TokioAlarmScheduler::new(runtime, clock.clone(), receiver.clone()),
        journal.clone(),
    );

    let recovered = recover_alarms(
        &journal,
        &mut scheduler,
        receiver.as_ref(),
        clock.now(),
        chrono::Duration::hours(1),
    )?;
    if !recovered.is_empty() {
        tracing::info!(
            rearmed = recovered.rearmed_count,
            delivered = recovered.delivered_count,
            expired = recovered.expired_count,
            "replayed alarms from a previous run"
        );
    }

    let mut session = TrainingSession::new(plan, db, scheduler, clock);
    session.set_rest_minutes(rest_minutes);
    let printer = tokio::spawn(print_events(session.subscribe()));
    let (runner, handle) = SessionRunner::new(session, config.tick_interval());
    let runner = tokio::spawn(runner.run());

    println!("{HELP}\n");
    handle.send(Command::StartTraining).await?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_input(&line) {
            Ok(Input::Session(command)) => {
                let response = handle.send(command.clone()).await?;
                report(&command, &response);
                if response.snapshot.phase == Phase::Completed {
                    break;
                }
            }
            Ok(Input::Ack) => {
                if !delivery.acknowledge() {
                    println!("no alert to acknowledge");
                }
            }
            Ok(Input::Help) => println!("{HELP}"),
            Ok(Input::Empty) => {}
            Err(message) => println!("{message}"),
        }
    }

    // Closing stdin or Ctrl-C ends the workout so pending edits are saved.
    let ended = handle.send(Command::EndTraining).await?;
    if let Err(e) = ended.result {
        tracing::warn!(error = %e, "workout ended with unsaved changes");
    }
    drop(handle);
    let _session = runner.await?;
    delivery.acknowledge();
    printer.abort();
    Ok(())
}
