use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod alert;
mod commands;

#[derive(Parser)]
#[command(name = "repcount", version, about = "Strength training session companion")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive training session for a day-slot
    Train {
        /// Day-slot id (see `repcount seed`)
        slot: i64,
        /// Rest minutes between series (1-99), overrides the config
        #[arg(long)]
        rest: Option<u32>,
    },
    /// Weight history of an exercise
    History {
        exercise: i64,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
    /// Armed alarm journal
    Alarms {
        #[command(subcommand)]
        action: commands::alarms::AlarmsAction,
    },
    /// Insert a sample day-slot to try a session with
    Seed,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("REPCOUNT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Train { slot, rest } => commands::train::run(slot, rest).await,
        Commands::History { exercise, json } => commands::history::run(exercise, json),
        Commands::Config { action } => commands::config::run(action),
        Commands::Alarms { action } => commands::alarms::run(action).await,
        Commands::Seed => commands::seed::run(),
    };

    // A pending stdin read blocks runtime shutdown, so exit explicitly.
    let code = match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}
