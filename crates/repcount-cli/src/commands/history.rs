use repcount_core::session::HistoryEntry;
use repcount_core::Database;

pub fn run(exercise: i64, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let entries = db.history(exercise)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        println!("no history for exercise {exercise}");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &HistoryEntry) -> String {
    format!(
        "{}  {}x{} @ {} kg",
        entry.recorded_at.format("%Y-%m-%d %H:%M"),
        entry.series,
        entry.reps,
        entry.weight_kg
    )
}
