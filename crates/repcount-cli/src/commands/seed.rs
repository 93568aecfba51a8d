use repcount_core::session::{ExerciseRef, SetVariant};
use repcount_core::Database;

fn set(series: u32, reps: u32, weight_kg: f64) -> SetVariant {
    SetVariant {
        series,
        reps,
        weight_kg,
    }
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    let catalogue = [
        ("Back squat", "legs", vec![set(3, 5, 80.0), set(5, 5, 70.0)]),
        ("Bench press", "chest", vec![set(3, 8, 55.0)]),
        ("Barbell row", "back", vec![set(3, 10, 45.0)]),
    ];

    let mut exercises = Vec::new();
    for (name, group, sets) in &catalogue {
        let id = db.insert_exercise(name, group, sets)?;
        println!("exercise {id}: {name}");
        exercises.push(ExerciseRef {
            exercise_id: id,
            set_index: 0,
        });
    }

    let slot = db.create_day_slot("Full body A", &exercises)?;
    println!("day slot {slot}: Full body A ({} exercises)", exercises.len());
    println!("start it with: repcount train {slot}");
    Ok(())
}
