//! Flat CSV of every recorded set, one row per set.

use crate::db::Database;
use crate::types::from_millis;
use crate::Result;
use std::io::Write;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    workout_id: i64,
    start_time: String,
    is_finished: bool,
    exercise_title: String,
    category: Option<String>,
    order_index: u32,
    set_number: u32,
    weight_kg: f64,
    reps: u32,
    volume_kg: f64,
}

/// Write all sets ordered by workout start, then exercise order, then set
/// number. Returns the number of rows written.
pub fn export_sets_csv<W: Write>(db: &Database, writer: W) -> Result<usize> {
    let rows = db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT w.id, w.start_time, w.is_finished, e.title, c.name,
                    we.order_index, s.set_number, s.weight_kg, s.reps
             FROM workout_sets s
             JOIN workout_exercises we ON we.id = s.workout_exercise_id
             JOIN workouts w ON w.id = we.workout_id
             JOIN exercises e ON e.id = we.exercise_id
             LEFT JOIN categories c ON c.id = e.category_id
             ORDER BY w.start_time, w.id, we.order_index, s.set_number",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let weight_kg: f64 = row.get(7)?;
                let reps: u32 = row.get(8)?;
                Ok(CsvRow {
                    workout_id: row.get(0)?,
                    start_time: from_millis(row.get(1)?).to_rfc3339(),
                    is_finished: row.get(2)?,
                    exercise_title: row.get(3)?,
                    category: row.get(4)?,
                    order_index: row.get(5)?,
                    set_number: row.get(6)?,
                    weight_kg,
                    reps,
                    volume_kg: weight_kg * reps as f64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    })?;

    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(writer);
    for row in &rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;

    tracing::info!("Exported {} sets to CSV", rows.len());
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ExerciseRepository, WorkoutRepository};
    use crate::{NewExercise, Workout, WorkoutExercise, WorkoutSet};

    #[test]
    fn test_one_row_per_set_with_header() {
        let db = Database::open_in_memory().unwrap();
        let press = ExerciseRepository::new(db.clone())
            .insert(&NewExercise {
                title: "Overhead Press".into(),
                has_weight: true,
                ..Default::default()
            })
            .unwrap();
        WorkoutRepository::new(db.clone())
            .save_full_workout(&Workout {
                id: 0,
                start_time: from_millis(1_700_000_000_000),
                end_time: None,
                duration_seconds: 0,
                notes: String::new(),
                is_finished: true,
                exercises: vec![WorkoutExercise {
                    id: 0,
                    workout_id: 0,
                    exercise: press,
                    order_index: 0,
                    sets: vec![WorkoutSet::new(1, 40.0, 8), WorkoutSet::new(2, 42.5, 6)],
                }],
            })
            .unwrap();

        let mut buffer = Vec::new();
        let count = export_sets_csv(&db, &mut buffer).unwrap();
        assert_eq!(count, 2);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("workout_id,start_time,is_finished,exercise_title"));
        assert!(lines[1].contains("Overhead Press"));
        assert!(lines[2].ends_with(",2,42.5,6,255.0"));
    }

    #[test]
    fn test_empty_store_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let mut buffer = Vec::new();
        assert_eq!(export_sets_csv(&db, &mut buffer).unwrap(), 0);
        assert!(buffer.is_empty());
    }
}
