//! Whole-database JSON export and import.
//!
//! The document holds categories, every exercise (soft-deleted included)
//! and every workout with its nested exercises and sets. Times are epoch
//! milliseconds. Import replaces the whole store: it wipes all tables and
//! reinserts inside one transaction, remapping category and exercise ids.

mod sets_csv;

pub use sets_csv::export_sets_csv;

use crate::db::{clear_all_tables_in, Database, Table};
use crate::repository::{exercise_from_row, insert_full_workout, EXERCISE_COLUMNS};
use crate::types::from_millis;
use crate::{Error, Exercise, Result, Workout, WorkoutExercise, WorkoutSet};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    #[serde(default)]
    pub categories: Vec<ExportCategory>,
    #[serde(default)]
    pub exercises: Vec<ExportExercise>,
    #[serde(default)]
    pub workouts: Vec<ExportWorkout>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportCategory {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportExercise {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub has_weight: bool,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportWorkout {
    pub id: i64,
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub duration_seconds: i64,
    #[serde(default)]
    pub notes: String,
    #[serde(default = "default_true")]
    pub is_finished: bool,
    #[serde(default)]
    pub exercises: Vec<ExportWorkoutExercise>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportWorkoutExercise {
    pub exercise_id: i64,
    pub order_index: u32,
    #[serde(default)]
    pub sets: Vec<ExportWorkoutSet>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportWorkoutSet {
    pub set_number: u32,
    pub weight_kg: f64,
    pub reps: u32,
}

fn default_true() -> bool {
    true
}

/// Counts of what an import wrote
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub categories: usize,
    pub exercises: usize,
    pub workouts: usize,
    pub sets: usize,
    /// Workout exercises dropped because their exercise id was unknown
    pub skipped_exercises: usize,
}

fn collect_export(conn: &Connection) -> Result<ExportData> {
    let categories = conn
        .prepare("SELECT id, name FROM categories ORDER BY id")?
        .query_map([], |row| {
            Ok(ExportCategory {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let exercises = conn
        .prepare("SELECT id, title, notes, has_weight, category_id, is_deleted FROM exercises ORDER BY id")?
        .query_map([], |row| {
            Ok(ExportExercise {
                id: row.get(0)?,
                title: row.get(1)?,
                notes: row.get(2)?,
                has_weight: row.get(3)?,
                category_id: row.get(4)?,
                is_deleted: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    // Bulk-load children and group them in memory.
    let mut sets_by_parent: HashMap<i64, Vec<ExportWorkoutSet>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT workout_exercise_id, set_number, weight_kg, reps
         FROM workout_sets ORDER BY workout_exercise_id, set_number",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        sets_by_parent
            .entry(row.get(0)?)
            .or_default()
            .push(ExportWorkoutSet {
                set_number: row.get(1)?,
                weight_kg: row.get(2)?,
                reps: row.get(3)?,
            });
    }

    let mut exercises_by_workout: HashMap<i64, Vec<ExportWorkoutExercise>> = HashMap::new();
    let mut stmt = conn.prepare(
        "SELECT id, workout_id, exercise_id, order_index
         FROM workout_exercises ORDER BY workout_id, order_index",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        exercises_by_workout
            .entry(row.get(1)?)
            .or_default()
            .push(ExportWorkoutExercise {
                exercise_id: row.get(2)?,
                order_index: row.get(3)?,
                sets: sets_by_parent.remove(&id).unwrap_or_default(),
            });
    }

    let workouts = conn
        .prepare(
            "SELECT id, start_time, end_time, duration_seconds, notes, is_finished
             FROM workouts ORDER BY start_time",
        )?
        .query_map([], |row| {
            Ok(ExportWorkout {
                id: row.get(0)?,
                start_time: row.get(1)?,
                end_time: row.get(2)?,
                duration_seconds: row.get(3)?,
                notes: row.get(4)?,
                is_finished: row.get(5)?,
                exercises: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|mut workout| {
            workout.exercises = exercises_by_workout.remove(&workout.id).unwrap_or_default();
            workout
        })
        .collect();

    Ok(ExportData {
        categories,
        exercises,
        workouts,
    })
}

/// Write the whole database as pretty-printed JSON
pub fn export_json<W: Write>(db: &Database, writer: W) -> Result<ExportData> {
    let data = db.with_conn(collect_export)?;
    serde_json::to_writer_pretty(writer, &data)?;
    tracing::info!(
        "Exported {} categories, {} exercises, {} workouts",
        data.categories.len(),
        data.exercises.len(),
        data.workouts.len()
    );
    Ok(data)
}

fn insert_exercise(conn: &Connection, exercise: &ExportExercise, category_id: Option<i64>) -> Result<Exercise> {
    conn.execute(
        "INSERT INTO exercises (title, notes, has_weight, category_id, is_deleted)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            exercise.title,
            exercise.notes,
            exercise.has_weight,
            category_id,
            exercise.is_deleted
        ],
    )?;
    let id = conn.last_insert_rowid();
    let sql = format!(
        "SELECT {EXERCISE_COLUMNS} FROM exercises e
         LEFT JOIN categories c ON c.id = e.category_id
         WHERE e.id = ?1"
    );
    Ok(conn.query_row(&sql, params![id], |row| exercise_from_row(row, 0))?)
}

fn import_into(conn: &Connection, data: &ExportData) -> Result<ImportSummary> {
    clear_all_tables_in(conn)?;
    let mut summary = ImportSummary::default();

    let mut category_ids: HashMap<i64, i64> = HashMap::new();
    for category in &data.categories {
        conn.execute(
            "INSERT INTO categories (name) VALUES (?1)",
            params![category.name],
        )?;
        category_ids.insert(category.id, conn.last_insert_rowid());
        summary.categories += 1;
    }

    let mut exercises: HashMap<i64, Exercise> = HashMap::new();
    for exercise in &data.exercises {
        let category_id = exercise
            .category_id
            .and_then(|old| category_ids.get(&old).copied());
        exercises.insert(exercise.id, insert_exercise(conn, exercise, category_id)?);
        summary.exercises += 1;
    }

    for workout in &data.workouts {
        let mut entries: Vec<&ExportWorkoutExercise> = workout.exercises.iter().collect();
        entries.sort_by_key(|e| e.order_index);

        let mut nested = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(exercise) = exercises.get(&entry.exercise_id) else {
                tracing::warn!(
                    "Skipping exercise {} in workout {}: unknown exercise id",
                    entry.exercise_id,
                    workout.id
                );
                summary.skipped_exercises += 1;
                continue;
            };
            let mut sets: Vec<WorkoutSet> = entry
                .sets
                .iter()
                .map(|s| WorkoutSet::new(s.set_number, s.weight_kg, s.reps))
                .collect();
            sets.sort_by_key(|s| s.set_number);
            summary.sets += sets.len();
            nested.push(WorkoutExercise {
                id: 0,
                workout_id: 0,
                exercise: exercise.clone(),
                order_index: entry.order_index,
                sets,
            });
        }

        insert_full_workout(
            conn,
            &Workout {
                id: 0,
                start_time: from_millis(workout.start_time),
                end_time: workout.end_time.map(from_millis),
                duration_seconds: workout.duration_seconds,
                notes: workout.notes.clone(),
                is_finished: workout.is_finished,
                exercises: nested,
            },
        )?;
        summary.workouts += 1;
    }

    Ok(summary)
}

/// Replace the whole database with the contents of a JSON export
///
/// Unknown keys are ignored. A malformed document leaves the store
/// untouched; the wipe and every insert share one transaction.
pub fn import_json<R: Read>(db: &Database, reader: R) -> Result<ImportSummary> {
    let data: ExportData = serde_json::from_reader(reader)
        .map_err(|e| Error::Import(format!("Invalid export file: {}", e)))?;

    let summary = db.transaction(|tx| import_into(tx, &data))?;
    db.notify(&Table::ALL);
    tracing::info!(
        "Imported {} categories, {} exercises, {} workouts ({} skipped exercise refs)",
        summary.categories,
        summary.exercises,
        summary.workouts,
        summary.skipped_exercises
    );
    Ok(summary)
}
