//! Exercise persistence with soft delete.

use super::category_from_columns;
use crate::db::{Database, Live, Table};
use crate::natural::natural_cmp;
use crate::{Error, Exercise, NewExercise, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Column list matching [`exercise_from_row`]; expects alias `e` for
/// exercises and `c` for a LEFT JOINed categories table
pub(crate) const EXERCISE_COLUMNS: &str =
    "e.id, e.title, e.notes, e.has_weight, e.is_deleted, c.id, c.name";

/// Map the seven [`EXERCISE_COLUMNS`] starting at `offset`
pub(crate) fn exercise_from_row(row: &rusqlite::Row, offset: usize) -> rusqlite::Result<Exercise> {
    Ok(Exercise {
        id: row.get(offset)?,
        title: row.get(offset + 1)?,
        notes: row.get(offset + 2)?,
        has_weight: row.get(offset + 3)?,
        is_deleted: row.get(offset + 4)?,
        category: category_from_columns(row.get(offset + 5)?, row.get(offset + 6)?),
    })
}

fn query_exercises(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Exercise>> {
    let sql = format!(
        "SELECT {EXERCISE_COLUMNS} FROM exercises e
         LEFT JOIN categories c ON c.id = e.category_id
         {filter}"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut exercises = stmt
        .query_map(params, |row| exercise_from_row(row, 0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    exercises.sort_by(|a, b| natural_cmp(&a.title, &b.title));
    Ok(exercises)
}

fn list_active_in(conn: &Connection) -> Result<Vec<Exercise>> {
    query_exercises(conn, "WHERE e.is_deleted = 0", [])
}

fn list_by_category_in(conn: &Connection, category_id: i64) -> Result<Vec<Exercise>> {
    query_exercises(
        conn,
        "WHERE e.is_deleted = 0 AND e.category_id = ?1",
        params![category_id],
    )
}

/// Exercises; deletion is soft so historical workouts keep resolving
#[derive(Clone, Debug)]
pub struct ExerciseRepository {
    db: Database,
}

impl ExerciseRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Live list of non-deleted exercises in natural title order
    pub fn observe_active(&self) -> Result<Live<Vec<Exercise>>> {
        self.db.observe(&[Table::Exercises, Table::Categories], |db| {
            db.with_conn(list_active_in)
        })
    }

    /// Live list of non-deleted exercises in one category
    pub fn observe_by_category(&self, category_id: i64) -> Result<Live<Vec<Exercise>>> {
        self.db
            .observe(&[Table::Exercises, Table::Categories], move |db| {
                db.with_conn(|conn| list_by_category_in(conn, category_id))
            })
    }

    pub fn list_active(&self) -> Result<Vec<Exercise>> {
        self.db.with_conn(list_active_in)
    }

    pub fn list_by_category(&self, category_id: i64) -> Result<Vec<Exercise>> {
        self.db
            .with_conn(|conn| list_by_category_in(conn, category_id))
    }

    /// Every exercise, soft-deleted ones included
    pub fn list_all_including_deleted(&self) -> Result<Vec<Exercise>> {
        self.db.with_conn(|conn| query_exercises(conn, "", []))
    }

    /// Look up an exercise by id, including soft-deleted ones
    pub fn get_by_id(&self, id: i64) -> Result<Option<Exercise>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {EXERCISE_COLUMNS} FROM exercises e
                 LEFT JOIN categories c ON c.id = e.category_id
                 WHERE e.id = ?1"
            );
            Ok(conn
                .query_row(&sql, params![id], |row| exercise_from_row(row, 0))
                .optional()?)
        })
    }

    pub fn insert(&self, exercise: &NewExercise) -> Result<Exercise> {
        let title = exercise.title.trim();
        if title.is_empty() {
            return Err(Error::Other("Exercise title must not be empty".into()));
        }
        let id = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO exercises (title, notes, has_weight, category_id, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, 0)",
                params![title, exercise.notes, exercise.has_weight, exercise.category_id],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        self.db.notify(&[Table::Exercises]);
        tracing::debug!("Inserted exercise {} ({})", id, title);

        self.get_by_id(id)?.ok_or(Error::NotFound {
            entity: "exercise",
            id,
        })
    }

    pub fn update(&self, exercise: &Exercise) -> Result<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE exercises
                 SET title = ?1, notes = ?2, has_weight = ?3, category_id = ?4, is_deleted = ?5
                 WHERE id = ?6",
                params![
                    exercise.title,
                    exercise.notes,
                    exercise.has_weight,
                    exercise.category.as_ref().map(|c| c.id),
                    exercise.is_deleted,
                    exercise.id
                ],
            )?)
        })?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "exercise",
                id: exercise.id,
            });
        }
        // Workout lists embed exercise titles.
        self.db.notify(&[Table::Exercises, Table::WorkoutExercises]);
        Ok(())
    }

    /// Hide an exercise from active lists, keeping it for history
    pub fn soft_delete(&self, id: i64) -> Result<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE exercises SET is_deleted = 1 WHERE id = ?1",
                params![id],
            )?)
        })?;
        if changed == 0 {
            return Err(Error::NotFound {
                entity: "exercise",
                id,
            });
        }
        self.db.notify(&[Table::Exercises]);
        tracing::debug!("Soft-deleted exercise {}", id);
        Ok(())
    }
}
