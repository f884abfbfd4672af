//! Workout persistence: a workout, its exercises and their sets.
//!
//! Full-workout writes always renumber children by position, so stored
//! order indices are `0..n` and set numbers are `1..n` regardless of what
//! the caller passed in.

use super::{exercise_from_row, EXERCISE_COLUMNS};
use crate::db::{Database, Live, Table};
use crate::types::{from_millis, to_millis};
use crate::{Error, Result, Workout, WorkoutExercise, WorkoutSet};
use rusqlite::{params, Connection, OptionalExtension};

const WORKOUT_TABLES: [Table; 3] = [Table::Workouts, Table::WorkoutExercises, Table::WorkoutSets];

fn workout_header_from_row(row: &rusqlite::Row) -> rusqlite::Result<Workout> {
    let end_time: Option<i64> = row.get(2)?;
    Ok(Workout {
        id: row.get(0)?,
        start_time: from_millis(row.get(1)?),
        end_time: end_time.map(from_millis),
        duration_seconds: row.get(3)?,
        notes: row.get(4)?,
        is_finished: row.get(5)?,
        exercises: Vec::new(),
    })
}

fn set_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutSet> {
    Ok(WorkoutSet {
        id: row.get(0)?,
        workout_exercise_id: row.get(1)?,
        set_number: row.get(2)?,
        weight_kg: row.get(3)?,
        reps: row.get(4)?,
    })
}

fn load_sets(conn: &Connection, workout_exercise_id: i64) -> Result<Vec<WorkoutSet>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, workout_exercise_id, set_number, weight_kg, reps
         FROM workout_sets WHERE workout_exercise_id = ?1
         ORDER BY set_number ASC",
    )?;
    let sets = stmt
        .query_map(params![workout_exercise_id], set_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(sets)
}

fn attach_exercises(conn: &Connection, workout: &mut Workout) -> Result<()> {
    let sql = format!(
        "SELECT we.id, we.workout_id, we.order_index, {EXERCISE_COLUMNS}
         FROM workout_exercises we
         JOIN exercises e ON e.id = we.exercise_id
         LEFT JOIN categories c ON c.id = e.category_id
         WHERE we.workout_id = ?1
         ORDER BY we.order_index ASC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![workout.id], |row| {
            Ok(WorkoutExercise {
                id: row.get(0)?,
                workout_id: row.get(1)?,
                order_index: row.get(2)?,
                exercise: exercise_from_row(row, 3)?,
                sets: Vec::new(),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    workout.exercises = rows
        .into_iter()
        .map(|mut we| {
            we.sets = load_sets(conn, we.id)?;
            Ok(we)
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(())
}

const WORKOUT_COLUMNS: &str =
    "id, start_time, end_time, duration_seconds, notes, is_finished";

fn get_with_exercises_in(conn: &Connection, id: i64) -> Result<Option<Workout>> {
    let header = conn
        .query_row(
            &format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = ?1"),
            params![id],
            workout_header_from_row,
        )
        .optional()?;

    match header {
        Some(mut workout) => {
            attach_exercises(conn, &mut workout)?;
            Ok(Some(workout))
        }
        None => Ok(None),
    }
}

fn list_all_with_exercises_in(conn: &Connection) -> Result<Vec<Workout>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {WORKOUT_COLUMNS} FROM workouts ORDER BY start_time DESC"
    ))?;
    let mut workouts = stmt
        .query_map([], workout_header_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for workout in &mut workouts {
        attach_exercises(conn, workout)?;
    }
    Ok(workouts)
}

fn insert_sets(conn: &Connection, workout_exercise_id: i64, sets: &[WorkoutSet]) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO workout_sets (workout_exercise_id, set_number, weight_kg, reps)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (index, set) in sets.iter().enumerate() {
        stmt.execute(params![
            workout_exercise_id,
            index as u32 + 1,
            set.weight_kg,
            set.reps
        ])?;
    }
    Ok(())
}

fn insert_children(conn: &Connection, workout_id: i64, exercises: &[WorkoutExercise]) -> Result<()> {
    for (index, exercise) in exercises.iter().enumerate() {
        conn.execute(
            "INSERT INTO workout_exercises (workout_id, exercise_id, order_index)
             VALUES (?1, ?2, ?3)",
            params![workout_id, exercise.exercise.id, index as u32],
        )?;
        let workout_exercise_id = conn.last_insert_rowid();
        insert_sets(conn, workout_exercise_id, &exercise.sets)?;
    }
    Ok(())
}

/// Insert a workout with all its children; caller owns the transaction
pub(crate) fn insert_full_workout(conn: &Connection, workout: &Workout) -> Result<i64> {
    conn.execute(
        "INSERT INTO workouts (start_time, end_time, duration_seconds, notes, is_finished)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            to_millis(workout.start_time),
            workout.end_time.map(to_millis),
            workout.duration_seconds,
            workout.notes,
            workout.is_finished
        ],
    )?;
    let workout_id = conn.last_insert_rowid();
    insert_children(conn, workout_id, &workout.exercises)?;
    Ok(workout_id)
}

fn delete_in(conn: &Connection, id: i64) -> Result<bool> {
    Ok(conn.execute("DELETE FROM workouts WHERE id = ?1", params![id])? > 0)
}

fn renumber_sets(conn: &Connection, workout_exercise_id: i64) -> Result<()> {
    let ids: Vec<i64> = {
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM workout_sets WHERE workout_exercise_id = ?1 ORDER BY set_number ASC",
        )?;
        let ids = stmt
            .query_map(params![workout_exercise_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids
    };
    for (index, id) in ids.iter().enumerate() {
        conn.execute(
            "UPDATE workout_sets SET set_number = ?1 WHERE id = ?2",
            params![index as u32 + 1, id],
        )?;
    }
    Ok(())
}

/// Workouts and their nested exercises/sets
#[derive(Clone, Debug)]
pub struct WorkoutRepository {
    db: Database,
}

impl WorkoutRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Live list of all workouts, newest first, fully populated
    pub fn observe_all_with_exercises(&self) -> Result<Live<Vec<Workout>>> {
        self.db.observe(
            &[
                Table::Workouts,
                Table::WorkoutExercises,
                Table::WorkoutSets,
                Table::Exercises,
            ],
            |db| db.with_conn(list_all_with_exercises_in),
        )
    }

    pub fn list_all_with_exercises(&self) -> Result<Vec<Workout>> {
        self.db.with_conn(list_all_with_exercises_in)
    }

    pub fn get_by_id_with_exercises(&self, id: i64) -> Result<Option<Workout>> {
        self.db.with_conn(|conn| get_with_exercises_in(conn, id))
    }

    /// Insert a workout, its exercises and their sets in one transaction
    pub fn save_full_workout(&self, workout: &Workout) -> Result<i64> {
        let id = self.db.transaction(|tx| insert_full_workout(tx, workout))?;
        self.db.notify(&WORKOUT_TABLES);
        tracing::info!(
            "Saved workout {} ({} exercises, {} sets)",
            id,
            workout.exercise_count(),
            workout.total_sets()
        );
        Ok(id)
    }

    /// Delete `old_id` (if present) and save `workout` in one transaction
    pub fn replace_workout(&self, old_id: i64, workout: &Workout) -> Result<i64> {
        let id = self.db.transaction(|tx| {
            if !delete_in(tx, old_id)? {
                tracing::warn!("Workout {} to replace no longer exists", old_id);
            }
            insert_full_workout(tx, workout)
        })?;
        self.db.notify(&WORKOUT_TABLES);
        tracing::info!("Replaced workout {} with {}", old_id, id);
        Ok(id)
    }

    /// Rewrite a workout's header and children in one transaction
    pub fn update_full_workout(&self, workout: &Workout) -> Result<()> {
        self.db.transaction(|tx| {
            let changed = tx.execute(
                "UPDATE workouts
                 SET start_time = ?1, end_time = ?2, duration_seconds = ?3, notes = ?4, is_finished = ?5
                 WHERE id = ?6",
                params![
                    to_millis(workout.start_time),
                    workout.end_time.map(to_millis),
                    workout.duration_seconds,
                    workout.notes,
                    workout.is_finished,
                    workout.id
                ],
            )?;
            if changed == 0 {
                return Err(Error::NotFound {
                    entity: "workout",
                    id: workout.id,
                });
            }
            tx.execute(
                "DELETE FROM workout_exercises WHERE workout_id = ?1",
                params![workout.id],
            )?;
            insert_children(tx, workout.id, &workout.exercises)
        })?;
        self.db.notify(&WORKOUT_TABLES);
        tracing::info!("Updated workout {}", workout.id);
        Ok(())
    }

    /// Delete a workout; exercises and sets cascade
    pub fn delete_by_id(&self, id: i64) -> Result<bool> {
        let deleted = self.db.with_conn(|conn| delete_in(conn, id))?;
        if deleted {
            self.db.notify(&WORKOUT_TABLES);
            tracing::info!("Deleted workout {}", id);
        }
        Ok(deleted)
    }

    /// Append an exercise to an existing workout at the next order index
    pub fn add_exercise_to_workout(&self, workout_id: i64, exercise_id: i64) -> Result<i64> {
        let id = self.db.transaction(|tx| {
            let next_index: u32 = tx.query_row(
                "SELECT COUNT(*) FROM workout_exercises WHERE workout_id = ?1",
                params![workout_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO workout_exercises (workout_id, exercise_id, order_index)
                 VALUES (?1, ?2, ?3)",
                params![workout_id, exercise_id, next_index],
            )?;
            Ok(tx.last_insert_rowid())
        })?;
        self.db.notify(&[Table::WorkoutExercises]);
        Ok(id)
    }

    /// Append a set to a workout exercise, numbered count + 1
    pub fn add_set_to_exercise(
        &self,
        workout_exercise_id: i64,
        weight_kg: f64,
        reps: u32,
    ) -> Result<WorkoutSet> {
        let weight_kg = WorkoutSet::validate_weight(weight_kg)?;
        let set = self.db.transaction(|tx| {
            let count: u32 = tx.query_row(
                "SELECT COUNT(*) FROM workout_sets WHERE workout_exercise_id = ?1",
                params![workout_exercise_id],
                |row| row.get(0),
            )?;
            let set_number = count + 1;
            tx.execute(
                "INSERT INTO workout_sets (workout_exercise_id, set_number, weight_kg, reps)
                 VALUES (?1, ?2, ?3, ?4)",
                params![workout_exercise_id, set_number, weight_kg, reps],
            )?;
            Ok(WorkoutSet {
                id: tx.last_insert_rowid(),
                workout_exercise_id,
                set_number,
                weight_kg,
                reps,
            })
        })?;
        self.db.notify(&[Table::WorkoutSets]);
        Ok(set)
    }

    /// Delete one set and renumber its siblings to stay contiguous
    pub fn delete_set(&self, set_id: i64) -> Result<()> {
        self.db.transaction(|tx| {
            let parent: Option<i64> = tx
                .query_row(
                    "SELECT workout_exercise_id FROM workout_sets WHERE id = ?1",
                    params![set_id],
                    |row| row.get(0),
                )
                .optional()?;
            let parent = parent.ok_or(Error::NotFound {
                entity: "set",
                id: set_id,
            })?;
            tx.execute("DELETE FROM workout_sets WHERE id = ?1", params![set_id])?;
            renumber_sets(tx, parent)
        })?;
        self.db.notify(&[Table::WorkoutSets]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::ExerciseRepository;
    use crate::{Exercise, NewExercise};
    use chrono::{Duration, Utc};

    fn setup() -> (WorkoutRepository, Exercise, Exercise) {
        let db = Database::open_in_memory().unwrap();
        let exercises = ExerciseRepository::new(db.clone());
        let bench = exercises
            .insert(&NewExercise {
                title: "Bench".into(),
                has_weight: true,
                ..Default::default()
            })
            .unwrap();
        let row = exercises
            .insert(&NewExercise {
                title: "Row".into(),
                has_weight: true,
                ..Default::default()
            })
            .unwrap();
        (WorkoutRepository::new(db), bench, row)
    }

    fn entry(exercise: &Exercise, order_index: u32, sets: Vec<WorkoutSet>) -> WorkoutExercise {
        WorkoutExercise {
            id: 0,
            workout_id: 0,
            exercise: exercise.clone(),
            order_index,
            sets,
        }
    }

    fn workout(exercises: Vec<WorkoutExercise>) -> Workout {
        let start = Utc::now() - Duration::hours(1);
        Workout {
            id: 0,
            start_time: start,
            end_time: Some(Utc::now()),
            duration_seconds: 3600,
            notes: String::new(),
            is_finished: true,
            exercises,
        }
    }

    #[test]
    fn test_save_and_load_full_workout() {
        let (repo, bench, row) = setup();
        let id = repo
            .save_full_workout(&workout(vec![
                entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8), WorkoutSet::new(2, 65.0, 6)]),
                entry(&row, 1, vec![WorkoutSet::new(1, 50.0, 10)]),
            ]))
            .unwrap();

        let loaded = repo.get_by_id_with_exercises(id).unwrap().unwrap();
        assert_eq!(loaded.exercise_count(), 2);
        assert_eq!(loaded.exercises[0].exercise.title, "Bench");
        assert_eq!(loaded.exercises[1].exercise.title, "Row");
        assert_eq!(loaded.total_sets(), 3);
        assert_eq!(loaded.exercises[0].sets[1].weight_kg, 65.0);
        assert!(loaded.is_finished);
        assert_eq!(loaded.duration_seconds, 3600);
    }

    #[test]
    fn test_save_renumbers_order_and_sets() {
        let (repo, bench, row) = setup();
        let id = repo
            .save_full_workout(&workout(vec![
                entry(&bench, 5, vec![WorkoutSet::new(4, 60.0, 8), WorkoutSet::new(9, 60.0, 8)]),
                entry(&row, 2, vec![WorkoutSet::new(1, 50.0, 10)]),
            ]))
            .unwrap();

        let loaded = repo.get_by_id_with_exercises(id).unwrap().unwrap();
        let indices: Vec<_> = loaded.exercises.iter().map(|e| e.order_index).collect();
        assert_eq!(indices, vec![0, 1]);
        let numbers: Vec<_> = loaded.exercises[0].sets.iter().map(|s| s.set_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn test_failed_save_leaves_no_orphans() {
        let (repo, bench, _) = setup();
        let mut missing = bench.clone();
        missing.id = 999;

        let result = repo.save_full_workout(&workout(vec![
            entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8)]),
            entry(&missing, 1, vec![WorkoutSet::new(1, 10.0, 10)]),
        ]));
        assert!(result.is_err());

        assert!(repo.list_all_with_exercises().unwrap().is_empty());
        let orphans: i64 = repo
            .db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT (SELECT COUNT(*) FROM workout_exercises) + (SELECT COUNT(*) FROM workout_sets)",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn test_delete_cascades() {
        let (repo, bench, _) = setup();
        let id = repo
            .save_full_workout(&workout(vec![entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8)])]))
            .unwrap();

        assert!(repo.delete_by_id(id).unwrap());
        assert!(repo.get_by_id_with_exercises(id).unwrap().is_none());
        let sets: i64 = repo
            .db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM workout_sets", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(sets, 0);
        assert!(!repo.delete_by_id(id).unwrap());
    }

    #[test]
    fn test_replace_workout() {
        let (repo, bench, row) = setup();
        let old = repo
            .save_full_workout(&workout(vec![entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8)])]))
            .unwrap();

        let new = repo
            .replace_workout(
                old,
                &workout(vec![
                    entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8)]),
                    entry(&row, 1, vec![WorkoutSet::new(1, 40.0, 12)]),
                ]),
            )
            .unwrap();

        assert_ne!(old, new);
        assert!(repo.get_by_id_with_exercises(old).unwrap().is_none());
        let all = repo.list_all_with_exercises().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].exercise_count(), 2);
    }

    #[test]
    fn test_update_full_workout_rewrites_children() {
        let (repo, bench, row) = setup();
        let id = repo
            .save_full_workout(&workout(vec![entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8)])]))
            .unwrap();

        let mut edited = repo.get_by_id_with_exercises(id).unwrap().unwrap();
        edited.notes = "felt strong".into();
        edited.exercises[0].exercise = row.clone();
        edited.exercises[0].sets.push(WorkoutSet::new(2, 45.0, 10));
        repo.update_full_workout(&edited).unwrap();

        let loaded = repo.get_by_id_with_exercises(id).unwrap().unwrap();
        assert_eq!(loaded.notes, "felt strong");
        assert_eq!(loaded.exercises.len(), 1);
        assert_eq!(loaded.exercises[0].exercise.id, row.id);
        assert_eq!(loaded.exercises[0].sets.len(), 2);
    }

    #[test]
    fn test_update_missing_workout() {
        let (repo, _, _) = setup();
        let mut ghost = workout(vec![]);
        ghost.id = 77;
        assert!(matches!(
            repo.update_full_workout(&ghost),
            Err(Error::NotFound { id: 77, .. })
        ));
    }

    #[test]
    fn test_incremental_edits_keep_numbering_contiguous() {
        let (repo, bench, row) = setup();
        let id = repo.save_full_workout(&workout(vec![])).unwrap();
        let we = repo.add_exercise_to_workout(id, bench.id).unwrap();
        repo.add_exercise_to_workout(id, row.id).unwrap();

        let s1 = repo.add_set_to_exercise(we, 60.0, 8).unwrap();
        repo.add_set_to_exercise(we, 62.5, 6).unwrap();
        let s3 = repo.add_set_to_exercise(we, 65.0, 4).unwrap();
        assert_eq!(s3.set_number, 3);

        repo.delete_set(s1.id).unwrap();

        let loaded = repo.get_by_id_with_exercises(id).unwrap().unwrap();
        assert_eq!(loaded.exercises[1].order_index, 1);
        let sets = &loaded.exercises[0].sets;
        assert_eq!(sets.iter().map(|s| s.set_number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(sets[0].weight_kg, 62.5);
    }

    #[test]
    fn test_add_set_rejects_unstorable_weight() {
        let (repo, bench, _) = setup();
        let id = repo.save_full_workout(&workout(vec![])).unwrap();
        let we = repo.add_exercise_to_workout(id, bench.id).unwrap();

        assert!(matches!(
            repo.add_set_to_exercise(we, f64::NAN, 5),
            Err(Error::Session(_))
        ));
        assert!(repo.add_set_to_exercise(we, -1.0, 5).is_err());
        let set = repo.add_set_to_exercise(we, 40.0, 5).unwrap();
        assert_eq!(set.set_number, 1);
    }

    #[test]
    fn test_list_sorted_newest_first() {
        let (repo, bench, _) = setup();
        let mut older = workout(vec![entry(&bench, 0, vec![WorkoutSet::new(1, 60.0, 8)])]);
        older.start_time = Utc::now() - Duration::days(3);
        let newer = workout(vec![entry(&bench, 0, vec![WorkoutSet::new(1, 70.0, 5)])]);

        let older_id = repo.save_full_workout(&older).unwrap();
        let newer_id = repo.save_full_workout(&newer).unwrap();

        let ids: Vec<_> = repo.list_all_with_exercises().unwrap().iter().map(|w| w.id).collect();
        assert_eq!(ids, vec![newer_id, older_id]);
    }

    #[test]
    fn test_history_resolves_soft_deleted_exercise() {
        let db = Database::open_in_memory().unwrap();
        let exercises = ExerciseRepository::new(db.clone());
        let repo = WorkoutRepository::new(db);
        let dips = exercises
            .insert(&NewExercise {
                title: "Dips".into(),
                ..Default::default()
            })
            .unwrap();
        let id = repo
            .save_full_workout(&workout(vec![entry(&dips, 0, vec![WorkoutSet::new(1, 0.0, 12)])]))
            .unwrap();

        exercises.soft_delete(dips.id).unwrap();

        let loaded = repo.get_by_id_with_exercises(id).unwrap().unwrap();
        assert_eq!(loaded.exercises[0].exercise.title, "Dips");
        assert!(loaded.exercises[0].exercise.is_deleted);
    }
}
