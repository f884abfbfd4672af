//! Persistence of the in-progress workout so it survives a restart.

use crate::kv::KeyValueStore;
use crate::repository::WorkoutRepository;
use crate::types::from_millis;
use crate::{Category, Exercise, Result, Workout, WorkoutExercise, WorkoutSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DRAFT_KEY: &str = "draft_json";

/// Serialized snapshot of an active session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDraft {
    pub start_time_millis: i64,
    pub elapsed_millis: i64,
    pub entry_id_counter: u64,
    /// Set when the session was opened on an existing workout
    #[serde(default)]
    pub resumed_from_workout_id: Option<i64>,
    pub exercises: Vec<DraftExerciseEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftExerciseEntry {
    pub entry_id: u64,
    pub exercise_id: i64,
    pub title: String,
    pub notes: String,
    pub has_weight: bool,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub category_name: Option<String>,
    pub sets: Vec<DraftWorkoutSet>,
    #[serde(default)]
    pub plan: Option<DraftPlan>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftWorkoutSet {
    pub set_number: u32,
    pub weight_kg: f64,
    pub reps: u32,
}

/// Planned sets copied from the workout a session was planned from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPlan {
    pub max_weight_kg: f64,
    pub set_count: u32,
    pub sets: Vec<DraftWorkoutSet>,
}

impl DraftExerciseEntry {
    /// Rebuild the exercise snapshot
    pub fn exercise(&self) -> Exercise {
        let category = match (self.category_id, &self.category_name) {
            (Some(id), Some(name)) => Some(Category {
                id,
                name: name.clone(),
            }),
            _ => None,
        };
        Exercise {
            id: self.exercise_id,
            title: self.title.clone(),
            notes: self.notes.clone(),
            has_weight: self.has_weight,
            category,
            is_deleted: false,
        }
    }
}

impl From<&WorkoutSet> for DraftWorkoutSet {
    fn from(set: &WorkoutSet) -> Self {
        Self {
            set_number: set.set_number,
            weight_kg: set.weight_kg,
            reps: set.reps,
        }
    }
}

impl From<&DraftWorkoutSet> for WorkoutSet {
    fn from(set: &DraftWorkoutSet) -> Self {
        WorkoutSet::new(set.set_number, set.weight_kg, set.reps)
    }
}

impl WorkoutDraft {
    pub fn start_time(&self) -> DateTime<Utc> {
        from_millis(self.start_time_millis)
    }

    /// Convert into an unfinished workout ending at `end_time`
    ///
    /// Entries without sets are dropped and the rest re-indexed.
    pub fn to_unfinished_workout(&self, end_time: DateTime<Utc>) -> Workout {
        let exercises = self
            .exercises
            .iter()
            .filter(|entry| !entry.sets.is_empty())
            .enumerate()
            .map(|(index, entry)| WorkoutExercise {
                id: 0,
                workout_id: 0,
                exercise: entry.exercise(),
                order_index: index as u32,
                sets: entry.sets.iter().map(WorkoutSet::from).collect(),
            })
            .collect();

        Workout {
            id: 0,
            start_time: self.start_time(),
            end_time: Some(end_time),
            duration_seconds: self.elapsed_millis / 1000,
            notes: String::new(),
            is_finished: false,
            exercises,
        }
    }
}

/// The single pending draft, if any
#[derive(Clone, Debug)]
pub struct DraftStore {
    store: KeyValueStore,
}

impl DraftStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: KeyValueStore::new(path),
        }
    }

    pub fn save_draft(&self, draft: &WorkoutDraft) -> Result<()> {
        let json = serde_json::to_string(draft)?;
        self.store.set(DRAFT_KEY, json)?;
        tracing::debug!("Saved draft with {} entries", draft.exercises.len());
        Ok(())
    }

    /// The pending draft; a missing or unreadable draft is `None`
    pub fn load_draft(&self) -> Option<WorkoutDraft> {
        let json = self.store.get(DRAFT_KEY)?;
        match serde_json::from_str(&json) {
            Ok(draft) => Some(draft),
            Err(e) => {
                tracing::warn!("Discarding unreadable draft: {}", e);
                None
            }
        }
    }

    pub fn has_draft(&self) -> bool {
        self.store.get(DRAFT_KEY).is_some()
    }

    pub fn clear_draft(&self) -> Result<()> {
        self.store.remove(DRAFT_KEY)?;
        tracing::debug!("Cleared draft");
        Ok(())
    }

    /// Persist a pending draft as an unfinished workout and clear it
    ///
    /// A draft that was resuming an existing workout replaces it. Returns
    /// the new workout id, or `None` when there was no draft.
    pub fn resolve_draft_to_workout(&self, workouts: &WorkoutRepository) -> Result<Option<i64>> {
        let Some(draft) = self.load_draft() else {
            return Ok(None);
        };

        let workout = draft.to_unfinished_workout(Utc::now());
        let id = match draft.resumed_from_workout_id {
            Some(old_id) => workouts.replace_workout(old_id, &workout)?,
            None => workouts.save_full_workout(&workout)?,
        };
        self.clear_draft()?;
        tracing::info!("Recovered draft as unfinished workout {}", id);
        Ok(Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::repository::ExerciseRepository;
    use crate::NewExercise;

    fn entry(entry_id: u64, exercise_id: i64, sets: Vec<DraftWorkoutSet>) -> DraftExerciseEntry {
        DraftExerciseEntry {
            entry_id,
            exercise_id,
            title: format!("Exercise {}", exercise_id),
            notes: String::new(),
            has_weight: true,
            category_id: None,
            category_name: None,
            sets,
            plan: None,
        }
    }

    fn set(n: u32, weight_kg: f64, reps: u32) -> DraftWorkoutSet {
        DraftWorkoutSet {
            set_number: n,
            weight_kg,
            reps,
        }
    }

    fn draft(exercises: Vec<DraftExerciseEntry>) -> WorkoutDraft {
        WorkoutDraft {
            start_time_millis: 1_700_000_000_000,
            elapsed_millis: 125_900,
            entry_id_counter: exercises.len() as u64,
            resumed_from_workout_id: None,
            exercises,
        }
    }

    #[test]
    fn test_save_load_clear() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DraftStore::new(temp_dir.path().join("draft.json"));
        assert!(!store.has_draft());
        assert!(store.load_draft().is_none());

        let saved = draft(vec![entry(1, 3, vec![set(1, 60.0, 5)])]);
        store.save_draft(&saved).unwrap();
        assert!(store.has_draft());
        assert_eq!(store.load_draft(), Some(saved));

        store.clear_draft().unwrap();
        assert!(!store.has_draft());
    }

    #[test]
    fn test_unreadable_draft_is_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("draft.json");
        std::fs::write(&path, r#"{"draft_json":"{\"startTimeMillis\":"}"#).unwrap();

        let store = DraftStore::new(&path);
        assert!(store.has_draft());
        assert!(store.load_draft().is_none());
    }

    #[test]
    fn test_older_draft_without_new_fields_loads() {
        let json = r#"{"startTimeMillis":1,"elapsedMillis":2,"entryIdCounter":1,
            "exercises":[{"entryId":1,"exerciseId":4,"title":"Row","notes":"","hasWeight":true,
            "sets":[{"setNumber":1,"weightKg":50.0,"reps":8}]}]}"#;
        let draft: WorkoutDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.resumed_from_workout_id, None);
        assert!(draft.exercises[0].plan.is_none());
        assert!(draft.exercises[0].category_id.is_none());
    }

    #[test]
    fn test_to_unfinished_workout_drops_empty_entries() {
        let d = draft(vec![
            entry(1, 3, vec![]),
            entry(2, 4, vec![set(1, 50.0, 8), set(2, 55.0, 6)]),
            entry(3, 5, vec![set(1, 10.0, 12)]),
        ]);
        let workout = d.to_unfinished_workout(Utc::now());

        assert!(!workout.is_finished);
        assert_eq!(workout.duration_seconds, 125);
        assert_eq!(workout.start_time, from_millis(1_700_000_000_000));
        let ids: Vec<_> = workout.exercises.iter().map(|e| (e.exercise.id, e.order_index)).collect();
        assert_eq!(ids, vec![(4, 0), (5, 1)]);
    }

    #[test]
    fn test_resolve_draft_to_workout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DraftStore::new(temp_dir.path().join("draft.json"));
        let db = Database::open_in_memory().unwrap();
        let row = ExerciseRepository::new(db.clone())
            .insert(&NewExercise {
                title: "Row".into(),
                has_weight: true,
                ..Default::default()
            })
            .unwrap();
        let workouts = WorkoutRepository::new(db);

        assert_eq!(store.resolve_draft_to_workout(&workouts).unwrap(), None);

        store
            .save_draft(&draft(vec![entry(1, row.id, vec![set(1, 50.0, 8)])]))
            .unwrap();
        let id = store.resolve_draft_to_workout(&workouts).unwrap().unwrap();

        let saved = workouts.get_by_id_with_exercises(id).unwrap().unwrap();
        assert!(!saved.is_finished);
        assert_eq!(saved.exercises[0].exercise.title, "Row");
        assert!(!store.has_draft());
    }

    #[test]
    fn test_resolve_resumed_draft_replaces_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = DraftStore::new(temp_dir.path().join("draft.json"));
        let db = Database::open_in_memory().unwrap();
        let row = ExerciseRepository::new(db.clone())
            .insert(&NewExercise {
                title: "Row".into(),
                ..Default::default()
            })
            .unwrap();
        let workouts = WorkoutRepository::new(db);

        let mut original = draft(vec![entry(1, row.id, vec![set(1, 50.0, 8)])])
            .to_unfinished_workout(Utc::now());
        original.is_finished = true;
        let old_id = workouts.save_full_workout(&original).unwrap();

        let mut resumed = draft(vec![entry(1, row.id, vec![set(1, 50.0, 8), set(2, 50.0, 8)])]);
        resumed.resumed_from_workout_id = Some(old_id);
        store.save_draft(&resumed).unwrap();

        let new_id = store.resolve_draft_to_workout(&workouts).unwrap().unwrap();
        assert!(workouts.get_by_id_with_exercises(old_id).unwrap().is_none());
        let all = workouts.list_all_with_exercises().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, new_id);
        assert_eq!(all[0].total_sets(), 2);
    }
}
