//! Exercise entries of an active session and their draft representation.

use crate::draft::{DraftExerciseEntry, DraftPlan, DraftWorkoutSet};
use crate::{Error, Exercise, Result, WorkoutExercise, WorkoutSet};
use serde::Serialize;

/// Read-only preview of what was done for an exercise last time
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlanPreview {
    pub max_weight_kg: f64,
    pub set_count: u32,
    pub sets: Vec<WorkoutSet>,
}

impl PlanPreview {
    pub fn from_workout_exercise(previous: &WorkoutExercise) -> Self {
        Self {
            max_weight_kg: previous
                .sets
                .iter()
                .map(|s| s.weight_kg)
                .fold(0.0, f64::max),
            set_count: previous.sets.len() as u32,
            sets: previous.sets.clone(),
        }
    }
}

/// One exercise in the session with the sets recorded so far
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ActiveExerciseEntry {
    /// Session-local id, stable across removals
    pub id: u64,
    pub exercise: Exercise,
    pub sets: Vec<WorkoutSet>,
    pub plan: Option<PlanPreview>,
}

impl ActiveExerciseEntry {
    pub fn new(id: u64, exercise: Exercise) -> Self {
        Self {
            id,
            exercise,
            sets: Vec::new(),
            plan: None,
        }
    }

    /// Planned but nothing recorded yet
    pub fn is_ghost(&self) -> bool {
        self.plan.is_some() && self.sets.is_empty()
    }

    /// Append a set numbered `count + 1`; the entry is unchanged on error
    pub fn push_set(&mut self, weight_kg: f64, reps: u32) -> Result<WorkoutSet> {
        let weight_kg = WorkoutSet::validate_weight(weight_kg)?;
        let set = WorkoutSet::new(self.sets.len() as u32 + 1, weight_kg, reps);
        self.sets.push(set.clone());
        Ok(set)
    }

    /// Remove the set at `index` and renumber the rest from 1
    pub fn remove_set(&mut self, index: usize) -> Result<WorkoutSet> {
        if index >= self.sets.len() {
            return Err(Error::Session(format!(
                "Entry {} has no set at position {}",
                self.id,
                index + 1
            )));
        }
        let removed = self.sets.remove(index);
        for (i, set) in self.sets.iter_mut().enumerate() {
            set.set_number = i as u32 + 1;
        }
        Ok(removed)
    }
}

fn draft_sets(sets: &[WorkoutSet]) -> Vec<DraftWorkoutSet> {
    sets.iter().map(DraftWorkoutSet::from).collect()
}

fn live_sets(sets: &[DraftWorkoutSet]) -> Vec<WorkoutSet> {
    sets.iter().map(WorkoutSet::from).collect()
}

impl From<&ActiveExerciseEntry> for DraftExerciseEntry {
    fn from(entry: &ActiveExerciseEntry) -> Self {
        let exercise = &entry.exercise;
        Self {
            entry_id: entry.id,
            exercise_id: exercise.id,
            title: exercise.title.clone(),
            notes: exercise.notes.clone(),
            has_weight: exercise.has_weight,
            category_id: exercise.category.as_ref().map(|c| c.id),
            category_name: exercise.category.as_ref().map(|c| c.name.clone()),
            sets: draft_sets(&entry.sets),
            plan: entry.plan.as_ref().map(|plan| DraftPlan {
                max_weight_kg: plan.max_weight_kg,
                set_count: plan.set_count,
                sets: draft_sets(&plan.sets),
            }),
        }
    }
}

impl From<&DraftExerciseEntry> for ActiveExerciseEntry {
    fn from(entry: &DraftExerciseEntry) -> Self {
        Self {
            id: entry.entry_id,
            exercise: entry.exercise(),
            sets: live_sets(&entry.sets),
            plan: entry.plan.as_ref().map(|plan| PlanPreview {
                max_weight_kg: plan.max_weight_kg,
                set_count: plan.set_count,
                sets: live_sets(&plan.sets),
            }),
        }
    }
}
