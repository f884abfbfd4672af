//! Core domain types for the workout tracker.
//!
//! This module defines the fundamental types used throughout the system:
//! - Categories and exercises
//! - Workouts with their nested exercises and sets
//! - Display preferences (weight unit, theme, chart metric)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Catalog Types
// ============================================================================

/// A user-defined grouping of exercises (e.g. "Legs")
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// An exercise definition
///
/// Soft-deleted exercises are hidden from active lists but still resolve
/// when displaying historical workouts.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Exercise {
    pub id: i64,
    pub title: String,
    pub notes: String,
    pub has_weight: bool,
    pub category: Option<Category>,
    pub is_deleted: bool,
}

/// Fields for creating a new exercise
#[derive(Clone, Debug, Default)]
pub struct NewExercise {
    pub title: String,
    pub notes: String,
    pub has_weight: bool,
    pub category_id: Option<i64>,
}

// ============================================================================
// Workout Types
// ============================================================================

/// A single recorded set
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutSet {
    pub id: i64,
    pub workout_exercise_id: i64,
    /// 1-based, contiguous within the parent exercise entry
    pub set_number: u32,
    /// Canonical unit; display conversion happens at presentation time
    pub weight_kg: f64,
    pub reps: u32,
}

impl WorkoutSet {
    /// A set that has not been persisted yet
    pub fn new(set_number: u32, weight_kg: f64, reps: u32) -> Self {
        Self {
            id: 0,
            workout_exercise_id: 0,
            set_number,
            weight_kg,
            reps,
        }
    }

    pub fn volume(&self) -> f64 {
        self.weight_kg * f64::from(self.reps)
    }

    /// Reject weights that cannot round-trip through storage or JSON:
    /// NaN, infinities and negative values
    pub fn validate_weight(weight_kg: f64) -> crate::Result<f64> {
        if weight_kg.is_finite() && weight_kg >= 0.0 {
            Ok(weight_kg)
        } else {
            Err(crate::Error::Session(format!(
                "Weight must be a non-negative number, got {}",
                weight_kg
            )))
        }
    }
}

/// One exercise performed within a workout
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WorkoutExercise {
    pub id: i64,
    pub workout_id: i64,
    pub exercise: Exercise,
    /// 0-based, contiguous display order within the workout
    pub order_index: u32,
    pub sets: Vec<WorkoutSet>,
}

/// A workout with its ordered exercises
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Workout {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: i64,
    pub notes: String,
    pub is_finished: bool,
    pub exercises: Vec<WorkoutExercise>,
}

impl Workout {
    pub fn total_volume(&self) -> f64 {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .map(WorkoutSet::volume)
            .sum()
    }

    pub fn exercise_count(&self) -> usize {
        self.exercises.len()
    }

    pub fn total_sets(&self) -> usize {
        self.exercises.iter().map(|e| e.sets.len()).sum()
    }
}

// ============================================================================
// Presentation Preferences
// ============================================================================

const LBS_PER_KG: f64 = 2.20462;

/// Display unit for weights; storage is always kilograms
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    #[default]
    Kg,
    Lbs,
}

impl WeightUnit {
    pub fn convert_from_kg(self, kg: f64) -> f64 {
        match self {
            WeightUnit::Kg => kg,
            WeightUnit::Lbs => kg * LBS_PER_KG,
        }
    }

    pub fn convert_to_kg(self, value: f64) -> f64 {
        match self {
            WeightUnit::Kg => value,
            WeightUnit::Lbs => value / LBS_PER_KG,
        }
    }

    /// Format a stored weight for display, e.g. "100 kg" or "220.5 lbs"
    pub fn format_weight(self, kg: f64) -> String {
        let converted = self.convert_from_kg(kg);
        if converted.fract() == 0.0 {
            format!("{} {}", converted as i64, self)
        } else {
            format!("{:.1} {}", converted, self)
        }
    }
}

impl fmt::Display for WeightUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightUnit::Kg => write!(f, "kg"),
            WeightUnit::Lbs => write!(f, "lbs"),
        }
    }
}

impl FromStr for WeightUnit {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "kg" | "kgs" => Ok(WeightUnit::Kg),
            "lb" | "lbs" => Ok(WeightUnit::Lbs),
            other => Err(crate::Error::Other(format!("Unknown weight unit: {}", other))),
        }
    }
}

/// Colour scheme preference
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl fmt::Display for ThemeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThemeMode::System => write!(f, "system"),
            ThemeMode::Light => write!(f, "light"),
            ThemeMode::Dark => write!(f, "dark"),
        }
    }
}

impl FromStr for ThemeMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "system" => Ok(ThemeMode::System),
            "light" => Ok(ThemeMode::Light),
            "dark" => Ok(ThemeMode::Dark),
            other => Err(crate::Error::Other(format!("Unknown theme mode: {}", other))),
        }
    }
}

/// Which series of exercise progress to chart
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartMetric {
    #[default]
    MaxWeight,
    TotalVolume,
    MaxReps,
    SetCount,
}

impl ChartMetric {
    /// Pick this metric's value out of one progress point
    pub fn value_of(self, point: &crate::stats::ExerciseProgress) -> f64 {
        match self {
            ChartMetric::MaxWeight => point.max_weight,
            ChartMetric::TotalVolume => point.total_volume,
            ChartMetric::MaxReps => f64::from(point.max_reps),
            ChartMetric::SetCount => f64::from(point.set_count),
        }
    }
}

impl FromStr for ChartMetric {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "max_weight" | "weight" => Ok(ChartMetric::MaxWeight),
            "total_volume" | "volume" => Ok(ChartMetric::TotalVolume),
            "max_reps" | "reps" => Ok(ChartMetric::MaxReps),
            "set_count" | "sets" => Ok(ChartMetric::SetCount),
            other => Err(crate::Error::Other(format!("Unknown chart metric: {}", other))),
        }
    }
}

// ============================================================================
// Time helpers
// ============================================================================

/// Convert a stored epoch-millisecond column to a UTC timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Convert a timestamp to the epoch-millisecond representation used on disk
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_exercise() -> Exercise {
        Exercise {
            id: 1,
            title: "Bench Press".into(),
            notes: String::new(),
            has_weight: true,
            category: None,
            is_deleted: false,
        }
    }

    #[test]
    fn test_workout_totals() {
        let workout = Workout {
            id: 1,
            start_time: Utc::now(),
            end_time: None,
            duration_seconds: 0,
            notes: String::new(),
            is_finished: true,
            exercises: vec![
                WorkoutExercise {
                    id: 1,
                    workout_id: 1,
                    exercise: sample_exercise(),
                    order_index: 0,
                    sets: vec![WorkoutSet::new(1, 100.0, 5), WorkoutSet::new(2, 80.0, 10)],
                },
                WorkoutExercise {
                    id: 2,
                    workout_id: 1,
                    exercise: sample_exercise(),
                    order_index: 1,
                    sets: vec![WorkoutSet::new(1, 0.0, 12)],
                },
            ],
        };

        assert_eq!(workout.total_volume(), 1300.0);
        assert_eq!(workout.exercise_count(), 2);
        assert_eq!(workout.total_sets(), 3);
    }

    #[test]
    fn test_validate_weight() {
        assert_eq!(WorkoutSet::validate_weight(0.0).unwrap(), 0.0);
        assert_eq!(WorkoutSet::validate_weight(102.5).unwrap(), 102.5);
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -2.5] {
            assert!(matches!(
                WorkoutSet::validate_weight(bad),
                Err(crate::Error::Session(_))
            ));
        }
    }

    #[test]
    fn test_weight_unit_conversion() {
        assert_eq!(WeightUnit::Kg.convert_from_kg(100.0), 100.0);
        let lbs = WeightUnit::Lbs.convert_from_kg(100.0);
        assert!((lbs - 220.462).abs() < 1e-9);
        assert!((WeightUnit::Lbs.convert_to_kg(lbs) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_weight() {
        assert_eq!(WeightUnit::Kg.format_weight(100.0), "100 kg");
        assert_eq!(WeightUnit::Kg.format_weight(62.5), "62.5 kg");
        assert_eq!(WeightUnit::Lbs.format_weight(100.0), "220.5 lbs");
    }

    #[test]
    fn test_parse_preferences() {
        assert_eq!("LBS".parse::<WeightUnit>().unwrap(), WeightUnit::Lbs);
        assert_eq!("dark".parse::<ThemeMode>().unwrap(), ThemeMode::Dark);
        assert_eq!("total-volume".parse::<ChartMetric>().unwrap(), ChartMetric::TotalVolume);
        assert!("stone".parse::<WeightUnit>().is_err());
    }

    #[test]
    fn test_millis_roundtrip() {
        let now = from_millis(1_700_000_000_123);
        assert_eq!(to_millis(now), 1_700_000_000_123);
    }
}
