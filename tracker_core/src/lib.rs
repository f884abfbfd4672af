#![forbid(unsafe_code)]

//! Core domain model and business logic for the workout tracker.
//!
//! This crate provides:
//! - Domain types (categories, exercises, workouts, sets)
//! - SQLite persistence with live queries
//! - Statistics (progress, records, streaks, calendar)
//! - The active-workout session with crash-safe drafts
//! - Settings and JSON/CSV export

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod natural;
pub mod db;
pub mod repository;
pub mod stats;
pub mod kv;
pub mod settings;
pub mod draft;
pub mod session;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use db::{Database, Live, Table};
pub use repository::{CategoryRepository, ExerciseRepository, WorkoutRepository};
pub use stats::{StatsRepository, StreakRule, TimeRange};
pub use settings::{Settings, SettingsRepository};
pub use draft::{DraftStore, WorkoutDraft};
pub use session::{FinishOutcome, RestTimer, SessionManager, SessionOrigin, SessionPhase, SessionSnapshot};
pub use export::{export_json, export_sets_csv, import_json, ImportSummary};
