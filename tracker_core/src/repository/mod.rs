//! Repositories: translation between rows and domain records.
//!
//! Each repository owns a [`Database`](crate::db::Database) clone. Reads come
//! as one-shot snapshots (`list_*`, `get_*`) or live subscriptions
//! (`observe_*`); multi-row writes run inside a single transaction and
//! publish the tables they touched.

mod category;
mod exercise;
mod workout;

pub use category::CategoryRepository;
pub use exercise::ExerciseRepository;
pub use workout::WorkoutRepository;

pub(crate) use exercise::{exercise_from_row, EXERCISE_COLUMNS};
pub(crate) use workout::insert_full_workout;

use crate::Category;

fn category_from_columns(id: Option<i64>, name: Option<String>) -> Option<Category> {
    match (id, name) {
        (Some(id), Some(name)) => Some(Category { id, name }),
        _ => None,
    }
}
