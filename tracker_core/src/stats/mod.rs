//! Aggregate statistics over recorded workouts.
//!
//! Aggregation happens in SQL; the calendar-level reasoning (streaks,
//! weekly averages, day grouping) lives in [`calendar`] as pure functions
//! over local dates so it can be tested without a database.

mod calendar;

pub use calendar::{
    avg_workouts_per_week, current_streak, group_by_day, local_date, local_midnight, week_start,
    StreakRule, TimeRange,
};

use crate::db::{Database, Live, Table};
use crate::types::{from_millis, to_millis};
use crate::Result;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

/// Per-workout aggregate of the sets recorded for one exercise (or all)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExerciseProgress {
    pub start_time: DateTime<Utc>,
    pub max_weight: f64,
    pub total_volume: f64,
    pub max_reps: u32,
    pub set_count: u32,
}

/// Best marks ever recorded for one exercise title
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersonalRecord {
    pub exercise_title: String,
    pub max_weight: f64,
    pub max_reps: u32,
    /// Heaviest single set by weight x reps
    pub max_volume: f64,
}

/// Number of distinct workouts that touched a category
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CategoryWorkoutCount {
    pub category_name: String,
    pub workout_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkoutDateInfo {
    pub workout_id: i64,
    pub start_time: DateTime<Utc>,
}

/// One recorded set of an exercise, with the workout it belongs to
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SetHistoryEntry {
    pub workout_id: i64,
    pub start_time: DateTime<Utc>,
    pub set_number: u32,
    pub weight_kg: f64,
    pub reps: u32,
}

/// Everything the overview screen / `stats` command shows at once
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OverviewSummary {
    pub workouts_this_week: u32,
    pub workouts_this_month: u32,
    /// Average duration over the month, in seconds
    pub average_duration_seconds: Option<f64>,
    pub current_streak: u32,
    pub streak_rule: StreakRule,
    pub total_workouts: u32,
    pub total_volume_kg: f64,
    pub longest_workout_seconds: Option<i64>,
    pub avg_workouts_per_week: f64,
    /// Day of month -> workout ids started that (local) day
    pub calendar: BTreeMap<u32, Vec<i64>>,
}

const PROGRESS_SELECT: &str = "
    SELECT w.start_time,
           MAX(ws.weight_kg),
           SUM(ws.weight_kg * ws.reps),
           MAX(ws.reps),
           COUNT(ws.id)
    FROM workouts w
    JOIN workout_exercises we ON we.workout_id = w.id
    JOIN workout_sets ws ON ws.workout_exercise_id = we.id";

fn progress_from_row(row: &rusqlite::Row) -> rusqlite::Result<ExerciseProgress> {
    Ok(ExerciseProgress {
        start_time: from_millis(row.get(0)?),
        max_weight: row.get(1)?,
        total_volume: row.get(2)?,
        max_reps: row.get(3)?,
        set_count: row.get(4)?,
    })
}

fn exercise_progress_in(conn: &Connection, exercise_id: Option<i64>) -> Result<Vec<ExerciseProgress>> {
    let sql = format!(
        "{PROGRESS_SELECT}
         WHERE ?1 IS NULL OR we.exercise_id = ?1
         GROUP BY w.id
         ORDER BY w.start_time ASC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let rows = stmt
        .query_map(params![exercise_id], progress_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn personal_records_in(conn: &Connection) -> Result<Vec<PersonalRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT e.title,
                MAX(ws.weight_kg),
                MAX(ws.reps),
                MAX(ws.weight_kg * ws.reps)
         FROM workout_sets ws
         JOIN workout_exercises we ON we.id = ws.workout_exercise_id
         JOIN exercises e ON e.id = we.exercise_id
         GROUP BY e.title
         ORDER BY e.title COLLATE NOCASE ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(PersonalRecord {
                exercise_title: row.get(0)?,
                max_weight: row.get(1)?,
                max_reps: row.get(2)?,
                max_volume: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn category_breakdown_in(conn: &Connection) -> Result<Vec<CategoryWorkoutCount>> {
    let mut stmt = conn.prepare_cached(
        "SELECT COALESCE(c.name, 'Uncategorized') AS category_name,
                COUNT(DISTINCT we.workout_id) AS workout_count
         FROM workout_exercises we
         JOIN exercises e ON e.id = we.exercise_id
         LEFT JOIN categories c ON c.id = e.category_id
         GROUP BY category_name
         ORDER BY workout_count DESC, category_name ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(CategoryWorkoutCount {
                category_name: row.get(0)?,
                workout_count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn total_workout_count_in(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("SELECT COUNT(*) FROM workouts", [], |row| row.get(0))?)
}

/// Read-only aggregate queries
#[derive(Clone, Debug)]
pub struct StatsRepository {
    db: Database,
}

impl StatsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn workout_count(&self, range: TimeRange) -> Result<u32> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM workouts WHERE start_time >= ?1 AND start_time < ?2",
                params![to_millis(range.start), to_millis(range.end)],
                |row| row.get(0),
            )?)
        })
    }

    /// Mean duration in seconds, `None` when the range is empty
    pub fn average_duration(&self, range: TimeRange) -> Result<Option<f64>> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT AVG(duration_seconds) FROM workouts WHERE start_time >= ?1 AND start_time < ?2",
                params![to_millis(range.start), to_millis(range.end)],
                |row| row.get(0),
            )?)
        })
    }

    /// Distinct start instants in the range
    pub fn workout_dates_in_range(&self, range: TimeRange) -> Result<Vec<DateTime<Utc>>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT start_time FROM workouts
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC",
            )?;
            let dates = stmt
                .query_map(params![to_millis(range.start), to_millis(range.end)], |row| {
                    row.get::<_, i64>(0).map(from_millis)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(dates)
        })
    }

    pub fn workouts_in_range(&self, range: TimeRange) -> Result<Vec<WorkoutDateInfo>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, start_time FROM workouts
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC",
            )?;
            let rows = stmt
                .query_map(params![to_millis(range.start), to_millis(range.end)], |row| {
                    Ok(WorkoutDateInfo {
                        workout_id: row.get(0)?,
                        start_time: from_millis(row.get(1)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn total_workout_count(&self) -> Result<u32> {
        self.db.with_conn(total_workout_count_in)
    }

    pub fn observe_total_workout_count(&self) -> Result<Live<u32>> {
        self.db
            .observe(&[Table::Workouts], |db| db.with_conn(total_workout_count_in))
    }

    /// Sum of weight x reps over every recorded set
    pub fn total_volume(&self) -> Result<f64> {
        self.db.with_conn(|conn| {
            let volume: Option<f64> = conn.query_row(
                "SELECT SUM(weight_kg * reps) FROM workout_sets",
                [],
                |row| row.get(0),
            )?;
            Ok(volume.unwrap_or(0.0))
        })
    }

    pub fn first_workout_date(&self) -> Result<Option<DateTime<Utc>>> {
        self.db.with_conn(|conn| {
            let first: Option<i64> =
                conn.query_row("SELECT MIN(start_time) FROM workouts", [], |row| row.get(0))?;
            Ok(first.map(from_millis))
        })
    }

    pub fn longest_workout_duration(&self) -> Result<Option<i64>> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row("SELECT MAX(duration_seconds) FROM workouts", [], |row| {
                row.get(0)
            })?)
        })
    }

    /// Per-workout progress for one exercise, oldest first
    pub fn exercise_progress(&self, exercise_id: i64) -> Result<Vec<ExerciseProgress>> {
        self.db
            .with_conn(|conn| exercise_progress_in(conn, Some(exercise_id)))
    }

    /// Per-workout progress across every exercise, oldest first
    pub fn all_exercise_progress(&self) -> Result<Vec<ExerciseProgress>> {
        self.db.with_conn(|conn| exercise_progress_in(conn, None))
    }

    pub fn personal_records(&self) -> Result<Vec<PersonalRecord>> {
        self.db.with_conn(personal_records_in)
    }

    pub fn observe_personal_records(&self) -> Result<Live<Vec<PersonalRecord>>> {
        self.db.observe(
            &[Table::WorkoutSets, Table::WorkoutExercises, Table::Exercises],
            |db| db.with_conn(personal_records_in),
        )
    }

    pub fn category_breakdown(&self) -> Result<Vec<CategoryWorkoutCount>> {
        self.db.with_conn(category_breakdown_in)
    }

    pub fn observe_category_breakdown(&self) -> Result<Live<Vec<CategoryWorkoutCount>>> {
        self.db.observe(
            &[Table::WorkoutExercises, Table::Exercises, Table::Categories],
            |db| db.with_conn(category_breakdown_in),
        )
    }

    /// Every set recorded for an exercise, newest workout first
    pub fn exercise_set_history(&self, exercise_id: i64) -> Result<Vec<SetHistoryEntry>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT w.id, w.start_time, ws.set_number, ws.weight_kg, ws.reps
                 FROM workout_sets ws
                 JOIN workout_exercises we ON we.id = ws.workout_exercise_id
                 JOIN workouts w ON w.id = we.workout_id
                 WHERE we.exercise_id = ?1
                 ORDER BY w.start_time DESC, we.order_index ASC, ws.set_number ASC",
            )?;
            let rows = stmt
                .query_map(params![exercise_id], |row| {
                    Ok(SetHistoryEntry {
                        workout_id: row.get(0)?,
                        start_time: from_millis(row.get(1)?),
                        set_number: row.get(2)?,
                        weight_kg: row.get(3)?,
                        reps: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Day of month -> workout ids for a calendar month in `tz`
    pub fn month_calendar<Tz: TimeZone>(
        &self,
        year: i32,
        month: u32,
        tz: &Tz,
    ) -> Result<BTreeMap<u32, Vec<i64>>> {
        let range = TimeRange::month(year, month, tz)?;
        Ok(group_by_day(&self.workouts_in_range(range)?, tz))
    }

    /// Current streak as of `today` under `rule`
    pub fn current_streak<Tz: TimeZone>(&self, today: NaiveDate, tz: &Tz, rule: StreakRule) -> Result<u32> {
        let first = today
            .checked_sub_days(Days::new(rule.lookback_days()))
            .unwrap_or(NaiveDate::MIN);
        let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);
        let range = TimeRange::days(first, tomorrow, tz);

        // One entry per workout so weekly goals can count multiple per day.
        let days: Vec<NaiveDate> = self
            .workouts_in_range(range)?
            .into_iter()
            .map(|info| local_date(info.start_time, tz))
            .collect();
        Ok(current_streak(&days, today, rule))
    }

    /// Gather the overview for the month containing `today`
    pub fn overview<Tz: TimeZone>(
        &self,
        today: NaiveDate,
        tz: &Tz,
        rule: StreakRule,
    ) -> Result<OverviewSummary> {
        use chrono::Datelike;

        let month = TimeRange::month(today.year(), today.month(), tz)?;
        let week = TimeRange::week(today, tz);
        let total_workouts = self.total_workout_count()?;
        let first = self.first_workout_date()?.map(|t| local_date(t, tz));

        let summary = OverviewSummary {
            workouts_this_week: self.workout_count(week)?,
            workouts_this_month: self.workout_count(month)?,
            average_duration_seconds: self.average_duration(month)?,
            current_streak: self.current_streak(today, tz, rule)?,
            streak_rule: rule,
            total_workouts,
            total_volume_kg: self.total_volume()?,
            longest_workout_seconds: self.longest_workout_duration()?,
            avg_workouts_per_week: avg_workouts_per_week(first, total_workouts, today),
            calendar: group_by_day(&self.workouts_in_range(month)?, tz),
        };
        tracing::debug!(
            "Overview for {}: {} this month, streak {}",
            today,
            summary.workouts_this_month,
            summary.current_streak
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{CategoryRepository, ExerciseRepository, WorkoutRepository};
    use crate::{Exercise, NewExercise, Workout, WorkoutExercise, WorkoutSet};
    use chrono::Duration;

    struct Fixture {
        stats: StatsRepository,
        workouts: WorkoutRepository,
        bench: Exercise,
        squat: Exercise,
        plank: Exercise,
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let legs = CategoryRepository::new(db.clone()).insert("Legs").unwrap();
        let push = CategoryRepository::new(db.clone()).insert("Push").unwrap();
        let exercises = ExerciseRepository::new(db.clone());
        let add = |title: &str, category_id| {
            exercises
                .insert(&NewExercise {
                    title: title.into(),
                    has_weight: true,
                    category_id,
                    ..Default::default()
                })
                .unwrap()
        };
        Fixture {
            bench: add("Bench", Some(push.id)),
            squat: add("Squat", Some(legs.id)),
            plank: add("Plank", None),
            stats: StatsRepository::new(db.clone()),
            workouts: WorkoutRepository::new(db),
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn save(
        f: &Fixture,
        start: DateTime<Utc>,
        minutes: i64,
        entries: Vec<(&Exercise, Vec<(f64, u32)>)>,
    ) -> i64 {
        let exercises = entries
            .into_iter()
            .enumerate()
            .map(|(i, (exercise, sets))| WorkoutExercise {
                id: 0,
                workout_id: 0,
                exercise: exercise.clone(),
                order_index: i as u32,
                sets: sets
                    .into_iter()
                    .enumerate()
                    .map(|(n, (w, r))| WorkoutSet::new(n as u32 + 1, w, r))
                    .collect(),
            })
            .collect();
        f.workouts
            .save_full_workout(&Workout {
                id: 0,
                start_time: start,
                end_time: Some(start + Duration::minutes(minutes)),
                duration_seconds: minutes * 60,
                notes: String::new(),
                is_finished: true,
                exercises,
            })
            .unwrap()
    }

    #[test]
    fn test_empty_database() {
        let f = fixture();
        assert_eq!(f.stats.total_workout_count().unwrap(), 0);
        assert_eq!(f.stats.total_volume().unwrap(), 0.0);
        assert!(f.stats.first_workout_date().unwrap().is_none());
        assert!(f.stats.longest_workout_duration().unwrap().is_none());
        assert!(f.stats.average_duration(TimeRange::all()).unwrap().is_none());
        assert!(f.stats.personal_records().unwrap().is_empty());
    }

    #[test]
    fn test_range_counts_are_half_open() {
        let f = fixture();
        save(&f, at("2024-03-01T00:00:00Z"), 30, vec![(&f.bench, vec![(60.0, 5)])]);
        save(&f, at("2024-03-15T10:00:00Z"), 60, vec![(&f.bench, vec![(60.0, 5)])]);
        save(&f, at("2024-04-01T00:00:00Z"), 90, vec![(&f.bench, vec![(60.0, 5)])]);

        let march = TimeRange::month(2024, 3, &Utc).unwrap();
        assert_eq!(f.stats.workout_count(march).unwrap(), 2);
        assert_eq!(f.stats.average_duration(march).unwrap(), Some(2700.0));
        assert_eq!(f.stats.workout_dates_in_range(march).unwrap().len(), 2);
        assert_eq!(f.stats.longest_workout_duration().unwrap(), Some(5400));
        assert_eq!(
            f.stats.first_workout_date().unwrap(),
            Some(at("2024-03-01T00:00:00Z"))
        );
    }

    #[test]
    fn test_exercise_progress_groups_per_workout() {
        let f = fixture();
        save(
            &f,
            at("2024-03-01T10:00:00Z"),
            45,
            vec![(&f.bench, vec![(60.0, 8), (70.0, 5)]), (&f.squat, vec![(100.0, 5)])],
        );
        save(&f, at("2024-03-03T10:00:00Z"), 45, vec![(&f.bench, vec![(75.0, 3)])]);

        let progress = f.stats.exercise_progress(f.bench.id).unwrap();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].max_weight, 70.0);
        assert_eq!(progress[0].total_volume, 830.0);
        assert_eq!(progress[0].max_reps, 8);
        assert_eq!(progress[0].set_count, 2);
        assert_eq!(progress[1].max_weight, 75.0);

        let all = f.stats.all_exercise_progress().unwrap();
        assert_eq!(all[0].set_count, 3);
        assert_eq!(all[0].max_weight, 100.0);
    }

    #[test]
    fn test_personal_records_and_volume() {
        let f = fixture();
        save(&f, at("2024-03-01T10:00:00Z"), 45, vec![(&f.bench, vec![(80.0, 3), (60.0, 10)])]);
        save(&f, at("2024-03-02T10:00:00Z"), 45, vec![(&f.plank, vec![(0.0, 1)])]);

        let records = f.stats.personal_records().unwrap();
        let titles: Vec<_> = records.iter().map(|r| r.exercise_title.as_str()).collect();
        assert_eq!(titles, vec!["Bench", "Plank"]);
        assert_eq!(records[0].max_weight, 80.0);
        assert_eq!(records[0].max_reps, 10);
        assert_eq!(records[0].max_volume, 600.0);
        assert_eq!(f.stats.total_volume().unwrap(), 840.0);
    }

    #[test]
    fn test_category_breakdown_counts_distinct_workouts() {
        let f = fixture();
        save(
            &f,
            at("2024-03-01T10:00:00Z"),
            45,
            vec![(&f.bench, vec![(60.0, 5)]), (&f.bench, vec![(60.0, 5)]), (&f.plank, vec![(0.0, 1)])],
        );
        save(&f, at("2024-03-02T10:00:00Z"), 45, vec![(&f.bench, vec![(60.0, 5)])]);
        save(&f, at("2024-03-03T10:00:00Z"), 45, vec![(&f.squat, vec![(100.0, 5)])]);

        let breakdown = f.stats.category_breakdown().unwrap();
        assert_eq!(
            breakdown,
            vec![
                CategoryWorkoutCount { category_name: "Push".into(), workout_count: 2 },
                CategoryWorkoutCount { category_name: "Legs".into(), workout_count: 1 },
                CategoryWorkoutCount { category_name: "Uncategorized".into(), workout_count: 1 },
            ]
        );
    }

    #[test]
    fn test_exercise_set_history_newest_first() {
        let f = fixture();
        let older = save(&f, at("2024-03-01T10:00:00Z"), 45, vec![(&f.squat, vec![(100.0, 5), (105.0, 3)])]);
        let newer = save(&f, at("2024-03-05T10:00:00Z"), 45, vec![(&f.squat, vec![(110.0, 2)])]);

        let history = f.stats.exercise_set_history(f.squat.id).unwrap();
        let keys: Vec<_> = history.iter().map(|h| (h.workout_id, h.set_number)).collect();
        assert_eq!(keys, vec![(newer, 1), (older, 1), (older, 2)]);
    }

    #[test]
    fn test_month_calendar_and_streak() {
        let f = fixture();
        let a = save(&f, at("2024-03-08T09:00:00Z"), 30, vec![(&f.bench, vec![(60.0, 5)])]);
        let b = save(&f, at("2024-03-09T09:00:00Z"), 30, vec![(&f.bench, vec![(60.0, 5)])]);
        let c = save(&f, at("2024-03-09T18:00:00Z"), 30, vec![(&f.bench, vec![(60.0, 5)])]);

        let calendar = f.stats.month_calendar(2024, 3, &Utc).unwrap();
        assert_eq!(calendar.get(&8), Some(&vec![a]));
        assert_eq!(calendar.get(&9), Some(&vec![b, c]));

        let today = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        assert_eq!(f.stats.current_streak(today, &Utc, StreakRule::Daily).unwrap(), 2);
        // Week of 2024-03-04 has three workouts.
        assert_eq!(
            f.stats.current_streak(today, &Utc, StreakRule::WeeklyGoal(3)).unwrap(),
            1
        );
    }

    #[test]
    fn test_overview_summary() {
        let f = fixture();
        save(&f, at("2024-02-20T09:00:00Z"), 40, vec![(&f.bench, vec![(50.0, 10)])]);
        save(&f, at("2024-03-11T09:00:00Z"), 60, vec![(&f.bench, vec![(60.0, 10)])]);

        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let summary = f.stats.overview(today, &Utc, StreakRule::Daily).unwrap();
        assert_eq!(summary.workouts_this_week, 1);
        assert_eq!(summary.workouts_this_month, 1);
        assert_eq!(summary.average_duration_seconds, Some(3600.0));
        assert_eq!(summary.current_streak, 1);
        assert_eq!(summary.total_workouts, 2);
        assert_eq!(summary.total_volume_kg, 1100.0);
        assert_eq!(summary.longest_workout_seconds, Some(3600));
        assert_eq!(summary.calendar.keys().copied().collect::<Vec<_>>(), vec![11]);
        // 21 days since the first workout -> 3 weeks.
        assert!((summary.avg_workouts_per_week - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_observe_total_workout_count() {
        let f = fixture();
        let mut live = f.stats.observe_total_workout_count().unwrap();
        assert_eq!(*live.borrow_and_update(), 0);

        save(&f, Utc::now(), 10, vec![(&f.bench, vec![(60.0, 5)])]);
        tokio::time::timeout(std::time::Duration::from_secs(5), live.changed())
            .await
            .expect("count should refresh")
            .unwrap();
        assert_eq!(*live.borrow(), 1);
    }
}
