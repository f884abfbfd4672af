//! Calendar arithmetic over local dates: time ranges, streaks, weekly
//! averages and month grouping.

use crate::{Error, Result};
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Half-open `[start, end)` interval of instants
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Midnight of `date` in `tz`, as a UTC instant
///
/// Falls back to treating the date as UTC when midnight does not exist
/// locally (DST gap).
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Local calendar date of a stored instant
pub fn local_date<Tz: TimeZone>(time: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    time.with_timezone(tz).date_naive()
}

/// Monday of the week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = u64::from(date.weekday().num_days_from_monday());
    date - Days::new(offset)
}

impl TimeRange {
    /// Local days `[first, last_exclusive)`
    pub fn days<Tz: TimeZone>(first: NaiveDate, last_exclusive: NaiveDate, tz: &Tz) -> Self {
        Self {
            start: local_midnight(first, tz),
            end: local_midnight(last_exclusive, tz),
        }
    }

    /// The calendar month `year-month` in `tz`
    pub fn month<Tz: TimeZone>(year: i32, month: u32, tz: &Tz) -> Result<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| Error::Other(format!("Invalid month: {}-{:02}", year, month)))?;
        let next = first
            .checked_add_months(chrono::Months::new(1))
            .ok_or_else(|| Error::Other(format!("Month out of range: {}-{:02}", year, month)))?;
        Ok(Self::days(first, next, tz))
    }

    /// Monday through Sunday of the week containing `date`
    pub fn week<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        let monday = week_start(date);
        Self::days(monday, monday + Days::new(7), tz)
    }

    /// The whole timeline
    pub fn all() -> Self {
        Self {
            start: DateTime::<Utc>::MIN_UTC,
            end: DateTime::<Utc>::MAX_UTC,
        }
    }
}

/// How the current streak is counted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakRule {
    /// Consecutive days with at least one workout
    #[default]
    Daily,
    /// Consecutive Monday-based weeks with at least this many workouts
    WeeklyGoal(u32),
}

impl StreakRule {
    /// How many days of history are needed to evaluate a streak
    pub fn lookback_days(self) -> u64 {
        match self {
            StreakRule::Daily => 366,
            StreakRule::WeeklyGoal(_) => 53 * 7,
        }
    }

    /// Unit label for display ("days" / "weeks")
    pub fn unit(self) -> &'static str {
        match self {
            StreakRule::Daily => "days",
            StreakRule::WeeklyGoal(_) => "weeks",
        }
    }
}

/// Current streak given the local date of every workout
///
/// Daily: consecutive days ending today, or yesterday if today has no
/// workout yet. Weekly: consecutive weeks meeting the goal; the running
/// week only counts once it has met the goal.
pub fn current_streak(workout_days: &[NaiveDate], today: NaiveDate, rule: StreakRule) -> u32 {
    match rule {
        StreakRule::Daily => daily_streak(workout_days, today),
        StreakRule::WeeklyGoal(goal) => weekly_streak(workout_days, today, goal.max(1)),
    }
}

fn daily_streak(workout_days: &[NaiveDate], today: NaiveDate) -> u32 {
    let days: BTreeSet<NaiveDate> = workout_days.iter().copied().collect();

    let mut check = today;
    if !days.contains(&check) {
        match check.pred_opt() {
            Some(yesterday) => check = yesterday,
            None => return 0,
        }
    }

    let mut streak = 0;
    while days.contains(&check) {
        streak += 1;
        match check.pred_opt() {
            Some(prev) => check = prev,
            None => break,
        }
    }
    streak
}

fn weekly_streak(workout_days: &[NaiveDate], today: NaiveDate, goal: u32) -> u32 {
    let mut per_week: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for day in workout_days {
        *per_week.entry(week_start(*day)).or_default() += 1;
    }
    let met = |week: NaiveDate| per_week.get(&week).copied().unwrap_or(0) >= goal;

    let current = week_start(today);
    let mut streak = u32::from(met(current));
    let mut week = current;
    while let Some(prev) = week.checked_sub_days(Days::new(7)) {
        if !met(prev) {
            break;
        }
        streak += 1;
        week = prev;
    }
    streak
}

/// Average workouts per week since the first workout
///
/// At least one day is assumed to have passed.
pub fn avg_workouts_per_week(first: Option<NaiveDate>, count: u32, today: NaiveDate) -> f64 {
    match first {
        Some(first) if count > 0 => {
            let days = (today - first).num_days().max(1);
            f64::from(count) / (days as f64 / 7.0)
        }
        _ => 0.0,
    }
}

/// Group workouts by local day of month
pub fn group_by_day<Tz: TimeZone>(
    workouts: &[super::WorkoutDateInfo],
    tz: &Tz,
) -> BTreeMap<u32, Vec<i64>> {
    let mut days: BTreeMap<u32, Vec<i64>> = BTreeMap::new();
    for info in workouts {
        days.entry(local_date(info.start_time, tz).day())
            .or_default()
            .push(info.workout_id);
    }
    days
}
