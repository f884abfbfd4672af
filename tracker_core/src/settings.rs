//! User preferences.

use crate::kv::KeyValueStore;
use crate::stats::StreakRule;
use crate::{Error, Result, ThemeMode, WeightUnit};
use serde::Serialize;
use std::path::PathBuf;

const THEME_MODE: &str = "theme_mode";
const DYNAMIC_COLORS: &str = "dynamic_colors";
const WEIGHT_UNIT: &str = "weight_unit";
const REST_TIMER_SECONDS: &str = "rest_timer_seconds";
const WEEKLY_GOAL: &str = "weekly_goal";
const STREAK_MODE: &str = "streak_mode";

const DEFAULT_REST_TIMER_SECONDS: u32 = 90;
const DEFAULT_WEEKLY_GOAL: u32 = 2;

/// Snapshot of every preference
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Settings {
    pub theme_mode: ThemeMode,
    pub dynamic_colors: bool,
    pub weight_unit: WeightUnit,
    pub rest_timer_seconds: u32,
    pub weekly_goal: u32,
    pub streak_rule: StreakRule,
}

/// Preferences stored in their own key-value file
///
/// Unknown or unparsable stored values read as the default.
#[derive(Clone, Debug)]
pub struct SettingsRepository {
    store: KeyValueStore,
}

impl SettingsRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            store: KeyValueStore::new(path),
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.store.get(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("Ignoring invalid value {:?} for setting {}", raw, key);
                default
            }),
            None => default,
        }
    }

    pub fn theme_mode(&self) -> ThemeMode {
        self.parsed(THEME_MODE, ThemeMode::default())
    }

    pub fn set_theme_mode(&self, mode: ThemeMode) -> Result<()> {
        self.store.set(THEME_MODE, mode.to_string())
    }

    pub fn dynamic_colors(&self) -> bool {
        self.parsed(DYNAMIC_COLORS, true)
    }

    pub fn set_dynamic_colors(&self, enabled: bool) -> Result<()> {
        self.store.set(DYNAMIC_COLORS, enabled.to_string())
    }

    pub fn weight_unit(&self) -> WeightUnit {
        self.parsed(WEIGHT_UNIT, WeightUnit::default())
    }

    pub fn set_weight_unit(&self, unit: WeightUnit) -> Result<()> {
        self.store.set(WEIGHT_UNIT, unit.to_string())
    }

    pub fn rest_timer_seconds(&self) -> u32 {
        self.parsed(REST_TIMER_SECONDS, DEFAULT_REST_TIMER_SECONDS)
    }

    pub fn set_rest_timer_seconds(&self, seconds: u32) -> Result<()> {
        self.store.set(REST_TIMER_SECONDS, seconds.to_string())
    }

    pub fn weekly_goal(&self) -> u32 {
        self.parsed(WEEKLY_GOAL, DEFAULT_WEEKLY_GOAL).max(1)
    }

    pub fn set_weekly_goal(&self, goal: u32) -> Result<()> {
        if goal == 0 {
            return Err(Error::Other("Weekly goal must be at least 1".into()));
        }
        self.store.set(WEEKLY_GOAL, goal.to_string())
    }

    /// Daily by default; weekly mode counts against the weekly goal
    pub fn streak_rule(&self) -> StreakRule {
        match self.store.get(STREAK_MODE).as_deref() {
            Some("weekly") => StreakRule::WeeklyGoal(self.weekly_goal()),
            _ => StreakRule::Daily,
        }
    }

    pub fn set_streak_weekly(&self, weekly: bool) -> Result<()> {
        self.store
            .set(STREAK_MODE, if weekly { "weekly" } else { "daily" })
    }

    pub fn all(&self) -> Settings {
        Settings {
            theme_mode: self.theme_mode(),
            dynamic_colors: self.dynamic_colors(),
            weight_unit: self.weight_unit(),
            rest_timer_seconds: self.rest_timer_seconds(),
            weekly_goal: self.weekly_goal(),
            streak_rule: self.streak_rule(),
        }
    }

    /// Set a preference from its textual key and value
    pub fn set_by_key(&self, key: &str, value: &str) -> Result<()> {
        let invalid = |what: &str| Error::Other(format!("Invalid {} value: {}", what, value));
        match key {
            "theme" | THEME_MODE => self.set_theme_mode(value.parse()?),
            "dynamic-colors" | DYNAMIC_COLORS => {
                self.set_dynamic_colors(value.parse().map_err(|_| invalid("boolean"))?)
            }
            "unit" | WEIGHT_UNIT => self.set_weight_unit(value.parse()?),
            "rest-timer" | REST_TIMER_SECONDS => {
                self.set_rest_timer_seconds(value.parse().map_err(|_| invalid("seconds"))?)
            }
            "weekly-goal" | WEEKLY_GOAL => {
                self.set_weekly_goal(value.parse().map_err(|_| invalid("goal"))?)
            }
            "streak" | STREAK_MODE => match value {
                "daily" => self.set_streak_weekly(false),
                "weekly" => self.set_streak_weekly(true),
                _ => Err(invalid("streak mode")),
            },
            other => Err(Error::Other(format!("Unknown setting: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, SettingsRepository) {
        let temp_dir = tempfile::tempdir().unwrap();
        let repo = SettingsRepository::new(temp_dir.path().join("settings.json"));
        (temp_dir, repo)
    }

    #[test]
    fn test_defaults() {
        let (_dir, repo) = repo();
        assert_eq!(
            repo.all(),
            Settings {
                theme_mode: ThemeMode::System,
                dynamic_colors: true,
                weight_unit: WeightUnit::Kg,
                rest_timer_seconds: 90,
                weekly_goal: 2,
                streak_rule: StreakRule::Daily,
            }
        );
    }

    #[test]
    fn test_setters_persist() {
        let (_dir, repo) = repo();
        repo.set_theme_mode(ThemeMode::Dark).unwrap();
        repo.set_dynamic_colors(false).unwrap();
        repo.set_weight_unit(WeightUnit::Lbs).unwrap();
        repo.set_rest_timer_seconds(120).unwrap();

        assert_eq!(repo.theme_mode(), ThemeMode::Dark);
        assert!(!repo.dynamic_colors());
        assert_eq!(repo.weight_unit(), WeightUnit::Lbs);
        assert_eq!(repo.rest_timer_seconds(), 120);
    }

    #[test]
    fn test_streak_rule_follows_weekly_goal() {
        let (_dir, repo) = repo();
        repo.set_by_key("streak", "weekly").unwrap();
        repo.set_by_key("weekly-goal", "4").unwrap();
        assert_eq!(repo.streak_rule(), StreakRule::WeeklyGoal(4));
        assert!(repo.set_weekly_goal(0).is_err());
    }

    #[test]
    fn test_invalid_stored_value_falls_back() {
        let (_dir, repo) = repo();
        repo.store.set(WEIGHT_UNIT, "stone").unwrap();
        repo.store.set(REST_TIMER_SECONDS, "soon").unwrap();
        assert_eq!(repo.weight_unit(), WeightUnit::Kg);
        assert_eq!(repo.rest_timer_seconds(), 90);
    }

    #[test]
    fn test_set_by_key_rejects_garbage() {
        let (_dir, repo) = repo();
        assert!(repo.set_by_key("unit", "stone").is_err());
        assert!(repo.set_by_key("rest-timer", "-5").is_err());
        assert!(repo.set_by_key("colour", "blue").is_err());
        repo.set_by_key("theme", "light").unwrap();
        assert_eq!(repo.theme_mode(), ThemeMode::Light);
    }
}
