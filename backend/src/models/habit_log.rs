use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

pub const DEFAULT_LIST_LIMIT: i64 = 30;
pub const MAX_LIST_LIMIT: i64 = 500;
pub const DEFAULT_STATS_DAYS: i64 = 30;
pub const MAX_STATS_DAYS: i64 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HabitLog {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub completion_count: i32,
    pub notes: Option<String>,
    pub mood: Option<Mood>,
    pub difficulty: Option<i16>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Self-reported mood attached to a completion, ordered worst to best.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord,
)]
#[sqlx(type_name = "log_mood", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Struggling,
    Difficult,
    #[default]
    Okay,
    Good,
    Excellent,
}

impl Mood {
    /// Numeric score on a 1-5 scale.
    pub fn score(self) -> u8 {
        match self {
            Mood::Struggling => 1,
            Mood::Difficult => 2,
            Mood::Okay => 3,
            Mood::Good => 4,
            Mood::Excellent => 5,
        }
    }
}

pub const DEFAULT_DIFFICULTY: i16 = 3;

/// A log row joined with the identity of the habit it belongs to.
#[derive(Debug, FromRow)]
pub struct HabitLogRow {
    #[sqlx(flatten)]
    pub log: HabitLog,
    pub habit_name: String,
    pub habit_description: Option<String>,
    pub habit_category: String,
}

#[derive(Debug, Serialize)]
pub struct HabitSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
}

#[derive(Debug, Serialize)]
pub struct HabitLogWithHabit {
    #[serde(flatten)]
    pub log: HabitLog,
    pub habit: HabitSummary,
}

impl From<HabitLogRow> for HabitLogWithHabit {
    fn from(row: HabitLogRow) -> Self {
        let habit = HabitSummary {
            id: row.log.habit_id,
            name: row.habit_name,
            description: row.habit_description,
            category: row.habit_category,
        };
        Self {
            log: row.log,
            habit,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHabitLogRequest {
    pub habit_id: Uuid,
    pub completed_at: Option<DateTime<Utc>>,
    #[validate(range(min = 1, max = 100, message = "Completion count must be 1-100"))]
    pub completion_count: Option<i32>,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
    pub mood: Option<Mood>,
    #[validate(range(min = 1, max = 5, message = "Difficulty must be 1-5"))]
    pub difficulty: Option<i16>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateHabitLogRequest {
    #[validate(range(min = 1, max = 100, message = "Completion count must be 1-100"))]
    pub completion_count: Option<i32>,
    #[validate(length(max = 500, message = "Notes cannot exceed 500 characters"))]
    pub notes: Option<String>,
    pub mood: Option<Mood>,
    #[validate(range(min = 1, max = 5, message = "Difficulty must be 1-5"))]
    pub difficulty: Option<i16>,
}

impl UpdateHabitLogRequest {
    pub fn is_empty(&self) -> bool {
        self.completion_count.is_none()
            && self.notes.is_none()
            && self.mood.is_none()
            && self.difficulty.is_none()
    }
}

#[derive(Debug, Deserialize)]
pub struct HabitLogQuery {
    pub habit_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl HabitLogQuery {
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }

    /// Inclusive `[start, end]` bounds in UTC; the end date covers its whole day.
    pub fn bounds(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let start = self
            .start_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        let end = self
            .end_date
            .and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999))
            .map(|dt| dt.and_utc());
        (start, end)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Kept as text so a malformed value gets the JSON error envelope.
    pub days: Option<String>,
}

impl StatsQuery {
    /// Window size in days, or a message when it is not a whole number in
    /// `1..=MAX_STATS_DAYS`.
    pub fn window_days(&self) -> Result<i64, String> {
        let Some(raw) = self.days.as_deref() else {
            return Ok(DEFAULT_STATS_DAYS);
        };
        match raw.trim().parse::<i64>() {
            Ok(d) if (1..=MAX_STATS_DAYS).contains(&d) => Ok(d),
            _ => Err(format!(
                "days must be a whole number between 1 and {}",
                MAX_STATS_DAYS
            )),
        }
    }
}
