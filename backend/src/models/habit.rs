use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub frequency: HabitFrequency,
    pub target_count: i32,
    pub is_active: bool,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "habit_frequency", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HabitFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateHabitRequest {
    #[validate(length(min = 1, max = 100, message = "Habit name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub frequency: Option<HabitFrequency>,
    #[validate(range(min = 1, message = "Target count must be at least 1"))]
    pub target_count: Option<i32>,
    pub is_active: Option<bool>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateHabitRequest {
    #[validate(length(min = 1, max = 100, message = "Habit name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub frequency: Option<HabitFrequency>,
    #[validate(range(min = 1, message = "Target count must be at least 1"))]
    pub target_count: Option<i32>,
    pub is_active: Option<bool>,
    pub category: Option<String>,
}

impl CreateHabitRequest {
    pub fn normalize(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self
    }
}

impl UpdateHabitRequest {
    pub fn normalize(mut self) -> Self {
        self.name = self.name.map(|n| n.trim().to_string());
        self
    }
}

/// Habit identity fields embedded in stats responses.
#[derive(Debug, Serialize)]
pub struct HabitRef {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

impl From<&Habit> for HabitRef {
    fn from(h: &Habit) -> Self {
        Self {
            id: h.id,
            name: h.name.clone(),
            description: h.description.clone(),
        }
    }
}
