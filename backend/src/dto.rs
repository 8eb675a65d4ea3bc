//! Response envelopes and request/response shapes that are not tied to a
//! single table.
//!
//! Every success body is `{ "success": true, "data": ... }`, optionally with
//! `count` (lists) and `message`. Errors are rendered by `AppError`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::habit::HabitRef;
use crate::models::user::{OAuthProvider, UserProfile};
use crate::services::habit_stats::StatsSummary;

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            count: None,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T> ApiResponse<Vec<T>> {
    pub fn list(items: Vec<T>) -> Self {
        Self {
            count: Some(items.len()),
            ..Self::ok(items)
        }
    }
}

/// Envelope carrying only a message, for deletes and logout.
pub type MessageResponse = ApiResponse<()>;

impl MessageResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            count: None,
            data: None,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Auth
// ============================================================================

/// POST /api/auth/token: a provider profile already verified upstream
#[derive(Debug, Deserialize, Validate)]
pub struct IdentityExchangeRequest {
    pub provider: OAuthProvider,
    #[validate(length(min = 1, message = "oauth_id is required"))]
    pub oauth_id: String,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar: Option<String>,
}

/// POST /api/auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserProfile,
}

// ============================================================================
// Stats
// ============================================================================

/// GET /api/habit-logs/stats/{habit_id}
#[derive(Debug, Serialize)]
pub struct HabitStatsResponse {
    pub habit: HabitRef,
    pub period: String,
    pub stats: StatsSummary,
}

impl HabitStatsResponse {
    pub fn period_label(days: i64) -> String {
        format!("Last {} days", days)
    }
}

// ============================================================================
// System
// ============================================================================

/// GET /
#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub message: String,
    pub api: String,
    pub version: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// GET /api
#[derive(Debug, Serialize)]
pub struct ApiInfo {
    pub message: String,
    pub version: String,
    pub endpoints: ApiEndpoints,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiEndpoints {
    pub auth: String,
    pub users: String,
    pub tasks: String,
    pub habits: String,
    pub habit_logs: String,
}
