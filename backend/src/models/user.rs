use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub oauth_id: String,
    pub provider: OAuthProvider,
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub timezone: String,
    pub is_active: bool,
    pub last_login: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "oauth_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OAuthProvider {
    #[default]
    Github,
    Google,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, message = "oauth_id is required"))]
    pub oauth_id: String,
    pub provider: Option<OAuthProvider>,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(length(max = 50, message = "Username cannot exceed 50 characters"))]
    pub username: Option<String>,
    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar: Option<String>,
    #[validate(custom = "validate_timezone")]
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[validate(email(message = "Please enter a valid email"))]
    pub email: Option<String>,
    #[validate(length(max = 50, message = "Username cannot exceed 50 characters"))]
    pub username: Option<String>,
    #[validate(url(message = "Avatar must be a URL"))]
    pub avatar: Option<String>,
    #[validate(custom = "validate_timezone")]
    pub timezone: Option<String>,
    pub is_active: Option<bool>,
}

/// Public view of a user, returned by `GET /api/auth/user`.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: Option<String>,
    pub avatar: Option<String>,
    pub timezone: String,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            name: u.name,
            email: u.email,
            username: u.username,
            avatar: u.avatar,
            timezone: u.timezone,
        }
    }
}

impl User {
    /// The user's IANA timezone, falling back to UTC when the stored name is unknown.
    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

pub fn validate_timezone(tz: &str) -> Result<(), ValidationError> {
    tz.parse::<chrono_tz::Tz>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("Unknown timezone"))
}

/// Username derived from an email address: everything before the `@`.
pub fn username_from_email(email: &str) -> String {
    email.split('@').next().unwrap_or_default().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}
