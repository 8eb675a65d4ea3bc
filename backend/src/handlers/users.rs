use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{ApiResponse, MessageResponse};
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiPath};
use crate::models::user::{username_from_email, CreateUserRequest, UpdateUserRequest, User};
use crate::AppState;

const DUPLICATE_USER: &str = "User with this oauth_id or email already exists";

pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(ApiResponse::list(users)))
}

pub async fn get_user(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    Ok(Json(ApiResponse::ok(user)))
}

pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    body.validate()?;

    let email = body.email.trim().to_lowercase();
    let username = body
        .username
        .clone()
        .unwrap_or_else(|| username_from_email(&email));

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, oauth_id, provider, name, email, username, avatar, timezone)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&body.oauth_id)
    .bind(body.provider.unwrap_or_default())
    .bind(body.name.trim())
    .bind(&email)
    .bind(&username)
    .bind(&body.avatar)
    .bind(body.timezone.as_deref().unwrap_or("UTC"))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::on_unique_violation(e, DUPLICATE_USER))?;

    tracing::info!(user_id = %user.id, "User created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(user))))
}

/// Users may only modify their own record.
fn ensure_self(auth_user: &AuthUser, user_id: Uuid) -> AppResult<()> {
    if auth_user.id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(user_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    ensure_self(&auth_user, user_id)?;
    body.validate()?;

    let email = body.email.as_ref().map(|e| e.trim().to_lowercase());

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            name = COALESCE($2, name),
            email = COALESCE($3, email),
            username = COALESCE($4, username),
            avatar = COALESCE($5, avatar),
            timezone = COALESCE($6, timezone),
            is_active = COALESCE($7, is_active),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(body.name.as_deref().map(str::trim))
    .bind(&email)
    .bind(&body.username)
    .bind(&body.avatar)
    .bind(&body.timezone)
    .bind(body.is_active)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::on_unique_violation(e, DUPLICATE_USER))?
    .ok_or(AppError::NotFound("User not found".into()))?;

    Ok(Json(ApiResponse::ok(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(user_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<User>>> {
    ensure_self(&auth_user, user_id)?;

    let user = sqlx::query_as::<_, User>("DELETE FROM users WHERE id = $1 RETURNING *")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    tracing::info!(user_id = %user.id, "User deleted");
    Ok(Json(
        ApiResponse::ok(user).with_message("User deleted successfully"),
    ))
}
