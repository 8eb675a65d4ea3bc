use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::ApiResponse;
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiPath};
use crate::models::habit::{CreateHabitRequest, Habit, UpdateHabitRequest};
use crate::AppState;

/// Load a habit only if it belongs to `user_id`.
pub(crate) async fn find_owned_habit(
    db: &PgPool,
    habit_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<Habit>> {
    let habit = sqlx::query_as::<_, Habit>("SELECT * FROM habits WHERE id = $1 AND user_id = $2")
        .bind(habit_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(habit)
}

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<Vec<Habit>>>> {
    let habits = sqlx::query_as::<_, Habit>(
        "SELECT * FROM habits WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::list(habits)))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(habit_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<Habit>>> {
    let habit = find_owned_habit(&state.db, habit_id, auth_user.id)
        .await?
        .ok_or(AppError::NotFound("Habit not found".into()))?;

    Ok(Json(ApiResponse::ok(habit)))
}

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(body): ApiJson<CreateHabitRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Habit>>)> {
    let body = body.normalize();
    if body.name.is_empty() {
        return Err(AppError::Validation("Habit name is required".into()));
    }
    body.validate()?;

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        INSERT INTO habits (id, user_id, name, description, frequency, target_count, is_active, category)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&body.name)
    .bind(&body.description)
    .bind(body.frequency.unwrap_or_default())
    .bind(body.target_count.unwrap_or(1))
    .bind(body.is_active.unwrap_or(true))
    .bind(body.category.as_deref().unwrap_or("health"))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(habit_id = %habit.id, user_id = %auth_user.id, "Habit created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(habit))))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(habit_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateHabitRequest>,
) -> AppResult<Json<ApiResponse<Habit>>> {
    let body = body.normalize();
    body.validate()?;

    let habit = sqlx::query_as::<_, Habit>(
        r#"
        UPDATE habits SET
            name = COALESCE($3, name),
            description = COALESCE($4, description),
            frequency = COALESCE($5, frequency),
            target_count = COALESCE($6, target_count),
            is_active = COALESCE($7, is_active),
            category = COALESCE($8, category),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(habit_id)
    .bind(auth_user.id)
    .bind(&body.name)
    .bind(&body.description)
    .bind(body.frequency)
    .bind(body.target_count)
    .bind(body.is_active)
    .bind(&body.category)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Habit not found".into()))?;

    Ok(Json(ApiResponse::ok(habit)))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(habit_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<Habit>>> {
    // Logs go with the habit (ON DELETE CASCADE)
    let habit = sqlx::query_as::<_, Habit>(
        "DELETE FROM habits WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(habit_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Habit not found".into()))?;

    tracing::info!(habit_id = %habit.id, "Habit deleted");
    Ok(Json(
        ApiResponse::ok(habit).with_message("Habit deleted successfully"),
    ))
}
