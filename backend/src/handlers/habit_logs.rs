use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::{ApiResponse, HabitStatsResponse, MessageResponse};
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::handlers::habits::find_owned_habit;
use crate::models::habit::HabitRef;
use crate::models::habit_log::{
    CreateHabitLogRequest, HabitLog, HabitLogQuery, HabitLogRow, HabitLogWithHabit,
    StatsQuery, UpdateHabitLogRequest, DEFAULT_DIFFICULTY,
};
use crate::services::habit_stats::{self, CompletionLogEntry};
use crate::AppState;

const HABIT_NOT_OWNED: &str = "Habit not found or does not belong to user";

const SELECT_WITH_HABIT: &str = r#"
    SELECT l.*,
           h.name AS habit_name,
           h.description AS habit_description,
           h.category AS habit_category
    FROM habit_logs l
    JOIN habits h ON h.id = l.habit_id
"#;

async fn fetch_log_with_habit(
    db: &PgPool,
    log_id: Uuid,
    user_id: Uuid,
) -> AppResult<Option<HabitLogWithHabit>> {
    let row = sqlx::query_as::<_, HabitLogRow>(&format!(
        "{} WHERE l.id = $1 AND l.user_id = $2",
        SELECT_WITH_HABIT
    ))
    .bind(log_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.map(HabitLogWithHabit::from))
}

pub async fn list_habit_logs(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiQuery(query): ApiQuery<HabitLogQuery>,
) -> AppResult<Json<ApiResponse<Vec<HabitLogWithHabit>>>> {
    let (start, end) = query.bounds();

    let rows = sqlx::query_as::<_, HabitLogRow>(&format!(
        r#"{}
        WHERE l.user_id = $1
          AND ($2::uuid IS NULL OR l.habit_id = $2)
          AND ($3::timestamptz IS NULL OR l.completed_at >= $3)
          AND ($4::timestamptz IS NULL OR l.completed_at <= $4)
        ORDER BY l.completed_at DESC
        LIMIT $5
        "#,
        SELECT_WITH_HABIT
    ))
    .bind(auth_user.id)
    .bind(query.habit_id)
    .bind(start)
    .bind(end)
    .bind(query.limit())
    .fetch_all(&state.db)
    .await?;

    let logs = rows.into_iter().map(HabitLogWithHabit::from).collect();
    Ok(Json(ApiResponse::list(logs)))
}

pub async fn get_habit_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(log_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<HabitLogWithHabit>>> {
    let log = fetch_log_with_habit(&state.db, log_id, auth_user.id)
        .await?
        .ok_or(AppError::NotFound("Habit log not found".into()))?;

    Ok(Json(ApiResponse::ok(log)))
}

pub async fn create_habit_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(body): ApiJson<CreateHabitLogRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<HabitLogWithHabit>>)> {
    body.validate()?;

    find_owned_habit(&state.db, body.habit_id, auth_user.id)
        .await?
        .ok_or(AppError::NotFound(HABIT_NOT_OWNED.into()))?;

    let log = sqlx::query_as::<_, HabitLog>(
        r#"
        INSERT INTO habit_logs (id, habit_id, user_id, completed_at, completion_count, notes, mood, difficulty)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(body.habit_id)
    .bind(auth_user.id)
    .bind(body.completed_at.unwrap_or_else(Utc::now))
    .bind(body.completion_count.unwrap_or(1))
    .bind(body.notes.as_deref().map(str::trim))
    .bind(body.mood.unwrap_or_default())
    .bind(body.difficulty.unwrap_or(DEFAULT_DIFFICULTY))
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::on_unique_violation(e, "Habit already logged for this date"))?;

    tracing::info!(
        log_id = %log.id,
        habit_id = %log.habit_id,
        completed_at = %log.completed_at,
        "Habit completion logged"
    );

    let log = fetch_log_with_habit(&state.db, log.id, auth_user.id)
        .await?
        .ok_or(AppError::NotFound("Habit log not found".into()))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(log).with_message("Habit completion logged successfully")),
    ))
}

pub async fn update_habit_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(log_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateHabitLogRequest>,
) -> AppResult<Json<ApiResponse<HabitLogWithHabit>>> {
    if body.is_empty() {
        return Err(AppError::Validation("No valid updates provided".into()));
    }
    body.validate()?;

    let updated = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE habit_logs SET
            completion_count = COALESCE($3, completion_count),
            notes = COALESCE($4, notes),
            mood = COALESCE($5, mood),
            difficulty = COALESCE($6, difficulty),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING id
        "#,
    )
    .bind(log_id)
    .bind(auth_user.id)
    .bind(body.completion_count)
    .bind(body.notes.as_deref().map(str::trim))
    .bind(body.mood)
    .bind(body.difficulty)
    .fetch_optional(&state.db)
    .await?;

    if updated.is_none() {
        return Err(AppError::NotFound("Habit log not found".into()));
    }

    let log = fetch_log_with_habit(&state.db, log_id, auth_user.id)
        .await?
        .ok_or(AppError::NotFound("Habit log not found".into()))?;

    Ok(Json(
        ApiResponse::ok(log).with_message("Habit log updated successfully"),
    ))
}

pub async fn delete_habit_log(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(log_id): ApiPath<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let result = sqlx::query("DELETE FROM habit_logs WHERE id = $1 AND user_id = $2")
        .bind(log_id)
        .bind(auth_user.id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Habit log not found".into()));
    }

    tracing::info!(log_id = %log_id, "Habit log deleted");
    Ok(Json(MessageResponse::message("Habit log deleted successfully")))
}

/// Completion rate, streaks and averages for one habit over the last `days`.
pub async fn get_habit_stats(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(habit_id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<StatsQuery>,
) -> AppResult<Json<ApiResponse<HabitStatsResponse>>> {
    let days = query.window_days().map_err(AppError::Validation)?;

    let habit = find_owned_habit(&state.db, habit_id, auth_user.id)
        .await?
        .ok_or(AppError::NotFound(HABIT_NOT_OWNED.into()))?;

    let timezone = sqlx::query_scalar::<_, String>("SELECT timezone FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .and_then(|tz| tz.parse::<chrono_tz::Tz>().ok())
        .unwrap_or(chrono_tz::UTC);

    let now = Utc::now();
    let window_start = now - Duration::days(days);

    let logs = sqlx::query_as::<_, HabitLog>(
        r#"
        SELECT * FROM habit_logs
        WHERE habit_id = $1 AND user_id = $2 AND completed_at BETWEEN $3 AND $4
        ORDER BY completed_at ASC
        "#,
    )
    .bind(habit_id)
    .bind(auth_user.id)
    .bind(window_start)
    .bind(now)
    .fetch_all(&state.db)
    .await?;

    let entries: Vec<CompletionLogEntry> = logs.iter().map(CompletionLogEntry::from).collect();
    let stats = habit_stats::calculate(&entries, days, &now.with_timezone(&timezone));

    tracing::debug!(
        habit_id = %habit_id,
        days = days,
        completions = stats.total_completions,
        current_streak = stats.current_streak,
        "Habit stats computed"
    );

    Ok(Json(ApiResponse::ok(HabitStatsResponse {
        habit: HabitRef::from(&habit),
        period: HabitStatsResponse::period_label(days),
        stats,
    })))
}
