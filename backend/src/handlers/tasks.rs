use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::middleware::AuthUser;
use crate::dto::ApiResponse;
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiPath};
use crate::models::task::{CreateTaskRequest, Task, UpdateTaskRequest};
use crate::AppState;

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<Vec<Task>>>> {
    let tasks = sqlx::query_as::<_, Task>(
        "SELECT * FROM tasks WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth_user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::list(tasks)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let task = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND user_id = $2")
        .bind(task_id)
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("Task not found".into()))?;

    Ok(Json(ApiResponse::ok(task)))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(body): ApiJson<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Task>>)> {
    let body = body.normalize();
    if body.title.is_empty() {
        return Err(AppError::Validation("Title is required".into()));
    }
    body.validate()?;

    let task = sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (id, user_id, title, description, due_date, priority, is_completed, category)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(body.due_date)
    .bind(body.priority.unwrap_or_default())
    .bind(body.is_completed.unwrap_or(false))
    .bind(body.category.as_deref().unwrap_or("general"))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(task_id = %task.id, user_id = %auth_user.id, "Task created");
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(task))))
}

pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(task_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateTaskRequest>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let body = body.normalize();
    body.validate()?;

    let task = sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks SET
            title = COALESCE($3, title),
            description = COALESCE($4, description),
            due_date = COALESCE($5, due_date),
            priority = COALESCE($6, priority),
            is_completed = COALESCE($7, is_completed),
            category = COALESCE($8, category),
            updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING *
        "#,
    )
    .bind(task_id)
    .bind(auth_user.id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(body.due_date)
    .bind(body.priority)
    .bind(body.is_completed)
    .bind(&body.category)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Task not found".into()))?;

    Ok(Json(ApiResponse::ok(task)))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiPath(task_id): ApiPath<Uuid>,
) -> AppResult<Json<ApiResponse<Task>>> {
    let task = sqlx::query_as::<_, Task>(
        "DELETE FROM tasks WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(task_id)
    .bind(auth_user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound("Task not found".into()))?;

    tracing::info!(task_id = %task.id, "Task deleted");
    Ok(Json(
        ApiResponse::ok(task).with_message("Task deleted successfully"),
    ))
}
