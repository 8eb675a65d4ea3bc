use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::dto::{ApiEndpoints, ApiInfo, ServiceInfo};
use crate::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "TrackStar API is running!".into(),
        api: "/api".into(),
        version: VERSION.into(),
        status: "operational".into(),
        timestamp: Utc::now(),
    })
}

pub async fn api_info() -> Json<ApiInfo> {
    Json(ApiInfo {
        message: "TrackStar API - Personal Task & Habit Tracker".into(),
        version: VERSION.into(),
        endpoints: ApiEndpoints {
            auth: "/api/auth".into(),
            users: "/api/users".into(),
            tasks: "/api/tasks".into(),
            habits: "/api/habits".into(),
            habit_logs: "/api/habit-logs".into(),
        },
        status: "operational".into(),
        timestamp: Utc::now(),
    })
}

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "trackstar-api",
        "version": VERSION,
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "timestamp": Utc::now(),
    }))
}

pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let db_ok = sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();

    if db_ok {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "checks": { "database": "ok" },
            })),
        )
    } else {
        tracing::warn!("Readiness check failed: database unreachable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not_ready",
                "checks": { "database": "failed" },
            })),
        )
    }
}
