use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::{sync::Arc, time::Instant};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod auth;
mod config;
mod db;
mod dto;
mod error;
mod extract;
mod handlers;
mod models;
mod services;

use auth::rate_limit::RateLimitState;
use config::Config;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: RateLimitState,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackstar_api=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::create_pool(&config).await?;
    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("Database migrations applied");

    let rate_limiter = RateLimitState::new();
    auth::rate_limit::spawn_cleanup_worker(rate_limiter.clone());

    let state = AppState {
        db,
        config: config.clone(),
        rate_limiter,
        started_at: Instant::now(),
    };

    let app = build_router(state);

    let addr = config.listen_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    // Client IP is needed by the rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    use handlers::{auth as auth_h, habit_logs, habits, health, tasks, users};

    let token_routes = Router::new()
        .route("/api/auth/token", post(auth_h::exchange_token))
        .route("/api/auth/refresh", post(auth_h::refresh))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::rate_limit::rate_limit_auth,
        ));

    let public_routes = Router::new()
        .route("/", get(health::root))
        .route("/api", get(health::api_info))
        .route("/api/health", get(health::health_check))
        .route("/health", get(health::health_check))
        .route("/readyz", get(health::readyz))
        .merge(token_routes);

    let protected_routes = Router::new()
        .route("/api/auth/user", get(auth_h::me))
        .route("/api/auth/logout", post(auth_h::logout))
        // Users
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Tasks
        .route("/api/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/api/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        // Habits
        .route("/api/habits", get(habits::list_habits).post(habits::create_habit))
        .route(
            "/api/habits/:id",
            get(habits::get_habit)
                .put(habits::update_habit)
                .delete(habits::delete_habit),
        )
        // Habit logs & stats
        .route(
            "/api/habit-logs",
            get(habit_logs::list_habit_logs).post(habit_logs::create_habit_log),
        )
        .route(
            "/api/habit-logs/stats/:habit_id",
            get(habit_logs::get_habit_stats),
        )
        .route(
            "/api/habit-logs/:id",
            get(habit_logs::get_habit_log)
                .put(habit_logs::update_habit_log)
                .delete(habit_logs::delete_habit_log),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::require_auth,
        ));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(route_not_found)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = std::iter::once(&config.frontend_url)
        .chain(config.cors_extra_origins.iter())
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(hv) => Some(hv),
            Err(_) => {
                tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

async fn route_not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "Route not found" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{Request, Response},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use std::net::SocketAddr;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::jwt::{create_access_token, create_refresh_token, tests::test_config};

    // The pool never connects: every request here is answered before a
    // handler reaches the database.
    fn test_app() -> Router {
        let config = test_config();
        let db = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let state = AppState {
            db,
            config: Arc::new(config),
            rate_limiter: RateLimitState::new(),
            started_at: Instant::now(),
        };
        build_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    fn bearer(user_id: Uuid) -> String {
        let token = create_access_token(user_id, "ada@example.com", &test_config()).unwrap();
        format!("Bearer {}", token)
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn request(method: &str, uri: &str, auth: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(request("GET", "/api/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "trackstar-api");
    }

    #[tokio::test]
    async fn test_api_info_lists_endpoints() {
        let response = test_app()
            .oneshot(request("GET", "/api", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["endpoints"]["habit_logs"], "/api/habit-logs");
    }

    #[tokio::test]
    async fn test_unknown_route_envelope() {
        let response = test_app()
            .oneshot(request("GET", "/api/nope", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Route not found");
    }

    #[tokio::test]
    async fn test_protected_route_requires_token() {
        let response = test_app()
            .oneshot(request("GET", "/api/habits", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let response = test_app()
            .oneshot(request("GET", "/api/tasks", Some("Bearer not.a.jwt"), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_token_cannot_access_api() {
        let refresh = create_refresh_token(Uuid::new_v4(), "ada@example.com", &test_config()).unwrap();
        let auth = format!("Bearer {}", refresh);
        let response = test_app()
            .oneshot(request("GET", "/api/habits", Some(&auth), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_stats_rejects_non_positive_window() {
        let auth = bearer(Uuid::new_v4());
        let uri = format!("/api/habit-logs/stats/{}?days=0", Uuid::new_v4());
        let response = test_app()
            .oneshot(request("GET", &uri, Some(&auth), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("days must be"));
    }

    #[tokio::test]
    async fn test_stats_rejects_non_numeric_window() {
        let auth = bearer(Uuid::new_v4());
        let uri = format!("/api/habit-logs/stats/{}?days=month", Uuid::new_v4());
        let response = test_app()
            .oneshot(request("GET", &uri, Some(&auth), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_log_update_rejected() {
        let auth = bearer(Uuid::new_v4());
        let uri = format!("/api/habit-logs/{}", Uuid::new_v4());
        let response = test_app()
            .oneshot(request("PUT", &uri, Some(&auth), Some(json!({}))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "No valid updates provided");
    }

    #[tokio::test]
    async fn test_log_difficulty_out_of_range_rejected() {
        let auth = bearer(Uuid::new_v4());
        let payload = json!({ "habit_id": Uuid::new_v4(), "difficulty": 9 });
        let response = test_app()
            .oneshot(request("POST", "/api/habit-logs", Some(&auth), Some(payload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("difficulty"));
    }

    #[tokio::test]
    async fn test_blank_task_title_rejected() {
        let auth = bearer(Uuid::new_v4());
        let response = test_app()
            .oneshot(request(
                "POST",
                "/api/tasks",
                Some(&auth),
                Some(json!({ "title": "   " })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Title is required");
    }

    #[tokio::test]
    async fn test_cannot_update_another_user() {
        let auth = bearer(Uuid::new_v4());
        let uri = format!("/api/users/{}", Uuid::new_v4());
        let response = test_app()
            .oneshot(request("PUT", &uri, Some(&auth), Some(json!({ "name": "Eve" }))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    async fn assert_bad_request_envelope(response: Response<Body>) -> String {
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        body["error"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_malformed_id_gets_json_error() {
        let auth = bearer(Uuid::new_v4());
        let response = test_app()
            .oneshot(request("GET", "/api/habits/not-a-uuid", Some(&auth), None))
            .await
            .unwrap();
        let error = assert_bad_request_envelope(response).await;
        assert!(error.contains("UUID"));
    }

    #[tokio::test]
    async fn test_log_without_habit_id_gets_json_error() {
        let auth = bearer(Uuid::new_v4());
        let response = test_app()
            .oneshot(request(
                "POST",
                "/api/habit-logs",
                Some(&auth),
                Some(json!({ "mood": "good" })),
            ))
            .await
            .unwrap();
        let error = assert_bad_request_envelope(response).await;
        assert!(error.contains("habit_id"));
    }

    #[tokio::test]
    async fn test_unparseable_date_filter_gets_json_error() {
        let auth = bearer(Uuid::new_v4());
        let response = test_app()
            .oneshot(request(
                "GET",
                "/api/habit-logs?start_date=yesterday",
                Some(&auth),
                None,
            ))
            .await
            .unwrap();
        assert_bad_request_envelope(response).await;
    }

    #[tokio::test]
    async fn test_identity_exchange_checks_secret_before_body() {
        let response = test_app()
            .oneshot(request(
                "POST",
                "/api/auth/token",
                None,
                Some(json!({ "provider": "myspace" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"], "Authentication required");
    }

    #[tokio::test]
    async fn test_identity_exchange_requires_secret() {
        let payload = json!({
            "provider": "github",
            "oauth_id": "42",
            "name": "Ada",
            "email": "ada@example.com",
        });
        let response = test_app()
            .oneshot(request("POST", "/api/auth/token", None, Some(payload)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_endpoint_rate_limited() {
        let app = test_app();
        let payload = json!({
            "provider": "github",
            "oauth_id": "42",
            "name": "Ada",
            "email": "ada@example.com",
        });
        let mut last = StatusCode::OK;
        for _ in 0..11 {
            let response = app
                .clone()
                .oneshot(request("POST", "/api/auth/token", None, Some(payload.clone())))
                .await
                .unwrap();
            last = response.status();
        }
        assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
    }
}
