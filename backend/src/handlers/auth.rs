use axum::{extract::State, http::HeaderMap, Extension, Json};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    jwt::{create_token_pair, hash_token, verify_token, TokenPair, TokenType},
    middleware::AuthUser,
};
use crate::config::Config;
use crate::dto::{ApiResponse, AuthResponse, IdentityExchangeRequest, MessageResponse, RefreshRequest};
use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::models::user::{username_from_email, RefreshToken, User, UserProfile};
use crate::AppState;

pub const EXCHANGE_SECRET_HEADER: &str = "x-exchange-secret";

async fn store_refresh_token(
    db: &mut sqlx::PgConnection,
    user_id: Uuid,
    raw_refresh_token: &str,
    ttl_secs: i64,
    parent_token_id: Option<Uuid>,
) -> AppResult<Uuid> {
    let token_hash = hash_token(raw_refresh_token);
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, parent_token_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(parent_token_id)
    .execute(db)
    .await?;

    Ok(id)
}

/// Create a token pair AND persist the refresh token hash.
async fn issue_token_pair(
    db: &mut sqlx::PgConnection,
    user_id: Uuid,
    email: &str,
    config: &Config,
    parent_token_id: Option<Uuid>,
) -> AppResult<TokenPair> {
    let tokens = create_token_pair(user_id, email, config)?;
    store_refresh_token(
        db,
        user_id,
        &tokens.refresh_token,
        config.jwt_refresh_ttl_secs,
        parent_token_id,
    )
    .await?;
    Ok(tokens)
}

async fn revoke_all_user_tokens(db: &PgPool, user_id: Uuid) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = true, revoked_at = NOW()
        WHERE user_id = $1 AND revoked = false
        "#,
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

fn exchange_secret_matches(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(EXCHANGE_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        // compare digests so the comparison time does not depend on the prefix match
        .map(|provided| hash_token(provided) == hash_token(expected))
        .unwrap_or(false)
}

/// Exchange a provider profile, verified by the upstream OAuth gateway, for
/// a token pair. Creates the user on first sign-in.
pub async fn exchange_token(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<ApiJson<IdentityExchangeRequest>, AppError>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    if !exchange_secret_matches(&headers, &state.config.auth_exchange_secret) {
        tracing::warn!("Identity exchange rejected: bad or missing exchange secret");
        return Err(AppError::Unauthorized);
    }
    let ApiJson(body) = body?;
    body.validate()?;

    let email = body.email.trim().to_lowercase();

    let existing = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE oauth_id = $1 AND provider = $2",
    )
    .bind(&body.oauth_id)
    .bind(body.provider)
    .fetch_optional(&state.db)
    .await?;

    let user = match existing {
        Some(user) => {
            let user = sqlx::query_as::<_, User>(
                "UPDATE users SET last_login = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(user.id)
            .fetch_one(&state.db)
            .await?;
            tracing::info!(user_id = %user.id, "Existing user signed in");
            user
        }
        None => {
            let user = sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (id, oauth_id, provider, name, email, username, avatar)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&body.oauth_id)
            .bind(body.provider)
            .bind(body.name.trim())
            .bind(&email)
            .bind(username_from_email(&email))
            .bind(&body.avatar)
            .fetch_one(&state.db)
            .await
            .map_err(|e| {
                AppError::on_unique_violation(e, "User with this oauth_id or email already exists")
            })?;
            tracing::info!(user_id = %user.id, provider = ?user.provider, "New user created");
            user
        }
    };

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    let mut conn = state.db.acquire().await?;
    let tokens = issue_token_pair(&mut conn, user.id, &user.email, &state.config, None).await?;

    Ok(Json(ApiResponse::ok(AuthResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        expires_in: tokens.expires_in,
        user: UserProfile::from(user),
    })))
}

/// Rotate a refresh token. Presenting an already-revoked token revokes every
/// token the user holds.
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let claims = verify_token(&body.refresh_token, &state.config)?.claims;
    if claims.token_type != TokenType::Refresh {
        return Err(AppError::Unauthorized);
    }

    let token_hash = hash_token(&body.refresh_token);
    let mut tx = state.db.begin().await?;

    let stored = sqlx::query_as::<_, RefreshToken>(
        r#"
        SELECT id, user_id, token_hash, expires_at, revoked, created_at
        FROM refresh_tokens
        WHERE token_hash = $1
        FOR UPDATE
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::Unauthorized)?;

    if stored.revoked {
        tx.rollback().await?;
        let revoked = revoke_all_user_tokens(&state.db, stored.user_id).await?;
        tracing::warn!(
            user_id = %stored.user_id,
            revoked = revoked,
            "Refresh token reuse detected, all sessions revoked"
        );
        return Err(AppError::Unauthorized);
    }

    if stored.expires_at < Utc::now() || stored.user_id != claims.sub {
        return Err(AppError::Unauthorized);
    }

    sqlx::query("UPDATE refresh_tokens SET revoked = true, revoked_at = NOW() WHERE id = $1")
        .bind(stored.id)
        .execute(&mut *tx)
        .await?;

    let tokens = issue_token_pair(
        &mut tx,
        stored.user_id,
        &claims.email,
        &state.config,
        Some(stored.id),
    )
    .await?;

    tx.commit().await?;

    Ok(Json(ApiResponse::ok(tokens)))
}

/// Current user's profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<ApiResponse<UserProfile>>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(auth_user.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("User not found".into()))?;

    Ok(Json(ApiResponse::ok(UserProfile::from(user))))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<MessageResponse>> {
    let revoked = revoke_all_user_tokens(&state.db, auth_user.id).await?;
    tracing::info!(user_id = %auth_user.id, revoked = revoked, "User logged out");

    Ok(Json(MessageResponse::message("Logout successful")))
}
