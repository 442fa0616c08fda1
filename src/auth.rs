use crate::{error::AppError, server::AppState};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

const USER_ID_HEADER: &str = "x-user-id";
const SESSION_TOKEN_PREFIX: &str = "rgs_";

/// Dashboard user on whose behalf the request runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

/// Caller identification middleware
///
/// Resolution order:
/// 1. `Authorization: Bearer <session token>`, looked up by SHA-256 hash
/// 2. `x-user-id` header, only when `server.trust_user_id_header` is set
pub async fn caller_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let user_id = match auth_header {
        Some(header) => {
            let token = extract_bearer_token(header)?;
            resolve_session(&state.db, token, chrono::Utc::now().timestamp())
                .await?
                .ok_or_else(|| AppError::Unauthorized("Invalid or expired session token".to_string()))?
        }
        None if state.config.server.trust_user_id_header => {
            let user_id = req
                .headers()
                .get(USER_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .unwrap_or_default();
            validate_user_id(user_id)?;
            user_id.to_string()
        }
        None => {
            return Err(AppError::Unauthorized(
                "Missing Authorization header".to_string(),
            ))
        }
    };

    req.extensions_mut().insert(CallerIdentity { user_id });

    Ok(next.run(req).await)
}

/// Extract Bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Result<&str, AppError> {
    const BEARER_PREFIX: &str = "Bearer ";

    if !auth_header.starts_with(BEARER_PREFIX) {
        return Err(AppError::Unauthorized(
            "Authorization header must use Bearer scheme".to_string(),
        ));
    }

    let token = &auth_header[BEARER_PREFIX.len()..];

    if token.is_empty() {
        return Err(AppError::Unauthorized("Bearer token is empty".to_string()));
    }

    Ok(token)
}

pub fn validate_user_id(user_id: &str) -> Result<(), AppError> {
    if user_id.is_empty() {
        return Err(AppError::Unauthorized("Missing user id".to_string()));
    }
    if user_id.len() > 128 || user_id.chars().any(char::is_control) {
        return Err(AppError::Unauthorized("Malformed user id".to_string()));
    }
    Ok(())
}

fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Create a session for `user_id` valid for `ttl_seconds`. Only the hash is
/// stored, the returned token is shown once.
pub async fn issue_session(
    pool: &SqlitePool,
    user_id: &str,
    ttl_seconds: i64,
    now: i64,
) -> Result<String, AppError> {
    validate_user_id(user_id)?;
    if ttl_seconds <= 0 {
        return Err(AppError::Validation("Session TTL must be positive".to_string()));
    }

    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    let token = format!("{}{}", SESSION_TOKEN_PREFIX, URL_SAFE_NO_PAD.encode(random_bytes));

    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, expires_at, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(user_id)
    .bind(now + ttl_seconds)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!(user_id = %user_id, expires_at = now + ttl_seconds, "Session issued");

    Ok(token)
}

/// User id of an unexpired session, if any
pub async fn resolve_session(
    pool: &SqlitePool,
    token: &str,
    now: i64,
) -> Result<Option<String>, AppError> {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT user_id FROM sessions WHERE token_hash = ? AND expires_at > ?")
            .bind(hash_token(token))
            .bind(now)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(user_id,)| user_id))
}
