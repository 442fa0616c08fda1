use crate::{
    auth::CallerIdentity, config::IntegrationKind, error::AppError, server::AppState,
};
use axum::{extract::State, response::Json, Extension};
use serde_json::Value;

/// POST /api/jobadder-api
pub async fn jobadder_api(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    forward(&state, IntegrationKind::JobAdder, &caller, body).await
}

/// POST /api/linkedin-api
pub async fn linkedin_api(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    forward(&state, IntegrationKind::LinkedIn, &caller, body).await
}

async fn forward(
    state: &AppState,
    kind: IntegrationKind,
    caller: &CallerIdentity,
    body: Value,
) -> Result<Json<Value>, AppError> {
    let proxy = state.proxy(kind)?;
    let response = proxy.call(&caller.user_id, body).await?;
    Ok(Json(response))
}
