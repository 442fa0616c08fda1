//! Dashboard-facing OAuth endpoints: connect, callback, status, disconnect
//! and a live stream of connection changes.

use crate::{
    auth::CallerIdentity,
    config::IntegrationKind,
    error::AppError,
    oauth::{AuthStatusReport, OAuthManager},
    server::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    Extension,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Debug, Deserialize)]
pub struct CallbackRequest {
    pub code: String,
    pub state: String,
}

fn manager_for(state: &AppState, integration: &str) -> Result<Arc<OAuthManager>, AppError> {
    let kind = integration
        .parse::<IntegrationKind>()
        .map_err(AppError::IntegrationNotConfigured)?;
    state.oauth.get(kind)
}

/// GET /api/oauth/:integration/authorize
pub async fn authorize(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<Value>, AppError> {
    let manager = manager_for(&state, &integration)?;
    let url = manager.authorization_url(&caller.user_id)?;
    Ok(Json(json!({ "url": url })))
}

/// POST /api/oauth/:integration/callback
pub async fn callback(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
    Json(request): Json<CallbackRequest>,
) -> Result<Json<AuthStatusReport>, AppError> {
    let manager = manager_for(&state, &integration)?;

    if !manager.validate_callback(&caller.user_id, &request.code, &request.state) {
        return Err(AppError::Validation(
            "Invalid or expired OAuth state".to_string(),
        ));
    }

    manager
        .exchange_code_for_tokens(&caller.user_id, &request.code)
        .await?;

    Ok(Json(manager.status(&caller.user_id).await?))
}

/// GET /api/oauth/:integration/status
pub async fn status(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<Json<AuthStatusReport>, AppError> {
    let manager = manager_for(&state, &integration)?;
    Ok(Json(manager.status(&caller.user_id).await?))
}

/// DELETE /api/oauth/:integration/tokens
pub async fn clear_tokens(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<StatusCode, AppError> {
    let manager = manager_for(&state, &integration)?;
    manager.clear_tokens(&caller.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/oauth/:integration/events
///
/// Server-Sent Events carrying this caller's auth transitions.
pub async fn events(
    State(state): State<AppState>,
    Path(integration): Path<String>,
    Extension(caller): Extension<CallerIdentity>,
) -> Result<impl IntoResponse, AppError> {
    let manager = manager_for(&state, &integration)?;
    let receiver = manager.subscribe();

    Ok(Sse::new(auth_event_stream(receiver, caller.user_id)).keep_alive(KeepAlive::default()))
}

fn auth_event_stream(
    receiver: tokio::sync::broadcast::Receiver<crate::oauth::AuthEvent>,
    user_id: String,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold((receiver, user_id), |(mut receiver, user_id)| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if event.user_id == user_id => {
                    let sse = Event::default().event("auth").json_data(&event);
                    return Some((sse, (receiver, user_id)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user_id, skipped = skipped, "Auth event subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{AuthEvent, AuthStatus};
    use futures::StreamExt;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_event_stream_filters_by_user() {
        let (sender, receiver) = broadcast::channel(8);
        let mut stream = Box::pin(auth_event_stream(receiver, "user-1".to_string()));

        for user_id in ["user-2", "user-1"] {
            sender
                .send(AuthEvent {
                    integration: IntegrationKind::LinkedIn,
                    user_id: user_id.to_string(),
                    status: AuthStatus::Unauthenticated,
                    reason: "tokens cleared".to_string(),
                })
                .unwrap();
        }
        drop(sender);

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
    }
}
