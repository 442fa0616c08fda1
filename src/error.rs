use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No usable access token, the user has to go through the OAuth flow again
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Code exchange or refresh rejected by the provider
    #[error("Token exchange failed: {message}")]
    AuthExchange {
        message: String,
        status: Option<StatusCode>,
        invalid_grant: bool,
    },

    /// Non-auth failure reported by the upstream API (including 429)
    #[error("Upstream error ({status}): {message}")]
    Upstream {
        status: StatusCode,
        message: String,
        retry_after: Option<String>,
    },

    /// Missing or malformed request parameter
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller identity missing or invalid
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Integration is not present in the configuration
    #[error("Integration not configured: {0}")]
    IntegrationNotConfigured(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    /// HTTP transport failure talking to a provider
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build an exchange error from a non-2xx token endpoint response.
    pub fn auth_exchange(message: impl Into<String>) -> Self {
        Self::AuthExchange {
            message: message.into(),
            status: None,
            invalid_grant: false,
        }
    }

    /// True when the provider rejected the grant itself (revoked or expired refresh token).
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self, Self::AuthExchange { invalid_grant: true, .. })
    }

    /// HTTP status this error maps to at the transport boundary
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            Self::AuthExchange { status, .. } => status.unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Upstream { status, .. } => *status,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::IntegrationNotConfigured(_) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::HttpRequest(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            Self::AuthRequired(msg) => json!({
                "error": msg,
                "type": error_type_name(&self),
                "reauth": true,
            }),
            // Upstream JSON bodies are passed through untouched
            Self::Upstream { message, .. } => serde_json::from_str::<serde_json::Value>(message)
                .ok()
                .filter(|v| v.is_object())
                .unwrap_or_else(|| {
                    json!({
                        "error": message,
                        "type": error_type_name(&self),
                    })
                }),
            other => json!({
                "error": other.to_string(),
                "type": error_type_name(other),
            }),
        };

        let mut response = (status, Json(body)).into_response();

        if let Self::Upstream {
            retry_after: Some(retry_after),
            ..
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(retry_after) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

fn error_type_name(error: &AppError) -> &'static str {
    match error {
        AppError::AuthRequired(_) => "auth_required",
        AppError::AuthExchange { .. } => "auth_exchange_error",
        AppError::Upstream { .. } => "upstream_error",
        AppError::Validation(_) => "validation_error",
        AppError::Unauthorized(_) => "unauthorized",
        AppError::IntegrationNotConfigured(_) => "integration_not_configured",
        AppError::Config(_) => "config_error",
        AppError::Database(_) => "database_error",
        AppError::HttpRequest(_) => "http_request_error",
        AppError::Internal(_) => "internal_error",
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "Database error");
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn test_error_display() {
        let error = AppError::Validation("missing field `jobId`".to_string());
        assert_eq!(error.to_string(), "Validation error: missing field `jobId`");
    }

    #[test]
    fn test_error_type_name() {
        assert_eq!(error_type_name(&AppError::AuthRequired("x".to_string())), "auth_required");
        assert_eq!(error_type_name(&AppError::Validation("x".to_string())), "validation_error");
    }

    #[test]
    fn test_invalid_grant_detection() {
        let terminal = AppError::AuthExchange {
            message: "invalid_grant".to_string(),
            status: Some(StatusCode::BAD_REQUEST),
            invalid_grant: true,
        };
        assert!(terminal.is_invalid_grant());
        assert!(!AppError::auth_exchange("boom").is_invalid_grant());
    }

    #[tokio::test]
    async fn test_auth_required_response_has_reauth_hint() {
        let response = AppError::AuthRequired("connect jobadder".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["reauth"], true);
        assert_eq!(json["type"], "auth_required");
    }

    #[tokio::test]
    async fn test_rate_limit_response_carries_retry_after() {
        let error = AppError::Upstream {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: r#"{"message":"slow down"}"#.to_string(),
            retry_after: Some("30".to_string()),
        };
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "30");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "slow down");
    }

    #[tokio::test]
    async fn test_plain_text_upstream_body_is_wrapped() {
        let error = AppError::Upstream {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "maintenance".to_string(),
            retry_after: None,
        };
        let response = error.into_response();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "maintenance");
    }
}
