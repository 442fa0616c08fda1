//! Stateless provider API proxies.
//!
//! A request is `{ "endpoint": ..., ...params }`. Each proxy validates it
//! into a typed request, attaches a valid access token, performs one
//! upstream GET and reshapes the response into local records.

pub mod jobadder;
pub mod linkedin;
pub mod params;
pub mod upstream;

use crate::config::IntegrationKind;
use crate::error::AppError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub use jobadder::JobAdderProxy;
pub use linkedin::LinkedInProxy;

#[async_trait]
pub trait ApiProxy: Send + Sync {
    fn integration(&self) -> IntegrationKind;

    /// Validate, authenticate and forward one request
    async fn handle(&self, user_id: &str, body: Value) -> Result<Value, AppError>;

    /// `handle` with failure logging
    async fn call(&self, user_id: &str, body: Value) -> Result<Value, AppError> {
        let endpoint = endpoint_name(&body);
        let result = self.handle(user_id, body).await;

        if let Err(e) = &result {
            tracing::warn!(
                integration = %self.integration(),
                user_id = %user_id,
                endpoint = %endpoint,
                status = e.status_code().as_u16(),
                error = %e,
                "Proxy request failed"
            );
        }

        result
    }
}

/// Endpoint named in a raw request, for logging
pub fn endpoint_name(body: &Value) -> String {
    body.get("endpoint")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Deserialize a raw proxy request, mapping any mismatch to a 400
pub fn parse_request<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    if !body.is_object() {
        return Err(AppError::Validation(
            "Request body must be a JSON object".to_string(),
        ));
    }

    serde_json::from_value(body).map_err(|e| AppError::Validation(e.to_string()))
}

/// Local list envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize response: {}", e)))
}

fn reauth_message(kind: IntegrationKind) -> String {
    format!("{} is not connected or its session expired", kind.display_name())
}
