use crate::error::AppError;
use axum::http::StatusCode;
use reqwest::{header, Client};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Authenticated GET client for one provider's REST API
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    headers: Vec<(&'static str, String)>,
}

impl UpstreamClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            headers: Vec::new(),
        })
    }

    /// Add a header sent with every request
    pub fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// GET `{base_url}{path_and_query}` and decode the typed response.
    ///
    /// 429 keeps its `Retry-After`, other non-2xx statuses surface with the
    /// upstream body untouched. Nothing is retried.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        access_token: &str,
        path_and_query: &str,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut request = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/json");
        for (name, value) in &self.headers {
            request = request.header(*name, value);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                response
                    .headers()
                    .get(header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            } else {
                None
            };
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(AppError::Upstream {
                status,
                message: error_text,
                retry_after,
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(url = %url, error = %e, "Unexpected upstream response shape");
            AppError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                message: format!("Unexpected upstream response: {}", e),
                retry_after: None,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Echo {
        ok: bool,
    }

    #[tokio::test]
    async fn test_sends_bearer_and_extra_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/things"))
            .and(header_eq("authorization", "Bearer tok1"))
            .and(header_eq("x-restli-protocol-version", "2.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&server.uri(), Duration::from_secs(5))
            .unwrap()
            .with_header("X-Restli-Protocol-Version", "2.0.0");
        let echo: Echo = client.get_json("tok1", "/things").await.unwrap();
        assert!(echo.ok);
    }

    #[tokio::test]
    async fn test_rate_limit_keeps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "42")
                    .set_body_string("Too Many Requests"),
            )
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.get_json::<Echo>("tok1", "/things").await.unwrap_err();

        match err {
            AppError::Upstream {
                status,
                message,
                retry_after,
            } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(message, "Too Many Requests");
                assert_eq!(retry_after.as_deref(), Some("42"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_body_passed_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string(r#"{"message":"Job not found"}"#))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.get_json::<Echo>("tok1", "/jobs/1").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("Job not found"));
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_bad_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = client.get_json::<Echo>("tok1", "/things").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
