use crate::config::IntegrationConfig;
use crate::error::AppError;
use crate::oauth::types::{OAuthErrorBody, TokenResponse};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Token endpoint operations of an OAuth2 provider
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Get the authorization URL the user is redirected to
    fn authorization_url(&self, state: &str) -> Result<String, AppError>;

    /// Exchange authorization code for tokens
    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError>;

    /// Obtain a new access token with a refresh token
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError>;
}

/// Standard authorization-code provider driven entirely by config. JobAdder
/// and LinkedIn both take client credentials in the form body.
pub struct HttpOAuthProvider {
    config: IntegrationConfig,
    client: Client,
}

impl HttpOAuthProvider {
    pub fn new(config: IntegrationConfig, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        operation: &str,
    ) -> Result<TokenResponse, AppError> {
        let response = self
            .client
            .post(self.config.token_url())
            .header("Accept", "application/json")
            .form(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let parsed = serde_json::from_str::<OAuthErrorBody>(&body).ok();
            let invalid_grant = parsed
                .as_ref()
                .map(|e| e.error == "invalid_grant")
                .unwrap_or(false);

            tracing::warn!(
                integration = %self.config.kind,
                operation = operation,
                status = %status,
                error = parsed.as_ref().map(|e| e.error.as_str()).unwrap_or("unknown"),
                "Token endpoint rejected request"
            );

            return Err(AppError::AuthExchange {
                message: format!("{} failed ({}): {}", operation, status, body),
                status: Some(status),
                invalid_grant,
            });
        }

        TokenResponse::parse(&body)
    }
}

#[async_trait]
impl OAuthProvider for HttpOAuthProvider {
    fn authorization_url(&self, state: &str) -> Result<String, AppError> {
        let mut url = url::Url::parse(self.config.authorize_url())
            .map_err(|e| AppError::Config(format!("Invalid authorize URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes().join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        self.post_token_request(&params, "Token exchange").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        self.post_token_request(&params, "Token refresh").await
    }
}
