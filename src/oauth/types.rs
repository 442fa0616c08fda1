use crate::config::IntegrationKind;
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted credential state for one (user, integration)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub integration: IntegrationKind,
    /// Access token for API calls
    pub access_token: String,
    /// Refresh token for obtaining new access tokens
    pub refresh_token: Option<String>,
    /// Expiry of `access_token` (Unix timestamp)
    pub expires_at: i64,
    pub scopes: BTreeSet<String>,
    /// Token type (usually "Bearer")
    pub token_type: String,
    pub created_at: i64,
    pub last_refreshed_at: i64,
}

impl TokenRecord {
    /// Build the record persisted after an authorization-code exchange.
    /// Falls back to the requested scopes when the provider echoes none.
    pub fn from_exchange(
        user_id: &str,
        integration: IntegrationKind,
        response: TokenResponse,
        requested_scopes: &[String],
        now: i64,
    ) -> Self {
        let scopes = match response.scope.as_deref() {
            Some(scope) if !scope.trim().is_empty() => parse_scopes(scope),
            _ => requested_scopes.iter().cloned().collect(),
        };

        Self {
            user_id: user_id.to_string(),
            integration,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: now.saturating_add(response.expires_in),
            scopes,
            token_type: response.token_type,
            created_at: now,
            last_refreshed_at: now,
        }
    }

    /// Apply a refresh response. Access token and expiry always move
    /// together; the refresh token and scopes are kept when the provider
    /// does not rotate them.
    pub fn apply_refresh(&mut self, response: TokenResponse, now: i64) {
        self.access_token = response.access_token;
        self.expires_at = now.saturating_add(response.expires_in);
        if let Some(refresh_token) = response.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = response.scope.as_deref().filter(|s| !s.trim().is_empty()) {
            self.scopes = parse_scopes(scope);
        }
        self.token_type = response.token_type;
        self.last_refreshed_at = now;
    }

    /// Seconds of validity left at `now`
    pub fn remaining(&self, now: i64) -> i64 {
        self.expires_at - now
    }

    /// Token can be handed out: it will not expire within `margin`
    pub fn is_fresh(&self, now: i64, margin: i64) -> bool {
        now < self.expires_at - margin
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.is_some()
    }
}

/// OAuth token response from provider
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    /// LinkedIn omits this
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Longest access-token lifetime accepted from a provider (one year)
const MAX_EXPIRES_IN: i64 = 365 * 24 * 3600;

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    /// Parse and validate a token endpoint body. A missing, non-positive or
    /// implausibly large `expires_in` is rejected rather than guessed.
    pub fn parse(body: &str) -> Result<Self, AppError> {
        let response: TokenResponse = serde_json::from_str(body)
            .map_err(|e| AppError::auth_exchange(format!("Invalid token response: {}", e)))?;

        if response.access_token.is_empty() {
            return Err(AppError::auth_exchange("Invalid token response: empty access_token"));
        }
        if response.expires_in <= 0 {
            return Err(AppError::auth_exchange(format!(
                "Invalid token response: expires_in must be positive, got {}",
                response.expires_in
            )));
        }
        if response.expires_in > MAX_EXPIRES_IN {
            return Err(AppError::auth_exchange(format!(
                "Invalid token response: expires_in {} exceeds {}",
                response.expires_in, MAX_EXPIRES_IN
            )));
        }

        Ok(response)
    }
}

/// Error body returned by token endpoints (RFC 6749 §5.2)
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Split a scope string. LinkedIn separates scopes with commas, everyone
/// else with spaces.
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope
        .split(|c: char| c == ' ' || c == ',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStatus {
    Authenticated,
    Unauthenticated,
}

/// Emitted on AUTHENTICATED <-> UNAUTHENTICATED transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    pub integration: IntegrationKind,
    pub user_id: String,
    pub status: AuthStatus,
    pub reason: String,
}

/// Connection status reported to the dashboard
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatusReport {
    pub integration: IntegrationKind,
    pub authenticated: bool,
    pub expires_at: Option<i64>,
    pub scopes: Vec<String>,
    pub has_refresh_token: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> TokenResponse {
        TokenResponse::parse(body).unwrap()
    }

    #[test]
    fn test_parse_scopes_spaces_and_commas() {
        let scopes = parse_scopes("r_ads,rw_ads r_ads_reporting ,");
        assert_eq!(scopes.len(), 3);
        assert!(scopes.contains("rw_ads"));
    }

    #[test]
    fn test_missing_expires_in_rejected() {
        let result = TokenResponse::parse(r#"{"access_token":"tok1","token_type":"Bearer"}"#);
        let err = result.unwrap_err();
        assert!(matches!(err, AppError::AuthExchange { .. }));
        assert!(err.to_string().contains("expires_in"));
    }

    #[test]
    fn test_non_positive_expires_in_rejected() {
        assert!(TokenResponse::parse(r#"{"access_token":"tok1","expires_in":0}"#).is_err());
    }

    #[test]
    fn test_oversized_expires_in_rejected() {
        let err = TokenResponse::parse(
            r#"{"access_token":"tok1","expires_in":9223372036854775807}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::AuthExchange { .. }));
        assert!(err.to_string().contains("expires_in"));

        // LinkedIn's 60-day tokens are fine
        assert!(TokenResponse::parse(r#"{"access_token":"tok1","expires_in":5184000}"#).is_ok());
    }

    #[test]
    fn test_expiry_saturates_instead_of_overflowing() {
        let record = TokenRecord::from_exchange(
            "user-1",
            IntegrationKind::JobAdder,
            TokenResponse {
                access_token: "tok1".to_string(),
                refresh_token: None,
                expires_in: i64::MAX,
                token_type: "Bearer".to_string(),
                scope: None,
            },
            &[],
            1_700_000_000,
        );
        assert_eq!(record.expires_at, i64::MAX);
    }

    #[test]
    fn test_token_type_defaults_to_bearer() {
        let parsed = response(r#"{"access_token":"tok1","expires_in":5184000}"#);
        assert_eq!(parsed.token_type, "Bearer");
    }

    #[test]
    fn test_from_exchange_uses_requested_scopes_when_absent() {
        let record = TokenRecord::from_exchange(
            "user-1",
            IntegrationKind::JobAdder,
            response(r#"{"access_token":"tok1","refresh_token":"r1","expires_in":3600}"#),
            &["read".to_string(), "offline_access".to_string()],
            1_000,
        );
        assert_eq!(record.expires_at, 4_600);
        assert!(record.scopes.contains("offline_access"));
        assert_eq!(record.created_at, 1_000);
    }

    #[test]
    fn test_refresh_preserves_refresh_token() {
        let mut record = TokenRecord::from_exchange(
            "user-1",
            IntegrationKind::JobAdder,
            response(r#"{"access_token":"tok1","refresh_token":"r1","expires_in":3600,"scope":"read"}"#),
            &[],
            1_000,
        );

        record.apply_refresh(response(r#"{"access_token":"tok2","expires_in":3600}"#), 4_000);

        assert_eq!(record.access_token, "tok2");
        assert_eq!(record.refresh_token.as_deref(), Some("r1"));
        assert_eq!(record.expires_at, 7_600);
        assert_eq!(record.last_refreshed_at, 4_000);
        assert!(record.scopes.contains("read"));
    }

    #[test]
    fn test_refresh_rotates_refresh_token() {
        let mut record = TokenRecord::from_exchange(
            "user-1",
            IntegrationKind::LinkedIn,
            response(r#"{"access_token":"tok1","refresh_token":"r1","expires_in":3600}"#),
            &[],
            0,
        );
        record.apply_refresh(
            response(r#"{"access_token":"tok2","refresh_token":"r2","expires_in":3600}"#),
            10,
        );
        assert_eq!(record.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn test_freshness_margin() {
        let record = TokenRecord::from_exchange(
            "user-1",
            IntegrationKind::JobAdder,
            response(r#"{"access_token":"tok1","expires_in":3600}"#),
            &[],
            0,
        );
        assert!(record.is_fresh(3_299, 300));
        assert!(!record.is_fresh(3_300, 300));
        assert_eq!(record.remaining(3_595), 5);
    }
}
