use crate::clock::{Clock, SystemClock};
use crate::config::{Config, IntegrationConfig, IntegrationKind, OAuthSettings};
use crate::error::AppError;
use crate::logging::redact;
use crate::oauth::provider::{HttpOAuthProvider, OAuthProvider};
use crate::oauth::state::{PendingStates, ProcessedCodes};
use crate::oauth::token_store::TokenStore;
use crate::oauth::types::{AuthEvent, AuthStatus, AuthStatusReport, TokenRecord};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Token lifecycle for one integration: authorization, code exchange, lazy
/// refresh and revocation. All operations are keyed by user id.
pub struct OAuthManager {
    integration: IntegrationKind,
    scopes: Vec<String>,
    margin: i64,
    settings: OAuthSettings,
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn OAuthProvider>,
    clock: Arc<dyn Clock>,
    pending_states: PendingStates,
    processed_codes: ProcessedCodes,
    user_locks: DashMap<String, Arc<Mutex<()>>>,
    events: broadcast::Sender<AuthEvent>,
}

impl OAuthManager {
    pub fn new(
        config: &IntegrationConfig,
        settings: &OAuthSettings,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn OAuthProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            integration: config.kind,
            scopes: config.scopes(),
            margin: config.refresh_margin(settings),
            settings: settings.clone(),
            store,
            provider,
            clock: Arc::new(SystemClock),
            pending_states: PendingStates::new(),
            processed_codes: ProcessedCodes::new(),
            user_locks: DashMap::new(),
            events,
        }
    }

    /// Manager talking to the provider's real token endpoint
    pub fn from_config(
        config: &IntegrationConfig,
        settings: &OAuthSettings,
        store: Arc<dyn TokenStore>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let provider = HttpOAuthProvider::new(config.clone(), timeout)?;
        Ok(Self::new(config, settings, store, Arc::new(provider)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn integration(&self) -> IntegrationKind {
        self.integration
    }

    pub fn margin(&self) -> i64 {
        self.margin
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Build the consent URL and remember its state for `user_id`
    pub fn authorization_url(&self, user_id: &str) -> Result<String, AppError> {
        let state = self.pending_states.issue(user_id, self.clock.now());
        let url = self.provider.authorization_url(&state)?;

        tracing::debug!(
            integration = %self.integration,
            user_id = %user_id,
            "Issued authorization URL"
        );

        Ok(url)
    }

    /// Check a redirect callback against the most recently issued state
    pub fn validate_callback(&self, user_id: &str, code: &str, state: &str) -> bool {
        if code.trim().is_empty() {
            return false;
        }

        let valid = self.pending_states.matches(
            user_id,
            state,
            self.clock.now(),
            self.settings.state_ttl_seconds,
        );

        if !valid {
            tracing::warn!(
                integration = %self.integration,
                user_id = %user_id,
                "OAuth callback state mismatch or expired"
            );
        }

        valid
    }

    /// Redeem an authorization code and persist the resulting tokens
    pub async fn exchange_code_for_tokens(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<TokenRecord, AppError> {
        if code.trim().is_empty() {
            return Err(AppError::Validation("Authorization code is empty".to_string()));
        }

        if !self.processed_codes.claim(
            code,
            self.clock.now(),
            self.settings.processed_code_ttl_seconds,
        ) {
            tracing::warn!(
                integration = %self.integration,
                user_id = %user_id,
                "Authorization code submitted twice"
            );
            return Err(AppError::auth_exchange("Authorization code already used"));
        }

        let record = match self.redeem_code(user_id, code).await {
            Ok(record) => record,
            Err(e) => {
                self.processed_codes.release(code);
                return Err(e);
            }
        };

        self.pending_states.discard(user_id);
        self.emit(user_id, AuthStatus::Authenticated, "authorization code exchanged");

        tracing::info!(
            integration = %self.integration,
            user_id = %user_id,
            access_token = %redact(&record.access_token),
            expires_at = record.expires_at,
            has_refresh_token = record.can_refresh(),
            "OAuth tokens obtained"
        );

        Ok(record)
    }

    async fn redeem_code(&self, user_id: &str, code: &str) -> Result<TokenRecord, AppError> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.redeem_code_locked(user_id, code).await
        };
        self.release_user_lock(user_id, lock);
        result
    }

    async fn redeem_code_locked(&self, user_id: &str, code: &str) -> Result<TokenRecord, AppError> {
        let response = self.provider.exchange_code(code).await?;
        let record = TokenRecord::from_exchange(
            user_id,
            self.integration,
            response,
            &self.scopes,
            self.clock.now(),
        );
        self.store.put(&record).await?;
        Ok(record)
    }

    /// Access token with at least `margin` seconds left, refreshing when
    /// needed. `None` means the user has to authorize again.
    pub async fn get_valid_access_token(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let Some(record) = self.store.get(user_id, self.integration).await? else {
            return Ok(None);
        };

        if record.is_fresh(self.clock.now(), self.margin) {
            return Ok(Some(record.access_token));
        }

        tracing::info!(
            integration = %self.integration,
            user_id = %user_id,
            expires_at = record.expires_at,
            "Access token inside refresh margin, refreshing"
        );

        let refreshed = self.refresh(user_id, false).await?;
        Ok(refreshed.map(|r| r.access_token))
    }

    /// Refresh regardless of remaining lifetime
    pub async fn force_refresh(&self, user_id: &str) -> Result<Option<TokenRecord>, AppError> {
        self.refresh(user_id, true).await
    }

    /// Per-user lock serialising every write to a user's record
    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // The map entry goes away once no other task holds or waits on it
    fn release_user_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.user_locks
            .remove_if(user_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn refresh(&self, user_id: &str, force: bool) -> Result<Option<TokenRecord>, AppError> {
        let lock = self.user_lock(user_id);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user_id, force).await
        };
        self.release_user_lock(user_id, lock);
        result
    }

    async fn refresh_locked(
        &self,
        user_id: &str,
        force: bool,
    ) -> Result<Option<TokenRecord>, AppError> {
        // Another holder may have refreshed while we waited
        let Some(mut record) = self.store.get(user_id, self.integration).await? else {
            return Ok(None);
        };

        let fresh = record.is_fresh(self.clock.now(), self.margin);
        if fresh && !force {
            return Ok(Some(record));
        }

        let Some(refresh_token) = record.refresh_token.clone() else {
            if fresh {
                return Err(AppError::auth_exchange(format!(
                    "No refresh token stored for {}",
                    self.integration.display_name()
                )));
            }
            self.discard_record(user_id, "access token expired without refresh token")
                .await?;
            return Ok(None);
        };

        let response = match self.provider.refresh_token(&refresh_token).await {
            Ok(response) => response,
            Err(e) if e.is_invalid_grant() => {
                self.discard_record(user_id, "refresh token rejected").await?;
                return Ok(None);
            }
            Err(e) => {
                tracing::error!(
                    integration = %self.integration,
                    user_id = %user_id,
                    error = %e,
                    "Token refresh failed"
                );
                return Err(e);
            }
        };

        let old_expires_at = record.expires_at;
        let now = self.clock.now();
        record.apply_refresh(response, now);

        if !record.is_fresh(now, self.margin) {
            return Err(AppError::auth_exchange(format!(
                "Refreshed token expires in {}s, inside the {}s refresh margin",
                record.remaining(now),
                self.margin
            )));
        }

        self.store.put(&record).await?;

        tracing::info!(
            integration = %self.integration,
            user_id = %user_id,
            old_expires_at = old_expires_at,
            new_expires_at = record.expires_at,
            access_token = %redact(&record.access_token),
            "Token refreshed successfully"
        );

        Ok(Some(record))
    }

    // Unusable record: remove it and tell listeners
    async fn discard_record(&self, user_id: &str, reason: &str) -> Result<(), AppError> {
        tracing::warn!(
            integration = %self.integration,
            user_id = %user_id,
            reason = reason,
            "Discarding stored tokens, re-authorization required"
        );

        if self.store.delete(user_id, self.integration).await? {
            self.emit(user_id, AuthStatus::Unauthenticated, reason);
        }
        Ok(())
    }

    /// Disconnect the integration for `user_id`
    pub async fn clear_tokens(&self, user_id: &str) -> Result<bool, AppError> {
        // Waits for an in-flight refresh so it cannot write the record back
        let lock = self.user_lock(user_id);
        let deleted = {
            let _guard = lock.lock().await;
            self.store.delete(user_id, self.integration).await
        };
        self.release_user_lock(user_id, lock);

        let removed = deleted?;
        self.pending_states.discard(user_id);

        if removed {
            tracing::info!(
                integration = %self.integration,
                user_id = %user_id,
                "OAuth tokens cleared"
            );
            self.emit(user_id, AuthStatus::Unauthenticated, "tokens cleared");
        }

        Ok(removed)
    }

    pub async fn is_authenticated(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self.status(user_id).await?.authenticated)
    }

    pub async fn status(&self, user_id: &str) -> Result<AuthStatusReport, AppError> {
        let record = self.store.get(user_id, self.integration).await?;
        let now = self.clock.now();

        Ok(match record {
            Some(record) => AuthStatusReport {
                integration: self.integration,
                authenticated: record.is_fresh(now, self.margin) || record.can_refresh(),
                expires_at: Some(record.expires_at),
                scopes: record.scopes.iter().cloned().collect(),
                has_refresh_token: record.can_refresh(),
            },
            None => AuthStatusReport {
                integration: self.integration,
                authenticated: false,
                expires_at: None,
                scopes: Vec::new(),
                has_refresh_token: false,
            },
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn emit(&self, user_id: &str, status: AuthStatus, reason: &str) {
        // 没有订阅者时发送失败，忽略即可
        let _ = self.events.send(AuthEvent {
            integration: self.integration,
            user_id: user_id.to_string(),
            status,
            reason: reason.to_string(),
        });
    }
}

/// One manager per configured integration
#[derive(Clone, Default)]
pub struct OAuthRegistry {
    managers: HashMap<IntegrationKind, Arc<OAuthManager>>,
}

impl OAuthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config, store: Arc<dyn TokenStore>) -> Result<Self, AppError> {
        let timeout = Duration::from_secs(config.server.request_timeout_seconds);
        let mut registry = Self::new();

        for integration in &config.integrations {
            let manager =
                OAuthManager::from_config(integration, &config.oauth, store.clone(), timeout)?;
            registry.insert(manager);
        }

        Ok(registry)
    }

    pub fn insert(&mut self, manager: OAuthManager) {
        self.managers.insert(manager.integration(), Arc::new(manager));
    }

    pub fn get(&self, kind: IntegrationKind) -> Result<Arc<OAuthManager>, AppError> {
        self.managers
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::IntegrationNotConfigured(kind.display_name().to_string()))
    }

    pub fn kinds(&self) -> Vec<IntegrationKind> {
        let mut kinds: Vec<_> = self.managers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}
