use crate::config::IntegrationKind;
use crate::crypto::TokenCipher;
use crate::error::AppError;
use crate::oauth::types::{parse_scopes, TokenRecord};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence for token records, one per (user, integration)
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(
        &self,
        user_id: &str,
        integration: IntegrationKind,
    ) -> Result<Option<TokenRecord>, AppError>;

    /// Insert or replace the record as a single write
    async fn put(&self, record: &TokenRecord) -> Result<(), AppError>;

    /// Returns true if a record was removed
    async fn delete(&self, user_id: &str, integration: IntegrationKind) -> Result<bool, AppError>;

    async fn list(&self, integration: IntegrationKind) -> Result<Vec<TokenRecord>, AppError>;
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<(String, IntegrationKind), TokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(
        &self,
        user_id: &str,
        integration: IntegrationKind,
    ) -> Result<Option<TokenRecord>, AppError> {
        let tokens = self.tokens.read().await;
        Ok(tokens.get(&(user_id.to_string(), integration)).cloned())
    }

    async fn put(&self, record: &TokenRecord) -> Result<(), AppError> {
        let mut tokens = self.tokens.write().await;
        tokens.insert(
            (record.user_id.clone(), record.integration),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, user_id: &str, integration: IntegrationKind) -> Result<bool, AppError> {
        let mut tokens = self.tokens.write().await;
        Ok(tokens.remove(&(user_id.to_string(), integration)).is_some())
    }

    async fn list(&self, integration: IntegrationKind) -> Result<Vec<TokenRecord>, AppError> {
        let tokens = self.tokens.read().await;
        let mut records: Vec<TokenRecord> = tokens
            .values()
            .filter(|r| r.integration == integration)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(records)
    }
}

const SALT_KEY: &str = "token_salt";

/// SQLite-backed store. Access and refresh tokens are encrypted when a
/// cipher is configured.
#[derive(Debug)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
    cipher: Option<TokenCipher>,
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    user_id: String,
    integration: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_at: i64,
    scopes: String,
    token_type: String,
    created_at: i64,
    last_refreshed_at: i64,
}

impl SqliteTokenStore {
    /// Open the store. With a secret, the key is derived from it and a salt
    /// persisted in `store_meta` (generated on first use).
    pub async fn new(pool: SqlitePool, encryption_secret: Option<&str>) -> Result<Self, AppError> {
        let cipher = match encryption_secret {
            Some(secret) => {
                let salt = Self::load_or_create_salt(&pool).await?;
                Some(TokenCipher::derive(secret, &salt)?)
            }
            None => {
                tracing::warn!("No database.encryption_secret configured, OAuth tokens are stored unencrypted");
                None
            }
        };

        Ok(Self { pool, cipher })
    }

    async fn load_or_create_salt(pool: &SqlitePool) -> Result<String, AppError> {
        sqlx::query("INSERT OR IGNORE INTO store_meta (key, value) VALUES (?, ?)")
            .bind(SALT_KEY)
            .bind(TokenCipher::generate_salt())
            .execute(pool)
            .await?;

        let (salt,): (String,) = sqlx::query_as("SELECT value FROM store_meta WHERE key = ?")
            .bind(SALT_KEY)
            .fetch_one(pool)
            .await?;

        Ok(salt)
    }

    fn seal(&self, value: &str) -> Result<String, AppError> {
        match &self.cipher {
            Some(cipher) => cipher.encrypt(value),
            None => Ok(value.to_string()),
        }
    }

    fn open(&self, value: &str) -> Result<String, AppError> {
        match &self.cipher {
            Some(cipher) => cipher.decrypt(value),
            None => Ok(value.to_string()),
        }
    }

    fn row_to_record(&self, row: TokenRow) -> Result<TokenRecord, AppError> {
        let integration = row
            .integration
            .parse::<IntegrationKind>()
            .map_err(AppError::Database)?;

        Ok(TokenRecord {
            user_id: row.user_id,
            integration,
            access_token: self.open(&row.access_token)?,
            refresh_token: row.refresh_token.map(|t| self.open(&t)).transpose()?,
            expires_at: row.expires_at,
            scopes: parse_scopes(&row.scopes),
            token_type: row.token_type,
            created_at: row.created_at,
            last_refreshed_at: row.last_refreshed_at,
        })
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(
        &self,
        user_id: &str,
        integration: IntegrationKind,
    ) -> Result<Option<TokenRecord>, AppError> {
        let row = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, integration, access_token, refresh_token, expires_at,
                   scopes, token_type, created_at, last_refreshed_at
            FROM oauth_tokens
            WHERE user_id = ? AND integration = ?
            "#,
        )
        .bind(user_id)
        .bind(integration.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| self.row_to_record(r)).transpose()
    }

    async fn put(&self, record: &TokenRecord) -> Result<(), AppError> {
        let access_token = self.seal(&record.access_token)?;
        let refresh_token = record
            .refresh_token
            .as_deref()
            .map(|t| self.seal(t))
            .transpose()?;
        let scopes = record.scopes.iter().cloned().collect::<Vec<_>>().join(" ");

        sqlx::query(
            r#"
            INSERT INTO oauth_tokens (
                user_id, integration, access_token, refresh_token, expires_at,
                scopes, token_type, created_at, last_refreshed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, integration) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                scopes = excluded.scopes,
                token_type = excluded.token_type,
                created_at = excluded.created_at,
                last_refreshed_at = excluded.last_refreshed_at
            "#,
        )
        .bind(&record.user_id)
        .bind(record.integration.as_str())
        .bind(access_token)
        .bind(refresh_token)
        .bind(record.expires_at)
        .bind(scopes)
        .bind(&record.token_type)
        .bind(record.created_at)
        .bind(record.last_refreshed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: &str, integration: IntegrationKind) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM oauth_tokens WHERE user_id = ? AND integration = ?")
            .bind(user_id)
            .bind(integration.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, integration: IntegrationKind) -> Result<Vec<TokenRecord>, AppError> {
        let rows = sqlx::query_as::<_, TokenRow>(
            r#"
            SELECT user_id, integration, access_token, refresh_token, expires_at,
                   scopes, token_type, created_at, last_refreshed_at
            FROM oauth_tokens
            WHERE integration = ?
            ORDER BY user_id ASC
            "#,
        )
        .bind(integration.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| self.row_to_record(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn create_test_record(user_id: &str) -> TokenRecord {
        TokenRecord {
            user_id: user_id.to_string(),
            integration: IntegrationKind::JobAdder,
            access_token: "test_access_token".to_string(),
            refresh_token: Some("test_refresh_token".to_string()),
            expires_at: 1_700_003_600,
            scopes: BTreeSet::from(["read".to_string(), "offline_access".to_string()]),
            token_type: "Bearer".to_string(),
            created_at: 1_700_000_000,
            last_refreshed_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryTokenStore::new();
        let record = create_test_record("user-1");

        store.put(&record).await.unwrap();
        assert_eq!(store.get("user-1", IntegrationKind::JobAdder).await.unwrap(), Some(record));
        assert!(store.get("user-1", IntegrationKind::LinkedIn).await.unwrap().is_none());

        assert!(store.delete("user-1", IntegrationKind::JobAdder).await.unwrap());
        assert!(!store.delete("user-1", IntegrationKind::JobAdder).await.unwrap());
        assert!(store.get("user-1", IntegrationKind::JobAdder).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_list_filters_integration() {
        let store = MemoryTokenStore::new();
        store.put(&create_test_record("b")).await.unwrap();
        store.put(&create_test_record("a")).await.unwrap();
        let mut linkedin = create_test_record("c");
        linkedin.integration = IntegrationKind::LinkedIn;
        store.put(&linkedin).await.unwrap();

        let users: Vec<String> = store
            .list(IntegrationKind::JobAdder)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.user_id)
            .collect();
        assert_eq!(users, vec!["a".to_string(), "b".to_string()]);
    }
}
