use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub integrations: Vec<IntegrationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
    /// Accept the `x-user-id` header as caller identity (only behind a trusted edge)
    #[serde(default)]
    pub trust_user_id_header: bool,
    /// Timeout applied to every upstream HTTP call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            trust_user_id_header: false,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Secret used to derive the token encryption key. Tokens are stored in
    /// clear when unset.
    #[serde(default)]
    pub encryption_secret: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            encryption_secret: None,
        }
    }
}

/// Token lifecycle settings shared by all integrations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthSettings {
    /// Minimum remaining lifetime of an access token handed to callers
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: i64,
    /// How long an issued anti-forgery state stays valid
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
    /// How long a consumed authorization code is remembered
    #[serde(default = "default_processed_code_ttl")]
    pub processed_code_ttl_seconds: i64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            refresh_margin_seconds: default_refresh_margin(),
            state_ttl_seconds: default_state_ttl(),
            processed_code_ttl_seconds: default_processed_code_ttl(),
        }
    }
}

/// External provider the gateway holds tokens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    JobAdder,
    LinkedIn,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobAdder => "jobadder",
            Self::LinkedIn => "linkedin",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::JobAdder => "JobAdder",
            Self::LinkedIn => "LinkedIn",
        }
    }

    fn default_authorize_url(&self) -> &'static str {
        match self {
            Self::JobAdder => "https://id.jobadder.com/connect/authorize",
            Self::LinkedIn => "https://www.linkedin.com/oauth/v2/authorization",
        }
    }

    fn default_token_url(&self) -> &'static str {
        match self {
            Self::JobAdder => "https://id.jobadder.com/connect/token",
            Self::LinkedIn => "https://www.linkedin.com/oauth/v2/accessToken",
        }
    }

    fn default_api_base_url(&self) -> &'static str {
        match self {
            Self::JobAdder => "https://api.jobadder.com/v2",
            Self::LinkedIn => "https://api.linkedin.com/rest",
        }
    }

    fn default_scopes(&self) -> Vec<String> {
        let scopes: &[&str] = match self {
            Self::JobAdder => &["read", "write", "offline_access"],
            Self::LinkedIn => &["r_ads", "r_ads_reporting", "rw_ads"],
        };
        scopes.iter().map(|s| s.to_string()).collect()
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jobadder" => Ok(Self::JobAdder),
            "linkedin" => Ok(Self::LinkedIn),
            other => Err(format!("unknown integration '{}'", other)),
        }
    }
}

/// Raw integration section as written in config.toml. Endpoint URLs fall
/// back to the provider's public defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegrationConfig {
    pub kind: IntegrationKind,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// Overrides `oauth.refresh_margin_seconds` for this integration
    #[serde(default)]
    pub refresh_margin_seconds: Option<i64>,
    /// LinkedIn-Version header value
    #[serde(default)]
    pub api_version: Option<String>,
}

impl IntegrationConfig {
    /// Minimal config with provider defaults, used by tests and tooling.
    pub fn new(
        kind: IntegrationKind,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorize_url: None,
            token_url: None,
            api_base_url: None,
            scopes: None,
            refresh_margin_seconds: None,
            api_version: None,
        }
    }

    pub fn authorize_url(&self) -> &str {
        self.authorize_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_authorize_url())
    }

    pub fn token_url(&self) -> &str {
        self.token_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_token_url())
    }

    pub fn api_base_url(&self) -> &str {
        self.api_base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_api_base_url())
            .trim_end_matches('/')
    }

    pub fn scopes(&self) -> Vec<String> {
        self.scopes
            .clone()
            .unwrap_or_else(|| self.kind.default_scopes())
    }

    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or("202401")
    }

    pub fn refresh_margin(&self, settings: &OAuthSettings) -> i64 {
        self.refresh_margin_seconds
            .unwrap_or(settings.refresh_margin_seconds)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database_path() -> String {
    "./data/recruit-gateway.db".to_string()
}

fn default_refresh_margin() -> i64 {
    300
}

fn default_state_ttl() -> i64 {
    600
}

fn default_processed_code_ttl() -> i64 {
    600
}

impl Config {
    pub fn integration(&self, kind: IntegrationKind) -> Option<&IntegrationConfig> {
        self.integrations.iter().find(|i| i.kind == kind)
    }
}

/// Load configuration from the given TOML file, layered with
/// `RECRUIT_GATEWAY__*` environment variables.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("RECRUIT_GATEWAY").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.integrations.is_empty() {
        anyhow::bail!("At least one integration must be configured");
    }

    let mut seen = std::collections::HashSet::new();
    for integration in &cfg.integrations {
        if !seen.insert(integration.kind) {
            anyhow::bail!("Integration '{}' is configured more than once", integration.kind);
        }
        if integration.client_id.trim().is_empty() {
            anyhow::bail!("Integration '{}' has an empty client_id", integration.kind);
        }
        if integration.client_secret.trim().is_empty() {
            anyhow::bail!("Integration '{}' has an empty client_secret", integration.kind);
        }
        for (field, value) in [
            ("redirect_uri", integration.redirect_uri.as_str()),
            ("authorize_url", integration.authorize_url()),
            ("token_url", integration.token_url()),
            ("api_base_url", integration.api_base_url()),
        ] {
            if let Err(e) = url::Url::parse(value) {
                anyhow::bail!("Integration '{}' has an invalid {}: {}", integration.kind, field, e);
            }
        }

        let margin = integration.refresh_margin(&cfg.oauth);
        if !(0..86_400).contains(&margin) {
            anyhow::bail!(
                "Integration '{}' refresh margin must be between 0 and 86399 seconds",
                integration.kind
            );
        }
    }

    if cfg.oauth.state_ttl_seconds <= 0 || cfg.oauth.processed_code_ttl_seconds <= 0 {
        anyhow::bail!("OAuth state and processed code TTLs must be positive");
    }

    if let Some(secret) = &cfg.database.encryption_secret {
        if secret.len() < 16 {
            anyhow::bail!("database.encryption_secret must be at least 16 characters");
        }
    }

    match cfg.server.log_format.as_str() {
        "pretty" | "json" => {}
        other => anyhow::bail!("Invalid log_format '{}', expected 'pretty' or 'json'", other),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn create_test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            oauth: OAuthSettings::default(),
            integrations: vec![
                IntegrationConfig::new(
                    IntegrationKind::JobAdder,
                    "ja-client",
                    "ja-secret",
                    "https://dashboard.example.com/oauth/jobadder",
                ),
                IntegrationConfig::new(
                    IntegrationKind::LinkedIn,
                    "li-client",
                    "li-secret",
                    "https://dashboard.example.com/oauth/linkedin",
                ),
            ],
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&create_test_config()).is_ok());
    }

    #[test]
    fn test_validate_config_requires_integration() {
        let mut cfg = create_test_config();
        cfg.integrations.clear();

        let result = validate_config(&cfg);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("At least one integration"));
    }

    #[test]
    fn test_validate_config_rejects_duplicates() {
        let mut cfg = create_test_config();
        cfg.integrations.push(cfg.integrations[0].clone());

        let result = validate_config(&cfg);
        assert!(result.unwrap_err().to_string().contains("more than once"));
    }

    #[test]
    fn test_validate_config_rejects_bad_url() {
        let mut cfg = create_test_config();
        cfg.integrations[1].token_url = Some("not a url".to_string());

        let result = validate_config(&cfg);
        assert!(result.unwrap_err().to_string().contains("token_url"));
    }

    #[test]
    fn test_validate_config_rejects_short_secret() {
        let mut cfg = create_test_config();
        cfg.database.encryption_secret = Some("short".to_string());
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_provider_defaults() {
        let cfg = create_test_config();
        let jobadder = cfg.integration(IntegrationKind::JobAdder).unwrap();
        assert_eq!(jobadder.token_url(), "https://id.jobadder.com/connect/token");
        assert!(jobadder.scopes().contains(&"offline_access".to_string()));

        let linkedin = cfg.integration(IntegrationKind::LinkedIn).unwrap();
        assert_eq!(linkedin.api_base_url(), "https://api.linkedin.com/rest");
        assert_eq!(linkedin.api_version(), "202401");
    }

    #[test]
    fn test_single_margin_with_override() {
        let mut cfg = create_test_config();
        assert_eq!(cfg.integrations[0].refresh_margin(&cfg.oauth), 300);
        assert_eq!(cfg.integrations[1].refresh_margin(&cfg.oauth), 300);

        cfg.integrations[1].refresh_margin_seconds = Some(600);
        assert_eq!(cfg.integrations[1].refresh_margin(&cfg.oauth), 600);
    }

    #[test]
    fn test_integration_kind_parsing() {
        assert_eq!("JobAdder".parse::<IntegrationKind>().unwrap(), IntegrationKind::JobAdder);
        assert_eq!("linkedin".parse::<IntegrationKind>().unwrap(), IntegrationKind::LinkedIn);
        assert!("salesforce".parse::<IntegrationKind>().is_err());
    }

    #[test]
    fn test_load_config_from_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090

[oauth]
refresh_margin_seconds = 120

[[integrations]]
kind = "jobadder"
client_id = "abc"
client_secret = "def"
redirect_uri = "http://localhost:3000/callback"
"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.oauth.refresh_margin_seconds, 120);
        assert_eq!(cfg.integrations.len(), 1);
        assert_eq!(cfg.integrations[0].kind, IntegrationKind::JobAdder);
    }
}
