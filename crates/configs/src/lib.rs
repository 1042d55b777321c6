//! # configs
//!
//! Layered settings: built-in defaults, then an optional TOML file
//! (`NEWSROOM_CONFIG`, default `newsroom.toml`), then `NEWSROOM_*`
//! environment variables with `__` between section and key, e.g.
//! `NEWSROOM_STORE__BACKEND=postgres`. A `.env` file is loaded first.

use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const CONFIG_PATH_VAR: &str = "NEWSROOM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "newsroom.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub intake: IntakeConfig,
    pub auth: AuthConfig,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub log_format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            log_format: LogFormat::Pretty,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    #[default]
    File,
    Postgres,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    pub path: String,
    pub database_url: Option<SecretString>,
    pub document_key: String,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub cache_ttl_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            path: "data/newsroom.json".into(),
            database_url: None,
            document_key: "newsroom".into(),
            max_attempts: 5,
            base_backoff_ms: 100,
            max_backoff_ms: 2_000,
            cache_ttl_ms: 2_000,
        }
    }
}

impl StoreConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub quiet_period_ms: u64,
    pub retention_ms: u64,
    pub sweep_interval_ms: u64,
    pub caption_wait_secs: u64,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            quiet_period_ms: 1_500,
            retention_ms: 30_000,
            sweep_interval_ms: 250,
            caption_wait_secs: 600,
        }
    }
}

impl IntakeConfig {
    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn caption_wait(&self) -> Duration {
        Duration::from_secs(self.caption_wait_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub admin_usernames: Vec<String>,
    pub admin_ids: Vec<i64>,
    /// Argon2 PHC string. Moderation over HTTP is refused while unset.
    pub moderator_password_hash: Option<String>,
    /// Argon2 PHC string of the key the transport bridge sends with every
    /// intake event. Intake over HTTP is refused while unset.
    pub intake_key_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<SecretString>,
    pub moderation_chat_id: Option<i64>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            moderation_chat_id: None,
            api_base: "https://api.telegram.org".into(),
        }
    }
}

impl TelegramConfig {
    pub fn enabled(&self) -> bool {
        self.bot_token.is_some() && self.moderation_chat_id.is_some()
    }
}

impl AppConfig {
    /// Loads `.env`, the config file and the environment, then validates.
    pub fn load() -> Result<Self, ConfigError> {
        let dotenv = dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        debug!(?dotenv, %path, "loading configuration");

        let settings = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("NEWSROOM")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_usernames")
                    .with_list_parse_key("auth.admin_ids")
                    .try_parsing(true),
            )
            .build()?;
        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document on top of the defaults. No environment lookup.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_attempts == 0 {
            return Err(ConfigError::Invalid("store.max_attempts must be at least 1".into()));
        }
        if self.store.backend == BackendKind::Postgres && self.store.database_url.is_none() {
            return Err(ConfigError::Invalid(
                "store.database_url is required for the postgres backend".into(),
            ));
        }
        if self.telegram.bot_token.is_some() != self.telegram.moderation_chat_id.is_some() {
            return Err(ConfigError::Invalid(
                "telegram.bot_token and telegram.moderation_chat_id must be set together".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.store.backend, BackendKind::File);
        assert_eq!(config.store.max_attempts, 5);
        assert_eq!(config.store.base_backoff(), Duration::from_millis(100));
        assert_eq!(config.intake.quiet_period(), Duration::from_millis(1500));
        assert_eq!(config.server.log_format, LogFormat::Pretty);
        assert!(!config.telegram.enabled());
    }

    #[test]
    fn sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [server]
            log_format = "json"

            [store]
            backend = "postgres"
            database_url = "postgres://newsroom@localhost/newsroom"
            cache_ttl_ms = 0

            [auth]
            admin_usernames = ["editor"]
            admin_ids = [1001]
            intake_key_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"

            [telegram]
            bot_token = "123:abc"
            moderation_chat_id = -100200
            "#,
        )
        .unwrap();

        assert_eq!(config.server.log_format, LogFormat::Json);
        assert_eq!(config.store.backend, BackendKind::Postgres);
        assert_eq!(config.store.cache_ttl(), Duration::ZERO);
        assert_eq!(
            config.store.database_url.as_ref().map(|u| u.expose_secret().to_string()),
            Some("postgres://newsroom@localhost/newsroom".to_string())
        );
        assert_eq!(config.auth.admin_ids, vec![1001]);
        assert!(config.auth.intake_key_hash.is_some());
        assert!(config.auth.moderator_password_hash.is_none());
        assert!(config.telegram.enabled());
    }

    #[test]
    fn inconsistent_settings_are_rejected() {
        assert!(matches!(
            AppConfig::from_toml("[store]\nbackend = \"postgres\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[telegram]\nbot_token = \"x\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            AppConfig::from_toml("[store]\nmax_attempts = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = AppConfig::from_toml("[telegram]\nbot_token = \"123:abc\"\nmoderation_chat_id = 1").unwrap();
        assert!(!format!("{config:?}").contains("123:abc"));
    }
}
