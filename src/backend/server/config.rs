/**
 * Server Configuration
 *
 * # Configuration Sources
 *
 * Later sources override earlier ones:
 *
 * 1. Built-in defaults
 * 2. The TOML file named by `COLLABSPACE_CONFIG`, if set
 * 3. Environment variables (a `.env` file is loaded by the binary first)
 *
 * | Variable | Default |
 * |----------|---------|
 * | `DATABASE_URL` | unset: in-memory store |
 * | `SERVER_PORT` | `3000` |
 * | `JWT_SECRET` | development secret, with a warning |
 * | `TOKEN_TTL_SECS` | `604800` (7 days) |
 * | `BCRYPT_COST` | `12` |
 * | `STORAGE_ROOT` | `./data/objects` |
 * | `PUBLIC_BASE_URL` | `http://localhost:<port>` |
 * | `URL_SIGNING_KEY` | `JWT_SECRET` |
 * | `SIGNED_URL_TTL_SECS` | `3600` |
 * | `MAX_UPLOAD_BYTES` | `10485760` |
 * | `JOIN_TIMEOUT_MS` | `10000` |
 * | `SESSION_IDLE_GRACE_MS` | `30000` |
 *
 * # Database
 *
 * A database that is missing or unreachable does not stop startup; the
 * server runs on the in-memory store instead.
 */

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE_VAR: &str = "COLLABSPACE_CONFIG";
pub const DEV_JWT_SECRET: &str = "collabspace-dev-secret-change-me";

mod defaults {
    use std::path::PathBuf;

    pub fn port() -> u16 { 3000 }
    pub fn jwt_secret() -> String { super::DEV_JWT_SECRET.to_string() }
    pub fn token_ttl_secs() -> u64 { 7 * 24 * 60 * 60 }
    pub fn bcrypt_cost() -> u32 { bcrypt::DEFAULT_COST }
    pub fn storage_root() -> PathBuf { "./data/objects".into() }
    pub fn signed_url_ttl_secs() -> u64 { 3600 }
    pub fn max_upload_bytes() -> u64 { 10 * 1024 * 1024 }
    pub fn join_timeout_ms() -> u64 { 10_000 }
    pub fn session_idle_grace_ms() -> u64 { 30_000 }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue { key: String, value: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
    pub storage_root: PathBuf,
    /// Base for signed download links; derived from the port when unset
    pub public_base_url: Option<String>,
    /// Falls back to `jwt_secret`
    pub url_signing_key: Option<String>,
    pub signed_url_ttl_secs: u64,
    pub max_upload_bytes: u64,
    pub join_timeout_ms: u64,
    pub session_idle_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: defaults::port(),
            jwt_secret: defaults::jwt_secret(),
            token_ttl_secs: defaults::token_ttl_secs(),
            bcrypt_cost: defaults::bcrypt_cost(),
            storage_root: defaults::storage_root(),
            public_base_url: None,
            url_signing_key: None,
            signed_url_ttl_secs: defaults::signed_url_ttl_secs(),
            max_upload_bytes: defaults::max_upload_bytes(),
            join_timeout_ms: defaults::join_timeout_ms(),
            session_idle_grace_ms: defaults::session_idle_grace_ms(),
        }
    }
}

fn parse<T>(key: &str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
        value,
    })
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var(CONFIG_FILE_VAR) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay variables looked up through `lookup`; empty values are ignored
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DATABASE_URL") {
            self.database_url = Some(v);
        }
        if let Some(v) = get("SERVER_PORT") {
            self.port = parse("SERVER_PORT", v)?;
        }
        if let Some(v) = get("JWT_SECRET") {
            self.jwt_secret = v;
        }
        if let Some(v) = get("TOKEN_TTL_SECS") {
            self.token_ttl_secs = parse("TOKEN_TTL_SECS", v)?;
        }
        if let Some(v) = get("BCRYPT_COST") {
            self.bcrypt_cost = parse("BCRYPT_COST", v)?;
        }
        if let Some(v) = get("STORAGE_ROOT") {
            self.storage_root = v.into();
        }
        if let Some(v) = get("PUBLIC_BASE_URL") {
            self.public_base_url = Some(v);
        }
        if let Some(v) = get("URL_SIGNING_KEY") {
            self.url_signing_key = Some(v);
        }
        if let Some(v) = get("SIGNED_URL_TTL_SECS") {
            self.signed_url_ttl_secs = parse("SIGNED_URL_TTL_SECS", v)?;
        }
        if let Some(v) = get("MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = parse("MAX_UPLOAD_BYTES", v)?;
        }
        if let Some(v) = get("JOIN_TIMEOUT_MS") {
            self.join_timeout_ms = parse("JOIN_TIMEOUT_MS", v)?;
        }
        if let Some(v) = get("SESSION_IDLE_GRACE_MS") {
            self.session_idle_grace_ms = parse("SESSION_IDLE_GRACE_MS", v)?;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::InvalidValue {
                key: "BCRYPT_COST".to_string(),
                value: self.bcrypt_cost.to_string(),
                reason: "must be between 4 and 31".to_string(),
            });
        }
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }

    pub fn url_signing_key(&self) -> &str {
        self.url_signing_key.as_deref().unwrap_or(&self.jwt_secret)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn session_idle_grace(&self) -> Duration {
        Duration::from_millis(self.session_idle_grace_ms)
    }
}

/// Connect and migrate, or `None` to run without a database
pub async fn load_database(database_url: Option<&str>) -> Option<PgPool> {
    let Some(database_url) = database_url else {
        tracing::warn!("DATABASE_URL not set. Using the in-memory store; data will not survive a restart.");
        return None;
    };

    tracing::info!("Connecting to database...");
    let pool = match PgPool::connect(database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!("Failed to create database connection pool: {:?}", e);
            tracing::warn!("Falling back to the in-memory store.");
            return None;
        }
    };
    tracing::info!("Database connection pool created successfully");

    tracing::info!("Running database migrations...");
    match sqlx::migrate!().run(&pool).await {
        Ok(_) => tracing::info!("Database migrations completed successfully"),
        Err(e) => {
            tracing::error!("Failed to run database migrations: {}", e);
            tracing::warn!("Continuing without migrations - database might not be up to date");
        }
    }

    Some(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default().with_env(env(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.token_ttl(), Duration::from_secs(604_800));
        assert_eq!(config.signed_url_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_upload_bytes, 10_485_760);
        assert_eq!(config.join_timeout(), Duration::from_secs(10));
        assert_eq!(config.public_base_url(), "http://localhost:3000");
        assert!(config.uses_dev_secret());
        assert_eq!(config.url_signing_key(), DEV_JWT_SECRET);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = AppConfig::from_toml("port = 8080\njwt_secret = \"from-file\"\n").unwrap();
        let config = file
            .with_env(env(&[("SERVER_PORT", "9090"), ("URL_SIGNING_KEY", "signing")]))
            .unwrap();
        assert_eq!(config.port, 9090);
        assert_eq!(config.jwt_secret, "from-file");
        assert_eq!(config.url_signing_key(), "signing");
    }

    #[test]
    fn test_bad_number_is_reported() {
        let err = AppConfig::default().with_env(env(&[("SERVER_PORT", "lots")])).unwrap_err();
        assert_matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "SERVER_PORT");
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        assert!(AppConfig::default().with_env(env(&[("BCRYPT_COST", "3")])).is_err());
        assert!(AppConfig::default().with_env(env(&[("BCRYPT_COST", "4")])).is_ok());
    }

    #[test]
    fn test_config_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collabspace.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        assert_matches!(AppConfig::from_file(&path), Err(ConfigError::Parse { .. }));
        assert_matches!(AppConfig::from_file(dir.path().join("missing.toml")), Err(ConfigError::Read { .. }));
    }
}
