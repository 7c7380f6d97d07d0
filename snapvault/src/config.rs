//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The configuration file path defaults to `config.yaml` but can be
//! specified via `-f` flag or `SNAPVAULT_CONFIG` environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources
//! override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `SNAPVAULT_` override
//!    YAML values
//! 3. **DATABASE_URL** - Special case: switches `database` to the PostgreSQL
//!    backend with that URL
//!
//! For nested config values, use double underscores in environment variables.
//! For example, `SNAPVAULT_AUTH__AUTO_CREATE_USERS=false` sets
//! `auth.auto_create_users`.
//!
//! ## Configuration Structure
//!
//! - **Server**: `host`, `port`, `max_upload_size`
//! - **Database**: `database.type` - `postgres` (with `url`) or `memory`
//! - **Identity provider**: `identity.provider` - `gotrue` (hosted auth API)
//!   or `dummy` (in-memory, development only)
//! - **Storage**: `storage.backend` - `b2` (Backblaze B2), `local`, or `memory`
//! - **Auth policies**: `auth.auto_create_users`, `auth.password`,
//!   `auth.confirmation_code_ttl`, `auth.test_email_domains`
//! - **CORS**: `cors.allowed_origins`, `cors.allow_credentials`

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::Error;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "SNAPVAULT_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment
/// variables. All fields have sensible defaults defined in the `Default`
/// implementation.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Maximum accepted multipart upload size in bytes
    pub max_upload_size: usize,
    /// Special case: `DATABASE_URL` environment override. Applied to
    /// `database` during [`Config::load`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    /// Metadata store configuration
    pub database: DatabaseConfig,
    /// Identity provider configuration
    pub identity: IdentityProviderConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Authentication policies
    pub auth: AuthConfig,
    /// CORS configuration for browser clients
    pub cors: CorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_upload_size: 10 * 1024 * 1024,
            database_url: None,
            database: DatabaseConfig::default(),
            identity: IdentityProviderConfig::default(),
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            cors: CorsConfig::default(),
        }
    }
}

/// Individual pool configuration with the SQLx parameters we care about.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections to maintain
    pub min_connections: u32,
    /// Maximum time to wait for a connection (seconds)
    pub acquire_timeout_secs: u64,
    /// Time before idle connections are closed (seconds)
    pub idle_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
        }
    }
}

/// Metadata store configuration.
///
/// The in-memory backend exists for development and tests; production
/// deployments point at an external PostgreSQL database.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DatabaseConfig {
    /// External PostgreSQL database
    Postgres {
        /// Connection string
        url: String,
        /// Connection pool settings
        #[serde(default)]
        pool: PoolSettings,
    },
    /// In-memory store; data is lost on shutdown
    Memory,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig::Memory
    }
}

/// Identity provider configuration.
///
/// Credentials should be set via environment variables:
/// `SNAPVAULT_IDENTITY__GOTRUE__API_KEY` etc.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum IdentityProviderConfig {
    /// GoTrue-style hosted auth API (e.g. Supabase Auth)
    Gotrue(GotrueConfig),
    /// In-memory provider for development and tests
    Dummy(DummyIdentityConfig),
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        IdentityProviderConfig::Dummy(DummyIdentityConfig::default())
    }
}

/// GoTrue identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GotrueConfig {
    /// Base URL of the auth API (e.g. `https://xyz.supabase.co/auth/v1`)
    pub url: Url,
    /// Service API key sent as the `apikey` header
    pub api_key: String,
}

/// Dummy identity provider configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DummyIdentityConfig {
    /// Treat new accounts as confirmed immediately (no confirmation flow)
    pub autoconfirm: bool,
}

/// Object storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Backblaze B2 native API
    B2(B2Config),
    /// Local filesystem directory
    Local {
        /// Directory where objects will be written
        path: PathBuf,
    },
    /// In-memory store; objects are lost on shutdown
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            path: PathBuf::from(".snapvault_data/objects"),
        }
    }
}

/// Backblaze B2 configuration.
///
/// Credentials should be set via environment variables:
/// `SNAPVAULT_STORAGE__B2__KEY_ID`, `SNAPVAULT_STORAGE__B2__APPLICATION_KEY`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct B2Config {
    /// Application key id
    pub key_id: String,
    /// Application key
    pub application_key: String,
    /// Bucket to store objects in
    pub bucket_id: String,
    /// Bucket name, used when constructing public URLs
    pub bucket_name: String,
    /// Public download endpoint (e.g. `https://f000.backblazeb2.com/file`)
    pub endpoint: Url,
}

/// Authentication policies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Automatically create an application user row when a valid token
    /// resolves to an identity-provider account with no matching row.
    /// When disabled, such tokens are rejected with 403.
    pub auto_create_users: bool,
    /// Password validation rules applied at signup
    pub password: PasswordConfig,
    /// How long manual confirmation codes stay valid
    #[serde(with = "humantime_serde")]
    pub confirmation_code_ttl: Duration,
    /// Email domains whose accounts are confirmed immediately on
    /// resend-verification instead of going through the provider.
    /// Empty (the default) disables the shortcut.
    pub test_email_domains: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auto_create_users: true,
            password: PasswordConfig::default(),
            confirmation_code_ttl: Duration::from_secs(10 * 60),
            test_email_domains: Vec::new(),
        }
    }
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 6,
            max_length: 72,
        }
    }
}

/// CORS (Cross-Origin Resource Sharing) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins for CORS requests
    pub allowed_origins: Vec<CorsOrigin>,
    /// Allow credentials (cookies) in CORS requests
    pub allow_credentials: bool,
    /// Cache preflight requests for this many seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Wildcard],
            allow_credentials: false,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum CorsOrigin {
    /// Allow all origins (`*`)
    #[serde(deserialize_with = "parse_wildcard")]
    Wildcard,
    /// Specific origin URL (e.g., `https://app.example.com`)
    Url(Url),
}

fn parse_wildcard<'de, D>(deserializer: D) -> Result<(), D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    if s == "*" {
        Ok(())
    } else {
        Err(serde::de::Error::custom("Expected '*'"))
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        // DATABASE_URL switches to the postgres backend, preserving any
        // configured pool settings.
        if let Some(url) = config.database_url.take() {
            let pool = match &config.database {
                DatabaseConfig::Postgres { pool, .. } => pool.clone(),
                DatabaseConfig::Memory => PoolSettings::default(),
            };
            config.database = DatabaseConfig::Postgres { url, pool };
        }

        config
            .validate()
            .map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            .merge(Env::prefixed("SNAPVAULT_").split("__"))
            // Common DATABASE_URL pattern
            .merge(Env::raw().only(&["DATABASE_URL"]))
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.auth.password.min_length > self.auth.password.max_length {
            return Err(Error::Internal {
                operation: format!(
                    "Config validation: min_length ({}) cannot be greater than max_length ({})",
                    self.auth.password.min_length, self.auth.password.max_length
                ),
            });
        }
        if self.auth.password.min_length < 1 {
            return Err(Error::Internal {
                operation: "Config validation: password min_length must be at least 1".to_string(),
            });
        }
        if self.auth.confirmation_code_ttl.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: confirmation_code_ttl must be non-zero".to_string(),
            });
        }
        if let IdentityProviderConfig::Gotrue(gotrue) = &self.identity
            && gotrue.api_key.is_empty()
        {
            return Err(Error::Internal {
                operation: "Config validation: identity.gotrue.api_key is required. \
                     Please set SNAPVAULT_IDENTITY__GOTRUE__API_KEY or add it to the config file."
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_address(), "0.0.0.0:3000");
        assert!(config.auth.auto_create_users);
        assert_eq!(config.auth.password.min_length, 6);
        assert_eq!(config.auth.confirmation_code_ttl, Duration::from_secs(600));
    }

    #[test]
    fn test_yaml_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
port: 8080
auth:
  auto_create_users: false
  test_email_domains:
    - "example.test"
storage:
  backend: local
  path: /tmp/objects
"#,
            )?;
            jail.set_env("SNAPVAULT_PORT", "9090");
            jail.set_env("SNAPVAULT_AUTH__PASSWORD__MIN_LENGTH", "8");

            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");

            // Env beats YAML, YAML beats defaults.
            assert_eq!(config.port, 9090);
            assert!(!config.auth.auto_create_users);
            assert_eq!(config.auth.password.min_length, 8);
            assert_eq!(config.auth.test_email_domains, vec!["example.test"]);
            assert!(matches!(config.storage, StorageConfig::Local { .. }));
            Ok(())
        });
    }

    #[test]
    fn test_database_url_override() {
        Jail::expect_with(|jail| {
            jail.set_env("DATABASE_URL", "postgres://db.example.com/snapvault");

            let args = Args {
                config: "missing.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");

            match config.database {
                DatabaseConfig::Postgres { url, .. } => {
                    assert_eq!(url, "postgres://db.example.com/snapvault");
                }
                DatabaseConfig::Memory => panic!("DATABASE_URL should select postgres"),
            }
            Ok(())
        });
    }

    #[test]
    fn test_gotrue_requires_api_key() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
identity:
  provider: gotrue
  url: "https://xyz.supabase.co/auth/v1"
  api_key: ""
"#,
            )?;
            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            assert!(Config::load(&args).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_invalid_password_bounds_rejected() {
        let mut config = Config::default();
        config.auth.password.min_length = 100;
        config.auth.password.max_length = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cors_origin_parsing() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
cors:
  allowed_origins:
    - "*"
    - "https://app.example.com"
"#,
            )?;
            let args = Args {
                config: "test.yaml".to_string(),
                validate: false,
            };
            let config = Config::load(&args).expect("config should load");
            assert_eq!(config.cors.allowed_origins.len(), 2);
            assert!(matches!(config.cors.allowed_origins[0], CorsOrigin::Wildcard));
            assert!(matches!(config.cors.allowed_origins[1], CorsOrigin::Url(_)));
            Ok(())
        });
    }
}
