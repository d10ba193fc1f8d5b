//! Configuration system for Warden.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `WARDEN_SERVER_HOST` - Server bind address
//! - `WARDEN_SERVER_PORT` - Server port
//! - `WARDEN_SHARED_SECRET` - Long-lived shared secret for key exchange and
//!   heartbeat fallback decryption
//! - `WARDEN_SESSION_TTL_SECS` - Session key lifetime in seconds
//! - `WARDEN_SESSION_SWEEP_CRON` - Cron expression for the session sweep job
//! - `WARDEN_MACHINE_LIMIT` - Maximum machines per user
//! - `WARDEN_DATABASE_TYPE` - "sqlite" or "postgres"
//! - `WARDEN_DATABASE_URL` - Database connection URL
//! - `WARDEN_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{WardenError, WardenResult};

/// Global configuration singleton.
static CONFIG: OnceLock<WardenConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Shared secret / encryption configuration
    pub encryption: EncryptionConfig,
    /// Session key configuration
    pub session: SessionConfig,
    /// Machine registration configuration
    pub machines: MachinesConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Shared secret configuration.
///
/// The secret is provisioned out-of-band to clients; it protects the key
/// exchange response and serves as the heartbeat decryption fallback. It is
/// read once at startup and injected into handler state, never read from the
/// environment at call time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Long-lived shared secret
    pub shared_secret: String,
}

/// Session key configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session key lifetime in seconds
    pub ttl_secs: u64,
    /// Cron expression for the background sweep (default: every 5 minutes)
    pub sweep_cron: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 1800,
            sweep_cron: "0 */5 * * * *".to_string(),
        }
    }
}

/// Machine registration configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MachinesConfig {
    /// Maximum machine rows per API key
    pub max_per_user: u32,
}

impl Default for MachinesConfig {
    fn default() -> Self {
        Self { max_per_user: 3 }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    /// SQLite connection URL
    pub sqlite_url: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://warden.db".to_string(),
            postgres_url: "postgres://localhost/warden".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl WardenConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    fn load() -> WardenResult<Self> {
        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", "127.0.0.1")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("server.port", 3000)
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("encryption.shared_secret", "")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("session.ttl_secs", 1800)
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("session.sweep_cron", "0 */5 * * * *")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("machines.max_per_user", 3)
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("database.db_type", "sqlite")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("database.sqlite_url", "sqlite://warden.db")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("database.postgres_url", "postgres://localhost/warden")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_default("logging.level", "info")
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("WARDEN_SERVER_HOST").ok())
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "server.port",
                env::var("WARDEN_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "encryption.shared_secret",
                env::var("WARDEN_SHARED_SECRET").ok(),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "session.ttl_secs",
                env::var("WARDEN_SESSION_TTL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "session.sweep_cron",
                env::var("WARDEN_SESSION_SWEEP_CRON").ok(),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "machines.max_per_user",
                env::var("WARDEN_MACHINE_LIMIT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option("database.db_type", env::var("WARDEN_DATABASE_TYPE").ok())
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.sqlite_url",
                env::var("WARDEN_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option(
                "database.postgres_url",
                env::var("WARDEN_DATABASE_URL")
                    .ok()
                    .filter(|url| url.starts_with("postgres")),
            )
            .map_err(|e| WardenError::ConfigError(e.to_string()))?
            .set_override_option("logging.level", env::var("WARDEN_LOG_LEVEL").ok())
            .map_err(|e| WardenError::ConfigError(e.to_string()))?;

        let settings = builder
            .build()
            .map_err(|e| WardenError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| WardenError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> WardenResult<()> {
        if self.server.port == 0 {
            return Err(WardenError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.encryption.shared_secret.is_empty() {
            return Err(WardenError::ConfigError(
                "encryption.shared_secret is required (set WARDEN_SHARED_SECRET)".to_string(),
            ));
        }

        if self.session.ttl_secs == 0 {
            return Err(WardenError::ConfigError(
                "session.ttl_secs must be greater than 0".to_string(),
            ));
        }

        if self.machines.max_per_user == 0 {
            return Err(WardenError::ConfigError(
                "machines.max_per_user must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(WardenError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(WardenError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }
}

/// Get the global configuration.
///
/// This loads the configuration on first access and caches it.
/// Returns an error if configuration loading or validation fails.
pub fn get_config() -> WardenResult<&'static WardenConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = WardenConfig::load()?;
    config.validate()?;

    // Another thread may have set it first; either copy is equivalent.
    let _ = CONFIG.set(config.clone());

    Ok(CONFIG.get().expect("config was just set"))
}

/// Initialize configuration explicitly.
///
/// Call this early in your application to catch configuration errors.
pub fn init_config() -> WardenResult<&'static WardenConfig> {
    get_config()
}
