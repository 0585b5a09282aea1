//! Configuration management

use serde::{Deserialize, Serialize};

use crate::etl::orchestrator::DEFAULT_MARK_ATTEMPTS;
use crate::etl::timestamp::DEFAULT_TOLERANCE_MINUTES;
use crate::etl::validator::{
    ValidationPolicy, DEFAULT_TEMPERATURE_MAX, DEFAULT_TEMPERATURE_MIN, DEFAULT_WEIGHT_MAX, DEFAULT_WEIGHT_MIN,
};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default target database URL for local development.
pub const DEFAULT_TARGET_DATABASE_URL: &str = "postgresql://localhost/forgeflow";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub target_db: DatabaseConfig,
    /// `None` disables staging pulls
    pub staging_db: Option<DatabaseConfig>,
    pub auth: AuthConfig,
    pub etl: EtlConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Shared-secret authentication
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub api_key: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig").field("api_key", &"<redacted>").finish()
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub policy: ValidationPolicy,
    pub staging_mark_attempts: u32,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl DatabaseConfig {
    /// Pool settings read from `{prefix}_MAX_CONNECTIONS` and friends
    fn from_env(url: String, prefix: &str) -> Self {
        Self {
            url,
            max_connections: env_or(&format!("{}_MAX_CONNECTIONS", prefix), DEFAULT_DATABASE_MAX_CONNECTIONS),
            min_connections: env_or(&format!("{}_MIN_CONNECTIONS", prefix), DEFAULT_DATABASE_MIN_CONNECTIONS),
            connect_timeout_secs: env_or(
                &format!("{}_CONNECT_TIMEOUT", prefix),
                DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            ),
            idle_timeout_secs: env_or(&format!("{}_IDLE_TIMEOUT", prefix), DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
        }
    }

    fn validate(&self, name: &str) -> anyhow::Result<()> {
        if self.url.is_empty() {
            anyhow::bail!("{} database URL cannot be empty", name);
        }

        if self.max_connections == 0 {
            anyhow::bail!("{} database max_connections must be greater than 0", name);
        }

        if self.min_connections > self.max_connections {
            anyhow::bail!(
                "{} database min_connections ({}) cannot be greater than max_connections ({})",
                name,
                self.min_connections,
                self.max_connections
            );
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Read the environment without loading `.env` or validating
    pub fn from_env() -> Self {
        let target_url =
            std::env::var("TARGET_DATABASE_URL").unwrap_or_else(|_| DEFAULT_TARGET_DATABASE_URL.to_string());

        Config {
            server: ServerConfig {
                host: std::env::var("FORGEFLOW_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("FORGEFLOW_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or("FORGEFLOW_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            target_db: DatabaseConfig::from_env(target_url, "TARGET_DB"),
            staging_db: std::env::var("STAGING_DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty())
                .map(|url| DatabaseConfig::from_env(url, "STAGING_DB")),
            auth: AuthConfig {
                api_key: std::env::var("API_KEY").unwrap_or_default(),
            },
            etl: EtlConfig {
                policy: ValidationPolicy {
                    tolerance_minutes: env_or("ETL_TIMESTAMP_TOLERANCE_MINUTES", DEFAULT_TOLERANCE_MINUTES),
                    weight_min: DEFAULT_WEIGHT_MIN,
                    weight_max: env_or("ETL_WEIGHT_MAX", DEFAULT_WEIGHT_MAX),
                    temperature_min: env_or("ETL_TEMPERATURE_MIN", DEFAULT_TEMPERATURE_MIN),
                    temperature_max: env_or("ETL_TEMPERATURE_MAX", DEFAULT_TEMPERATURE_MAX),
                },
                staging_mark_attempts: env_or("ETL_STAGING_MARK_RETRIES", DEFAULT_MARK_ATTEMPTS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env_or("CORS_ALLOW_CREDENTIALS", true),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.auth.api_key.trim().is_empty() {
            anyhow::bail!("API_KEY must be set to a non-empty shared secret");
        }

        self.validate_pipeline()?;

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }

    /// Checks needed to run a batch: database pools and the validation policy
    pub fn validate_pipeline(&self) -> anyhow::Result<()> {
        self.target_db.validate("Target")?;
        if let Some(staging) = &self.staging_db {
            staging.validate("Staging")?;
        } else {
            tracing::info!("STAGING_DATABASE_URL not set - staging pulls are disabled");
        }

        let policy = &self.etl.policy;
        if policy.tolerance_minutes < 0 {
            anyhow::bail!("ETL_TIMESTAMP_TOLERANCE_MINUTES cannot be negative");
        }
        if policy.temperature_min > policy.temperature_max {
            anyhow::bail!(
                "ETL_TEMPERATURE_MIN ({}) cannot be greater than ETL_TEMPERATURE_MAX ({})",
                policy.temperature_min,
                policy.temperature_max
            );
        }
        if policy.weight_max < policy.weight_min {
            anyhow::bail!("ETL_WEIGHT_MAX cannot be below {}", policy.weight_min);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        let database = |url: &str| DatabaseConfig {
            url: url.to_string(),
            max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
            min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
        };

        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            target_db: database(DEFAULT_TARGET_DATABASE_URL),
            staging_db: None,
            auth: AuthConfig {
                api_key: String::new(),
            },
            etl: EtlConfig {
                policy: ValidationPolicy::default(),
                staging_mark_attempts: DEFAULT_MARK_ATTEMPTS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}
