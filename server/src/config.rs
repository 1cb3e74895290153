//! Server configuration module.
//!
//! Parses configuration from environment variables for the Realty server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `REALTY_JWT_SECRET` | Yes | - | HMAC secret used to sign session tokens |
//! | `REALTY_PRODUCT_KEY_SECRET` | Yes | - | Secret mixed into realtor/admin product keys |
//! | `DATABASE_URL` | No | - | Postgres URL; in-memory storage when unset |
//! | `REALTY_DB_MAX_CONNECTIONS` | No | 5 | Postgres pool size |
//! | `REALTY_TOKEN_TTL_SECS` | No | 36000 | Session token lifetime |
//! | `REALTY_BCRYPT_COST` | No | 10 | bcrypt cost factor (4-31) |
//! | `PORT` | No | 8080 | HTTP server port |

use std::env;
use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::ConfigError;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default session token lifetime (10 hours).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 36_000;

/// Default bcrypt cost factor for passwords and product keys.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Accepted bcrypt cost range.
const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Default Postgres pool size.
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Postgres connection URL. `None` selects the in-memory store.
    pub database_url: Option<String>,

    /// Maximum number of pooled Postgres connections.
    pub db_max_connections: u32,

    /// Secret used to sign and verify session tokens.
    pub jwt_secret: String,

    /// Secret appended to `email-ROLE` before hashing product keys.
    pub product_key_secret: String,

    /// Session token lifetime in seconds.
    pub token_ttl_secs: u64,

    /// bcrypt cost factor.
    pub bcrypt_cost: u32,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field(
                "database_url",
                &self.database_url.as_ref().map(|_| "<redacted>"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("jwt_secret", &"<redacted>")
            .field("product_key_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .finish()
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `REALTY_JWT_SECRET` or `REALTY_PRODUCT_KEY_SECRET` is missing or empty
    /// - A numeric variable does not parse or is out of range
    ///
    /// # Example
    ///
    /// ```no_run
    /// use realty_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            port: parse_env_or("PORT", DEFAULT_PORT)?,
            database_url: parse_optional_string("DATABASE_URL"),
            db_max_connections: parse_env_or(
                "REALTY_DB_MAX_CONNECTIONS",
                DEFAULT_DB_MAX_CONNECTIONS,
            )?,
            jwt_secret: parse_required_string("REALTY_JWT_SECRET")?,
            product_key_secret: parse_required_string("REALTY_PRODUCT_KEY_SECRET")?,
            token_ttl_secs: parse_env_or("REALTY_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?,
            bcrypt_cost: parse_env_or("REALTY_BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
        };

        config.validate()?;

        if config.database_url.is_none() {
            warn!(
                "DATABASE_URL is not set - using in-memory storage. \
                 All data is lost on restart!"
            );
        }

        Ok(config)
    }

    /// Validate value ranges that parsing alone cannot express.
    fn validate(&self) -> Result<(), ConfigError> {
        if !BCRYPT_COST_RANGE.contains(&self.bcrypt_cost) {
            return Err(ConfigError::invalid(
                "REALTY_BCRYPT_COST",
                format!(
                    "must be between {} and {}",
                    BCRYPT_COST_RANGE.start(),
                    BCRYPT_COST_RANGE.end()
                ),
            ));
        }

        if self.token_ttl_secs == 0 {
            return Err(ConfigError::invalid(
                "REALTY_TOKEN_TTL_SECS",
                "must be greater than zero",
            ));
        }

        if self.db_max_connections == 0 {
            return Err(ConfigError::invalid(
                "REALTY_DB_MAX_CONNECTIONS",
                "must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Returns a short label describing the configured storage backend.
    pub fn storage_label(&self) -> &'static str {
        if self.database_url.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}

/// Read a required, non-empty string variable.
fn parse_required_string(name: &str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        Ok(_) | Err(env::VarError::NotPresent) => Err(ConfigError::missing(name)),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::invalid(name, "contains invalid unicode"))
        }
    }
}

/// Read an optional string variable, treating empty values as unset.
fn parse_optional_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable with `FromStr`, falling back to `default` when unset.
fn parse_env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err: T::Err| ConfigError::invalid(name, err.to_string())),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::invalid(name, "contains invalid unicode"))
        }
    }
}
