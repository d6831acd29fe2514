//! Engine configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Optional
//! - `CART_STORE_PATH` - Local cart snapshot file (default: `.cart/cart.json`)
//! - `CART_DATABASE_URL` - `PostgreSQL` connection string for the remote cart
//!   store (falls back to `DATABASE_URL`)
//! - `STOCK_API_URL` - Base URL of the stock lookup service
//! - `STOCK_API_TOKEN` - Bearer token for the stock lookup service
//! - `STOCK_CACHE_TTL_SECS` - Stock ceiling cache TTL (default: 30)
//! - `STOCK_CACHE_CAPACITY` - Maximum cached stock ceilings (default: 10000)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_STORE_PATH: &str = ".cart/cart.json";
const DEFAULT_STOCK_CACHE_TTL_SECS: u64 = 30;
const DEFAULT_STOCK_CACHE_CAPACITY: u64 = 10_000;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Cart engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Path of the device-local cart snapshot
    pub store_path: PathBuf,
    /// `PostgreSQL` URL for the per-identity remote cart store (contains password)
    pub database_url: Option<SecretString>,
    /// Stock lookup service configuration
    pub stock: StockConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Stock lookup configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct StockConfig {
    /// Base URL of the stock service; `None` disables HTTP lookups
    pub api_url: Option<Url>,
    /// Bearer token sent with stock lookups
    pub api_token: Option<SecretString>,
    /// How long a looked-up ceiling is reused
    pub cache_ttl: Duration,
    /// Maximum number of cached ceilings
    pub cache_capacity: u64,
}

impl std::fmt::Debug for StockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockConfig")
            .field("api_url", &self.api_url.as_ref().map(Url::as_str))
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("cache_ttl", &self.cache_ttl)
            .field("cache_capacity", &self.cache_capacity)
            .finish()
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            cache_ttl: Duration::from_secs(DEFAULT_STOCK_CACHE_TTL_SECS),
            cache_capacity: DEFAULT_STOCK_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, or if the
    /// stock API token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store_path = PathBuf::from(get_env_or_default("CART_STORE_PATH", DEFAULT_STORE_PATH));
        let database_url = get_database_url("CART_DATABASE_URL");
        let stock = StockConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");

        Ok(Self {
            store_path,
            database_url,
            stock,
            sentry_dsn,
        })
    }
}

impl StockConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_url = get_optional_env("STOCK_API_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| {
                    ConfigError::InvalidEnvVar("STOCK_API_URL".to_string(), e.to_string())
                })
            })
            .transpose()?;
        let api_token = get_optional_env("STOCK_API_TOKEN")
            .map(|token| {
                validate_secret_strength(&token, "STOCK_API_TOKEN")?;
                Ok::<_, ConfigError>(SecretString::from(token))
            })
            .transpose()?;
        let cache_ttl = Duration::from_secs(parse_u64_or_default(
            "STOCK_CACHE_TTL_SECS",
            DEFAULT_STOCK_CACHE_TTL_SECS,
        )?);
        let cache_capacity =
            parse_u64_or_default("STOCK_CACHE_CAPACITY", DEFAULT_STOCK_CACHE_CAPACITY)?;

        Ok(Self {
            api_url,
            api_token,
            cache_ttl,
            cache_capacity,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Option<SecretString> {
    get_optional_env(primary_key)
        .or_else(|| get_optional_env("DATABASE_URL"))
        .map(SecretString::from)
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated token."
            ),
        ));
    }

    Ok(())
}
