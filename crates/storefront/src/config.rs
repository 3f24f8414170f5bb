//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront
//! - `DISCOGS_TOKEN` - Marketplace seller API token
//! - `DISCOGS_SELLER` - Marketplace seller username whose inventory is listed
//! - `STRIPE_WEBHOOK_SECRET` - Payment webhook signing secret
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `DISCOGS_BASE_URL` - Marketplace API base (default: <https://api.discogs.com>)
//! - `DISCOGS_CURRENCY` - Seller currency code (default: USD)
//! - `DISCOGS_CACHE_TTL_SECONDS` - Inventory cache TTL (default: 300)
//! - `DISCOGS_USER_AGENT` - User-Agent for marketplace calls
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

use spindle_core::CurrencyCode;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret-here",
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

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Marketplace API configuration
    pub discogs: DiscogsConfig,
    /// Payment provider configuration
    pub stripe: StripeConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name (e.g. production, staging)
    pub sentry_environment: Option<String>,
}

/// Marketplace API configuration.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct DiscogsConfig {
    /// API base URL
    pub base_url: String,
    /// Per-seller API token
    pub token: SecretString,
    /// Seller username whose inventory this storefront sells
    pub seller: String,
    /// Currency listings are priced in when the API omits one
    pub currency: CurrencyCode,
    /// User-Agent header (the marketplace requires an identifying one)
    pub user_agent: String,
    /// TTL for cached inventory/listing/release reads
    pub cache_ttl_seconds: u64,
}

impl std::fmt::Debug for DiscogsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscogsConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("seller", &self.seller)
            .field("currency", &self.currency)
            .field("user_agent", &self.user_agent)
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .finish()
    }
}

/// Payment provider configuration.
///
/// Implements `Debug` manually to redact the signing secret.
#[derive(Clone)]
pub struct StripeConfig {
    /// Webhook signing secret shared with the provider
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid,
    /// or if secrets fail validation (placeholder detection, entropy
    /// check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("STOREFRONT_DATABASE_URL")?;
        let host = get_env_or_default("STOREFRONT_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_HOST".to_string(), e.to_string())
            })?;
        let port = get_env_or_default("STOREFRONT_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("STOREFRONT_PORT".to_string(), e.to_string())
            })?;
        let base_url = get_required_env("STOREFRONT_BASE_URL")?;

        let discogs = DiscogsConfig::from_env()?;
        let stripe = StripeConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            discogs,
            stripe,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl DiscogsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency_raw = get_env_or_default("DISCOGS_CURRENCY", "USD");
        let currency = currency_raw.parse::<CurrencyCode>().map_err(|e| {
            ConfigError::InvalidEnvVar("DISCOGS_CURRENCY".to_string(), e)
        })?;

        let cache_ttl_seconds = get_env_or_default("DISCOGS_CACHE_TTL_SECONDS", "300")
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("DISCOGS_CACHE_TTL_SECONDS".to_string(), e.to_string())
            })?;

        Ok(Self {
            base_url: get_env_or_default("DISCOGS_BASE_URL", "https://api.discogs.com"),
            token: get_validated_secret("DISCOGS_TOKEN")?,
            seller: get_required_env("DISCOGS_SELLER")?,
            currency,
            user_agent: get_env_or_default(
                "DISCOGS_USER_AGENT",
                "SpindleRecords/0.1 +https://spindlerecords.shop",
            ),
            cache_ttl_seconds,
        })
    }
}

impl StripeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by
/// platform postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
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

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real tokens and signing secrets have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the real credential."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        // All same character = 0 entropy
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        // "ab" has entropy of 1 bit per char (50% a, 50% b)
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_shannon_entropy_high() {
        let entropy = shannon_entropy("aB3$xY9!mK2@nL5#");
        assert!(entropy > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-api-key-here", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_changeme() {
        let result = validate_secret_strength("changeme123", "TEST_VAR");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        // High-entropy random string
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let config = StorefrontConfig {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            discogs: DiscogsConfig {
                base_url: "https://api.discogs.com".to_string(),
                token: SecretString::from("token"),
                seller: "spindle-records".to_string(),
                currency: CurrencyCode::USD,
                user_agent: "SpindleRecords/0.1".to_string(),
                cache_ttl_seconds: 300,
            },
            stripe: StripeConfig {
                webhook_secret: SecretString::from("whsec_test"),
            },
            sentry_dsn: None,
            sentry_environment: None,
        };

        let addr = config.socket_addr();
        assert_eq!(addr.ip().to_string(), "127.0.0.1");
        assert_eq!(addr.port(), 3000);
    }

    #[test]
    fn test_discogs_config_debug_redacts_token() {
        let config = DiscogsConfig {
            base_url: "https://api.discogs.com".to_string(),
            token: SecretString::from("super_secret_token_value"),
            seller: "spindle-records".to_string(),
            currency: CurrencyCode::USD,
            user_agent: "SpindleRecords/0.1".to_string(),
            cache_ttl_seconds: 300,
        };

        let debug_output = format!("{config:?}");

        assert!(debug_output.contains("spindle-records"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_token_value"));
    }

    #[test]
    fn test_stripe_config_debug_redacts_secret() {
        let config = StripeConfig {
            webhook_secret: SecretString::from("whsec_super_secret_value"),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("whsec_super_secret_value"));
    }
}
