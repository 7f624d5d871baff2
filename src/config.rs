//! Configuration system for Sufuss.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `config.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `SUFUSS_SERVER_HOST` / `SUFUSS_SERVER_PORT` - Public listener
//! - `SUFUSS_ADMIN_ENABLED` - Serve the admin API
//! - `SUFUSS_ADMIN_HOST` / `SUFUSS_ADMIN_PORT` - Admin listener
//! - `SUFUSS_ADMIN_USERNAME` / `SUFUSS_ADMIN_PASSWORD` - Admin Basic auth credentials
//! - `SUFUSS_DATABASE_URL` - SQLite connection URL
//! - `SUFUSS_LICENSE_KEY_PREFIX` - Prefix for generated license keys
//! - `SUFUSS_DEFAULT_LICENSE_DURATION_DAYS` - Lifetime of seeded licenses
//! - `SUFUSS_DEFAULT_LICENSE_STATUS` - Status of seeded licenses
//! - `SUFUSS_DEFAULT_SERVICE_STATUS` - Status of default services
//! - `SUFUSS_SEED_DEMO` - Create the demo license on an empty database
//! - `SUFUSS_EMULATION_PRODUCT` / `SUFUSS_EMULATION_VERSION` - Reported product
//! - `SUFUSS_EMULATION_EXPIRY_DAYS` - Lifetime of fabricated licenses
//! - `SUFUSS_CA_CERT_PATH` - CA certificate served at `/certificates/ca`
//! - `SUFUSS_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<SufussConfig> = OnceLock::new();

/// Upper bound for license and emulated expiry lifetimes, in days.
pub const MAX_DURATION_DAYS: i64 = 100_000;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SufussConfig {
    /// Public (device-facing) server
    pub server: ServerConfig,
    /// Admin API server
    pub admin: AdminConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// License defaults and key generation
    pub license: LicenseConfig,
    /// Protocol emulation profile
    pub emulation: EmulationConfig,
    /// Certificate files
    pub certificates: CertificateConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Public server configuration.
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
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8001,
            username: "admin".to_string(),
            password: "admin123".to_string(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sufuss.db".to_string(),
        }
    }
}

/// License defaults and key generation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LicenseConfig {
    /// Prefix for generated license keys (e.g., "SUFUSS" -> "SUFUSS-XXXX-XXXX-XXXX")
    pub key_prefix: String,
    /// Number of segments in the license key
    pub key_segments: u8,
    /// Characters per segment
    pub key_segment_length: u8,
    /// Days until a seeded license expires
    pub default_duration_days: i64,
    /// Status assigned to seeded licenses
    pub default_status: String,
    /// Status assigned to the default services of every new license
    pub default_service_status: String,
    /// Create a demo license when the database holds none
    pub seed_demo: bool,
    /// Key of the demo license
    pub demo_key: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            key_prefix: "SUFUSS".to_string(),
            key_segments: 4,
            key_segment_length: 4,
            default_duration_days: 365,
            default_status: "registered".to_string(),
            default_service_status: "running".to_string(),
            seed_demo: true,
            demo_key: "SUFUSS-XXXX-YYYY-ZZZZ-DEMO1".to_string(),
        }
    }
}

/// Values reported by the protocol emulation layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    /// Product name reported in installation records
    pub product: String,
    /// Firmware version reported in installation records
    pub version: String,
    /// Days until a fabricated license expires
    pub expiry_days: i64,
    pub account_name: String,
    pub tenant_name: String,
    pub download_url: String,
    /// Lifetime in seconds of fabricated auth tokens
    pub token_expires_in: u64,
    /// Largest request body buffered for logging and parsing
    pub max_body_bytes: usize,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            product: "XG Firewall".to_string(),
            version: "18.5.0".to_string(),
            expiry_days: 3650,
            account_name: "Sufuss Test Account".to_string(),
            tenant_name: "Sufuss Tenant".to_string(),
            download_url: "https://download.example.com/dummy".to_string(),
            token_expires_in: 3600,
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Certificate file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// CA certificate offered to devices for download
    pub ca_path: String,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            ca_path: "./certificates/ca.crt".to_string(),
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

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse::<T>().ok())
}

impl SufussConfig {
    /// Load configuration from file and environment.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. `config.toml` file (optional)
    /// 3. Environment variables
    pub fn load() -> LicenseResult<Self> {
        let defaults = SufussConfig::default();

        let builder = Config::builder()
            // Start with defaults
            .set_default("server.host", defaults.server.host.as_str())
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("admin.enabled", defaults.admin.enabled)
            .map_err(config_err)?
            .set_default("admin.host", defaults.admin.host.as_str())
            .map_err(config_err)?
            .set_default("admin.port", i64::from(defaults.admin.port))
            .map_err(config_err)?
            .set_default("admin.username", defaults.admin.username.as_str())
            .map_err(config_err)?
            .set_default("admin.password", defaults.admin.password.as_str())
            .map_err(config_err)?
            .set_default("database.url", defaults.database.url.as_str())
            .map_err(config_err)?
            .set_default("license.key_prefix", defaults.license.key_prefix.as_str())
            .map_err(config_err)?
            .set_default(
                "license.default_duration_days",
                defaults.license.default_duration_days,
            )
            .map_err(config_err)?
            .set_default(
                "license.default_status",
                defaults.license.default_status.as_str(),
            )
            .map_err(config_err)?
            .set_default(
                "license.default_service_status",
                defaults.license.default_service_status.as_str(),
            )
            .map_err(config_err)?
            .set_default("license.seed_demo", defaults.license.seed_demo)
            .map_err(config_err)?
            .set_default("emulation.product", defaults.emulation.product.as_str())
            .map_err(config_err)?
            .set_default("emulation.version", defaults.emulation.version.as_str())
            .map_err(config_err)?
            .set_default("emulation.expiry_days", defaults.emulation.expiry_days)
            .map_err(config_err)?
            .set_default("certificates.ca_path", defaults.certificates.ca_path.as_str())
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level.as_str())
            .map_err(config_err)?
            // Load from config.toml (optional)
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables
            .set_override_option("server.host", env::var("SUFUSS_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option("server.port", env_parsed::<i64>("SUFUSS_SERVER_PORT"))
            .map_err(config_err)?
            .set_override_option("admin.enabled", env_parsed::<bool>("SUFUSS_ADMIN_ENABLED"))
            .map_err(config_err)?
            .set_override_option("admin.host", env::var("SUFUSS_ADMIN_HOST").ok())
            .map_err(config_err)?
            .set_override_option("admin.port", env_parsed::<i64>("SUFUSS_ADMIN_PORT"))
            .map_err(config_err)?
            .set_override_option("admin.username", env::var("SUFUSS_ADMIN_USERNAME").ok())
            .map_err(config_err)?
            .set_override_option("admin.password", env::var("SUFUSS_ADMIN_PASSWORD").ok())
            .map_err(config_err)?
            .set_override_option("database.url", env::var("SUFUSS_DATABASE_URL").ok())
            .map_err(config_err)?
            .set_override_option(
                "license.key_prefix",
                env::var("SUFUSS_LICENSE_KEY_PREFIX").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.default_duration_days",
                env_parsed::<i64>("SUFUSS_DEFAULT_LICENSE_DURATION_DAYS"),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.default_status",
                env::var("SUFUSS_DEFAULT_LICENSE_STATUS").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "license.default_service_status",
                env::var("SUFUSS_DEFAULT_SERVICE_STATUS").ok(),
            )
            .map_err(config_err)?
            .set_override_option("license.seed_demo", env_parsed::<bool>("SUFUSS_SEED_DEMO"))
            .map_err(config_err)?
            .set_override_option("emulation.product", env::var("SUFUSS_EMULATION_PRODUCT").ok())
            .map_err(config_err)?
            .set_override_option("emulation.version", env::var("SUFUSS_EMULATION_VERSION").ok())
            .map_err(config_err)?
            .set_override_option(
                "emulation.expiry_days",
                env_parsed::<i64>("SUFUSS_EMULATION_EXPIRY_DAYS"),
            )
            .map_err(config_err)?
            .set_override_option("certificates.ca_path", env::var("SUFUSS_CA_CERT_PATH").ok())
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("SUFUSS_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        if self.admin.enabled {
            if self.admin.port == 0 {
                return Err(LicenseError::ConfigError(
                    "admin.port must be greater than 0".to_string(),
                ));
            }
            if self.admin.username.is_empty() || self.admin.password.is_empty() {
                return Err(LicenseError::ConfigError(
                    "admin.username and admin.password are required when the admin API is enabled"
                        .to_string(),
                ));
            }
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(LicenseError::ConfigError(format!(
                "database.url must be a sqlite URL, got '{}'",
                self.database.url
            )));
        }

        if self.license.key_prefix.is_empty() {
            return Err(LicenseError::ConfigError(
                "license.key_prefix cannot be empty".to_string(),
            ));
        }
        if self.license.key_segments == 0 || self.license.key_segment_length == 0 {
            return Err(LicenseError::ConfigError(
                "license key segments and segment length must be greater than 0".to_string(),
            ));
        }
        if !(1..=MAX_DURATION_DAYS).contains(&self.license.default_duration_days) {
            return Err(LicenseError::ConfigError(format!(
                "license.default_duration_days must be between 1 and {MAX_DURATION_DAYS}"
            )));
        }

        if !(1..=MAX_DURATION_DAYS).contains(&self.emulation.expiry_days) {
            return Err(LicenseError::ConfigError(format!(
                "emulation.expiry_days must be between 1 and {MAX_DURATION_DAYS}"
            )));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
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
pub fn get_config() -> LicenseResult<&'static SufussConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = SufussConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is fine.
    Ok(CONFIG.get_or_init(|| config))
}
