//! Configuration loading for Wayfarer services
//!
//! Settings resolve in priority order:
//! 1. Environment variable (highest priority)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! The config file location itself follows the same pattern: an explicit
//! path argument wins, then `WAYFARER_CONFIG`, then the platform config
//! directory, then `/etc/wayfarer/config.toml` on Linux.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment tier, selects default operational policies (rate limits etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Config(format!(
                "Unknown environment '{}' (expected 'development' or 'production')",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Raw TOML configuration file contents
///
/// All fields are optional; services apply their own defaults for anything
/// the file does not set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Deployment tier ("development" or "production")
    pub environment: Option<String>,
    /// HTTP listen port
    pub port: Option<u16>,
    /// Path to the SQLite database file
    pub database_path: Option<PathBuf>,
    /// OpenTripMap API key
    pub opentripmap_api_key: Option<String>,
    /// Geoapify API key
    pub geoapify_api_key: Option<String>,
    /// Override for the OpenTripMap base URL (testing)
    pub opentripmap_base_url: Option<String>,
    /// Override for the Geoapify base URL (testing)
    pub geoapify_base_url: Option<String>,
    /// Result cache tuning
    pub cache: Option<CacheConfig>,
    /// Circuit breaker tuning
    pub breaker: Option<BreakerConfig>,
}

/// `[cache]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
    /// Seconds a cached provider result stays fresh
    pub ttl_seconds: Option<u64>,
    /// Seconds between background sweeps of expired entries
    pub sweep_interval_seconds: Option<u64>,
}

/// `[breaker]` section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BreakerConfig {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_seconds: Option<u64>,
    pub success_threshold: Option<u32>,
    pub max_half_open_requests: Option<u32>,
}

impl TomlConfig {
    /// Load configuration following the resolution priority order
    ///
    /// Missing config files are not an error: an empty default config is
    /// returned so environment variables and compiled defaults still apply.
    /// A file that exists but fails to parse is an error.
    pub fn load(explicit_path: Option<&Path>) -> Result<TomlConfig> {
        let path = match resolve_config_path(explicit_path) {
            Some(path) => path,
            None => {
                tracing::debug!("No config file found, using defaults");
                return Ok(TomlConfig::default());
            }
        };

        let contents = std::fs::read_to_string(&path)?;
        let config: TomlConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the deployment environment: `WAYFARER_ENV` > TOML > development
    pub fn resolve_environment(&self) -> Result<Environment> {
        if let Ok(value) = std::env::var("WAYFARER_ENV") {
            return value.parse();
        }
        if let Some(value) = &self.environment {
            return value.parse();
        }
        Ok(Environment::Development)
    }
}

/// Find the config file to load, if any
fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: explicit path argument
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var("WAYFARER_CONFIG") {
        return Some(PathBuf::from(path));
    }

    // Priority 3: platform config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("wayfarer").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }

    // Priority 4: system-wide location (Linux)
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/wayfarer/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve an API key: environment variable > TOML value
///
/// Warns when both are set since that usually means a stale deployment.
/// Returns `None` when the key is configured nowhere; callers decide whether
/// the provider is optional.
pub fn resolve_api_key(env_var: &str, toml_value: Option<&String>, label: &str) -> Option<String> {
    let env_key = std::env::var(env_var).ok().filter(|k| !k.trim().is_empty());
    let toml_key = toml_value.cloned().filter(|k| !k.trim().is_empty());

    if env_key.is_some() && toml_key.is_some() {
        tracing::warn!(
            "{} API key set in both {} and config file, using {}",
            label,
            env_var,
            env_var
        );
    }

    match (env_key, toml_key) {
        (Some(key), _) => {
            tracing::info!("{} API key loaded from environment", label);
            Some(key)
        }
        (None, Some(key)) => {
            tracing::info!("{} API key loaded from config file", label);
            Some(key)
        }
        (None, None) => None,
    }
}
