//! Configuration resolution for wayfarer-poi
//!
//! Builds the service's operational settings from the shared TOML config
//! plus environment variables, with compiled defaults for everything else.
//! API keys resolve ENV first, then TOML; a missing key disables that
//! provider rather than failing startup, since the database source alone is
//! a working (if shallow) deployment.

use crate::services::circuit_breaker::BreakerConfig;
use crate::services::rate_limiter::RateLimitPolicy;
use std::path::PathBuf;
use std::time::Duration;
use wayfarer_common::config::{resolve_api_key, Environment, TomlConfig};
use wayfarer_common::Result;

const DEFAULT_PORT: u16 = 5731;
const DEFAULT_DATABASE_PATH: &str = "wayfarer.db";
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub environment: Environment,
    pub port: u16,
    pub database_path: PathBuf,
    pub opentripmap_api_key: Option<String>,
    pub geoapify_api_key: Option<String>,
    pub opentripmap_base_url: Option<String>,
    pub geoapify_base_url: Option<String>,
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub breaker: BreakerConfig,
    pub rate_policy: RateLimitPolicy,
}

impl ServiceSettings {
    /// Resolve settings from a loaded TOML config
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        let environment = config.resolve_environment()?;

        let database_path = std::env::var("WAYFARER_DATABASE")
            .map(PathBuf::from)
            .ok()
            .or_else(|| config.database_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let opentripmap_api_key = resolve_api_key(
            "WAYFARER_OPENTRIPMAP_API_KEY",
            config.opentripmap_api_key.as_ref(),
            "OpenTripMap",
        );
        let geoapify_api_key = resolve_api_key(
            "WAYFARER_GEOAPIFY_API_KEY",
            config.geoapify_api_key.as_ref(),
            "Geoapify",
        );

        let cache_ttl = config
            .cache
            .as_ref()
            .and_then(|c| c.ttl_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL);
        let sweep_interval = config
            .cache
            .as_ref()
            .and_then(|c| c.sweep_interval_seconds)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);

        let defaults = BreakerConfig::default();
        let breaker_toml = config.breaker.clone().unwrap_or_default();
        let breaker = BreakerConfig {
            failure_threshold: breaker_toml
                .failure_threshold
                .unwrap_or(defaults.failure_threshold),
            recovery_timeout: breaker_toml
                .recovery_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.recovery_timeout),
            success_threshold: breaker_toml
                .success_threshold
                .unwrap_or(defaults.success_threshold),
            max_half_open_requests: breaker_toml
                .max_half_open_requests
                .unwrap_or(defaults.max_half_open_requests),
        };

        Ok(Self {
            environment,
            port: config.port.unwrap_or(DEFAULT_PORT),
            database_path,
            opentripmap_api_key,
            geoapify_api_key,
            opentripmap_base_url: config.opentripmap_base_url.clone(),
            geoapify_base_url: config.geoapify_base_url.clone(),
            cache_ttl,
            sweep_interval,
            breaker,
            rate_policy: RateLimitPolicy::for_environment(environment),
        })
    }
}
