//! Pipeline configuration
//!
//! Soft performance thresholds (cache TTL, flush interval, retry delay) are
//! configuration, not correctness guarantees. Loaded from TOML with env-var
//! overrides layered on top.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub profile: ProfileConfig,
    pub tracker: TrackerConfig,
    pub delivery: DeliveryConfig,
    pub analytics: AnalyticsConfig,
    pub grouping: GroupingConfig,
}

impl PulseConfig {
    /// Load config from a TOML file, falling back to defaults for missing
    /// fields. After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: PulseConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("PULSE_PROFILE_CACHE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.profile.cache_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PULSE_FLUSH_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.tracker.flush_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PULSE_MAX_ATTEMPTS") {
            if let Ok(n) = v.parse() {
                self.delivery.max_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("PULSE_RETRY_DELAY_SECS") {
            if let Ok(n) = v.parse() {
                self.delivery.retry_delay_secs = n;
            }
        }
        if let Ok(v) = std::env::var("PULSE_RETENTION_DAYS") {
            if let Ok(n) = v.parse() {
                self.analytics.retention_days = n;
            }
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    /// How long a computed profile may be served from cache.
    pub cache_ttl_secs: u64,
    /// History window the builder aggregates over.
    pub lookback_days: i64,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self { cache_ttl_secs: 300, lookback_days: 30 }
    }
}

impl ProfileConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Non-critical events are flushed on this interval.
    pub flush_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self { flush_interval_secs: 30 }
    }
}

impl TrackerConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, retry_delay_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Terminal notifications are retained this long for analytics.
    pub retention_days: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { retention_days: 90 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Like events on the same content item are batched into one
    /// notification inside this window.
    pub like_window_secs: u64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self { like_window_secs: 300 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_observed_thresholds() {
        let cfg = PulseConfig::default();
        assert_eq!(cfg.profile.cache_ttl_secs, 300);
        assert_eq!(cfg.profile.lookback_days, 30);
        assert_eq!(cfg.tracker.flush_interval_secs, 30);
        assert_eq!(cfg.delivery.max_attempts, 3);
        assert_eq!(cfg.analytics.retention_days, 90);
        assert_eq!(cfg.grouping.like_window_secs, 300);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: PulseConfig = toml::from_str(
            r#"
            [tracker]
            flush_interval_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.tracker.flush_interval_secs, 5);
        assert_eq!(cfg.profile.cache_ttl_secs, 300);
    }
}
