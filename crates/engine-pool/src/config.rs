//! Pool configuration.
//!
//! Values are layered the same way everywhere: defaults, then a `[pool]` TOML
//! table, then environment overrides.

use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default maximum number of engine connections.
pub const DEFAULT_MAX_SIZE: NonZeroUsize = NonZeroUsize::MIN.saturating_add(3);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Environment variable names
mod vars {
    pub const MAX_SIZE: &str = "ENGINE_POOL_MAX_SIZE";
    pub const ACQUIRE_TIMEOUT_MS: &str = "ENGINE_POOL_ACQUIRE_TIMEOUT_MS";
    pub const POLL_INTERVAL_MS: &str = "ENGINE_POOL_POLL_INTERVAL_MS";
}

/// Pool configuration parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Maximum number of connections the pool will open.
    pub max_size: NonZeroUsize,
    /// Default bound on waiting for a free slot.
    #[serde(rename = "acquire_timeout_ms", with = "millis")]
    pub acquire_timeout: Duration,
    /// Upper bound on each wait between re-checks of the slot table.
    #[serde(rename = "poll_interval_ms", with = "millis")]
    pub poll_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PoolFile {
    #[serde(default)]
    pool: Option<PoolConfig>,
}

impl PoolConfig {
    #[must_use]
    pub const fn with_max_size(mut self, max_size: NonZeroUsize) -> Self {
        self.max_size = max_size;
        self
    }

    #[must_use]
    pub const fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Defaults overlaid with `ENGINE_POOL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env(|name| env::var(name).ok())
    }

    /// Read the `[pool]` table of a TOML document. A missing table yields the
    /// defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: PoolFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse pool config: {e}")))?;
        let config = file.pool.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values returned by `lookup` for the `ENGINE_POOL_*` variables.
    /// Unparseable values are ignored.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(size) = lookup(vars::MAX_SIZE)
            && let Ok(size) = size.trim().parse::<usize>()
            && let Some(size) = NonZeroUsize::new(size)
        {
            self.max_size = size;
        }

        if let Some(ms) = lookup(vars::ACQUIRE_TIMEOUT_MS)
            && let Ok(ms) = ms.trim().parse::<u64>()
        {
            self.acquire_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = lookup(vars::POLL_INTERVAL_MS)
            && let Ok(ms) = ms.trim().parse::<u64>()
        {
            self.poll_interval = Duration::from_millis(ms);
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be greater than zero".into()));
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_size.get(), 4);
        assert_eq!(config.acquire_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_builder_methods() {
        let config = PoolConfig::default()
            .with_max_size(NonZeroUsize::new(2).unwrap())
            .with_acquire_timeout(Duration::from_millis(250))
            .with_poll_interval(Duration::from_millis(5));
        assert_eq!(config.max_size.get(), 2);
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn test_env_overrides() {
        let config = PoolConfig::default()
            .apply_env(lookup(&[
                ("ENGINE_POOL_MAX_SIZE", "8"),
                ("ENGINE_POOL_ACQUIRE_TIMEOUT_MS", " 1500 "),
                ("ENGINE_POOL_POLL_INTERVAL_MS", "20"),
            ]))
            .unwrap();
        assert_eq!(config.max_size.get(), 8);
        assert_eq!(config.acquire_timeout, Duration::from_millis(1500));
        assert_eq!(config.poll_interval, Duration::from_millis(20));
    }

    #[test]
    fn test_env_invalid_values_ignored() {
        let config = PoolConfig::default()
            .apply_env(lookup(&[
                ("ENGINE_POOL_MAX_SIZE", "0"),
                ("ENGINE_POOL_ACQUIRE_TIMEOUT_MS", "soon"),
            ]))
            .unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn test_env_zero_poll_interval_rejected() {
        let err = PoolConfig::default()
            .apply_env(lookup(&[("ENGINE_POOL_POLL_INTERVAL_MS", "0")]))
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_from_toml() {
        let config = PoolConfig::from_toml(
            r"
[pool]
max_size = 2
acquire_timeout_ms = 500
",
        )
        .unwrap();
        assert_eq!(config.max_size.get(), 2);
        assert_eq!(config.acquire_timeout, Duration::from_millis(500));
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_from_toml_missing_table() {
        let config = PoolConfig::from_toml("[other]\nkey = 1\n").unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_zero_size() {
        assert!(PoolConfig::from_toml("[pool]\nmax_size = 0\n").is_err());
        assert!(PoolConfig::from_toml("[pool]\nunknown = 1\n").is_err());
    }
}
