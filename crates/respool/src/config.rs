//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Default time to wait for an idle resource.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(1000);

/// Default capacity used by [`PoolConfig::default()`].
pub const DEFAULT_CAPACITY: usize = 10;

/// Configuration for a resource pool.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future minor versions without breaking changes. Use
/// [`PoolConfig::new()`] with the builder methods, or [`Default::default()`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Total number of resources the pool may hold, idle plus in use.
    pub capacity: usize,

    /// Number of idle resources the pool keeps ready when capacity allows.
    pub min_idle: usize,

    /// Number of idle resources above which returned resources are destroyed.
    pub max_idle: usize,

    /// Extra creation attempts after the first one fails.
    pub retry: usize,

    /// How long `borrow()` waits for an idle resource.
    pub wait: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl PoolConfig {
    /// Create a configuration for `capacity` resources.
    ///
    /// The remaining values are derived: `min_idle = max(1, capacity / 10)`,
    /// `max_idle = capacity`, `retry = 0`, `wait = 1s`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            min_idle: (capacity / 10).max(1),
            max_idle: capacity,
            retry: 0,
            wait: DEFAULT_WAIT,
        }
    }

    /// Set the minimum number of idle resources.
    #[must_use]
    pub fn min_idle(mut self, count: usize) -> Self {
        self.min_idle = count;
        self
    }

    /// Set the maximum number of idle resources.
    #[must_use]
    pub fn max_idle(mut self, count: usize) -> Self {
        self.max_idle = count;
        self
    }

    /// Set the number of extra creation attempts.
    #[must_use]
    pub fn retry(mut self, count: usize) -> Self {
        self.retry = count;
        self
    }

    /// Set how long `borrow()` waits for an idle resource.
    #[must_use]
    pub fn wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Number of resources heated at construction.
    #[must_use]
    pub fn initial_idle(&self) -> usize {
        self.min_idle.min(self.capacity)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.capacity == 0 {
            return Err(PoolError::Configuration(
                "capacity must be greater than 0".into(),
            ));
        }
        if self.min_idle > self.max_idle {
            return Err(PoolError::Configuration(
                "min_idle cannot be greater than max_idle".into(),
            ));
        }
        Ok(())
    }

    /// Parse a settings string such as
    /// `"capacity=20;min idle=4;max idle=10;retry=2;wait=250"`.
    ///
    /// Keys are case-insensitive and may use spaces, dashes or underscores.
    /// `wait` is in milliseconds. Values not given keep the defaults derived
    /// from `capacity`; an explicit `min idle` or `max idle` always wins
    /// regardless of key order.
    pub fn from_settings_string(settings: &str) -> Result<Self, PoolError> {
        let mut capacity = None;
        let mut min_idle = None;
        let mut max_idle = None;
        let mut retry = None;
        let mut wait = None;

        for part in settings.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| PoolError::Configuration(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase().replace(['-', '_'], " ");
            let value = value.trim();

            match key.as_str() {
                "capacity" | "max size" | "pool size" => capacity = Some(parse_count(&key, value)?),
                "min idle" => min_idle = Some(parse_count(&key, value)?),
                "max idle" => max_idle = Some(parse_count(&key, value)?),
                "retry" | "retries" => retry = Some(parse_count(&key, value)?),
                "wait" | "wait ms" | "timeout" => {
                    let millis: u64 = value.parse().map_err(|_| {
                        PoolError::Configuration(format!("invalid wait: {value}"))
                    })?;
                    wait = Some(Duration::from_millis(millis));
                }
                _ => {
                    tracing::debug!(key = %key, "ignoring unknown pool setting");
                }
            }
        }

        let mut config = Self::new(capacity.unwrap_or(DEFAULT_CAPACITY));
        if let Some(count) = min_idle {
            config.min_idle = count;
        }
        if let Some(count) = max_idle {
            config.max_idle = count;
        }
        if let Some(count) = retry {
            config.retry = count;
        }
        if let Some(wait) = wait {
            config.wait = wait;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_count(key: &str, value: &str) -> Result<usize, PoolError> {
    value
        .parse()
        .map_err(|_| PoolError::Configuration(format!("invalid {key}: {value}")))
}
