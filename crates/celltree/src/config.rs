#![forbid(unsafe_code)]

//! Timing configuration for polling and persistence.

use std::env;

use web_time::Duration;

/// Environment variable overriding [`PollerConfig::fast_interval_ms`].
pub const ENV_POLL_FAST_MS: &str = "CELLTREE_POLL_FAST_MS";
/// Environment variable overriding [`PollerConfig::slow_interval_ms`].
pub const ENV_POLL_SLOW_MS: &str = "CELLTREE_POLL_SLOW_MS";
/// Environment variable overriding [`PollerConfig::persist_delay_ms`].
pub const ENV_PERSIST_DELAY_MS: &str = "CELLTREE_PERSIST_DELAY_MS";

/// Poll and persistence intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PollerConfig {
    /// Interval between ticks of the fast queue (about 30 Hz by default).
    pub fast_interval_ms: u64,
    /// Interval between ticks of the slow queue.
    pub slow_interval_ms: u64,
    /// Delay between a detected change and the state file write.
    pub persist_delay_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 1000 / 30,
            slow_interval_ms: 1000,
            persist_delay_ms: 1000,
        }
    }
}

impl PollerConfig {
    #[must_use]
    pub fn with_fast_interval_ms(mut self, ms: u64) -> Self {
        self.fast_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn with_slow_interval_ms(mut self, ms: u64) -> Self {
        self.slow_interval_ms = ms;
        self
    }

    #[must_use]
    pub fn with_persist_delay_ms(mut self, ms: u64) -> Self {
        self.persist_delay_ms = ms;
        self
    }

    /// Defaults overridden by the `CELLTREE_*` environment variables.
    ///
    /// Values that do not parse as a positive integer are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |name: &str| {
            lookup(name)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .filter(|&ms| ms > 0)
        };
        if let Some(ms) = read(ENV_POLL_FAST_MS) {
            config.fast_interval_ms = ms;
        }
        if let Some(ms) = read(ENV_POLL_SLOW_MS) {
            config.slow_interval_ms = ms;
        }
        if let Some(ms) = read(ENV_PERSIST_DELAY_MS) {
            config.persist_delay_ms = ms;
        }
        config
    }

    /// Fast tick interval, never zero.
    #[must_use]
    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms.max(1))
    }

    /// Slow tick interval, never zero.
    #[must_use]
    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms.max(1))
    }

    #[must_use]
    pub fn persist_delay(&self) -> Duration {
        Duration::from_millis(self.persist_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = PollerConfig::default();
        assert_eq!(config.fast_interval_ms, 33);
        assert_eq!(config.slow_interval(), Duration::from_secs(1));
        assert_eq!(config.persist_delay(), Duration::from_secs(1));
    }

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            (ENV_POLL_FAST_MS, " 10 "),
            (ENV_POLL_SLOW_MS, "soon"),
            (ENV_PERSIST_DELAY_MS, "0"),
        ]
        .into_iter()
        .collect();
        let config = PollerConfig::from_lookup(|name| vars.get(name).map(|v| (*v).to_owned()));
        assert_eq!(config.fast_interval_ms, 10);
        assert_eq!(config.slow_interval_ms, 1000);
        assert_eq!(config.persist_delay_ms, 1000);
    }

    #[test]
    fn zero_intervals_clamp_to_one_ms() {
        let config = PollerConfig::default().with_fast_interval_ms(0);
        assert_eq!(config.fast_interval(), Duration::from_millis(1));
    }
}
