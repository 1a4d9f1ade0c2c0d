//! Process-wide runtime configuration, loaded from TOML with environment
//! overrides, mirroring `fraiseql-observers::config::ObserverRuntimeConfig`'s
//! load-then-validate shape.

use serde::Deserialize;

/// A single bad value caught at construction time rather than discovered
/// later as a confusing runtime failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value parsed fine but violates a range or consistency invariant.
    #[error("invalid config: {message}")]
    Invalid {
        /// Description of the violated constraint.
        message: String,
    },
}

/// Runtime tunables shared across the sync core: batch size, timeouts,
/// rate-limit defaults, usage-flush threshold, cache TTL, and the
/// debug/production error-body toggle (spec §7).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Entities pulled from a source per `next_batch` call.
    pub batch_size: usize,
    /// Seconds a running job may go without a batch before it is
    /// considered stalled by an out-of-scope supervisor.
    pub inactivity_timeout_secs: u64,
    /// Default sliding-window call quota for a plan with no explicit
    /// override.
    pub default_rate_limit_quota: u32,
    /// Default sliding-window width, in seconds.
    pub default_rate_limit_window_secs: u64,
    /// Buffered usage magnitude, per action type, that triggers an
    /// automatic flush.
    pub usage_flush_threshold: u64,
    /// Context cache entry time-to-live, in seconds.
    pub context_cache_ttl_secs: u64,
    /// Whether error bodies include the verbose debug shape (stack
    /// trace string) instead of the production shape (spec §7).
    pub debug_mode: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            inactivity_timeout_secs: 300,
            default_rate_limit_quota: 100,
            default_rate_limit_window_secs: 60,
            usage_flush_threshold: 1000,
            context_cache_ttl_secs: 30,
            debug_mode: false,
        }
    }
}

impl RuntimeConfig {
    /// Parse a TOML document into a validated config.
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on malformed TOML, or
    /// [`ConfigError::Invalid`] if a parsed value fails [`Self::validate`].
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `AIRWEAVE_`-prefixed environment overrides on top of an
    /// already-parsed config, then re-validate. Mirrors the teacher
    /// config loader's env-overlay step so a deployment can override a
    /// handful of values without a full file rewrite.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] if an override produces an
    /// inconsistent config.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Ok(value) = std::env::var("AIRWEAVE_BATCH_SIZE") {
            self.batch_size = value
                .parse()
                .map_err(|_| ConfigError::Invalid { message: "AIRWEAVE_BATCH_SIZE must be a positive integer".to_string() })?;
        }
        if let Ok(value) = std::env::var("AIRWEAVE_DEBUG_MODE") {
            self.debug_mode = value.eq_ignore_ascii_case("true") || value == "1";
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject combinations that would silently misbehave rather than
    /// fail loudly at startup.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first violated
    /// constraint found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid { message: "batch_size must be greater than zero".to_string() });
        }
        if self.default_rate_limit_quota == 0 {
            return Err(ConfigError::Invalid {
                message: "default_rate_limit_quota must be greater than zero".to_string(),
            });
        }
        if self.default_rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "default_rate_limit_window_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RuntimeConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let raw = "batch_size = 0";
        let err = RuntimeConfig::from_toml(raw).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn partial_toml_falls_back_to_defaults_for_missing_fields() {
        let raw = "batch_size = 50";
        let config = RuntimeConfig::from_toml(raw).unwrap();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.usage_flush_threshold, 1000);
    }
}
