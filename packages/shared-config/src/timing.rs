//! Typing and polling cadences

use std::time::Duration;

use crate::{parse_env, ConfigError, ConfigResult};

/// Timing parameters for the interaction coordinators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingConfig {
    /// Minimum spacing between `typing-start` emissions (milliseconds)
    pub typing_throttle_ms: u64,

    /// Quiet period after the last keystroke before `typing-stop` (milliseconds)
    pub typing_debounce_ms: u64,

    /// Interval between pending key-exchange polls (seconds)
    pub exchange_poll_secs: u64,
}

impl TimingConfig {
    /// Load timing configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            typing_throttle_ms: parse_env("TYPING_THROTTLE_MS", 300)?,
            typing_debounce_ms: parse_env("TYPING_DEBOUNCE_MS", 1000)?,
            exchange_poll_secs: parse_env("EXCHANGE_POLL_SECS", 30)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject cadences the coordinators cannot honour
    pub fn validate(&self) -> ConfigResult<()> {
        if self.typing_debounce_ms == 0 {
            return Err(ConfigError::ValidationError(
                "TYPING_DEBOUNCE_MS must be greater than zero".to_string(),
            ));
        }
        if self.exchange_poll_secs == 0 {
            return Err(ConfigError::ValidationError(
                "EXCHANGE_POLL_SECS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn typing_throttle(&self) -> Duration {
        Duration::from_millis(self.typing_throttle_ms)
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn exchange_poll_interval(&self) -> Duration {
        Duration::from_secs(self.exchange_poll_secs)
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            typing_throttle_ms: 300,
            typing_debounce_ms: 1000,
            exchange_poll_secs: 30,
        }
    }
}
