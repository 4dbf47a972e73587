//! Live Room configuration.
//!
//! Configuration is loaded from `LIVE_ROOM_*` environment variables, every
//! value has a default so an empty environment yields a usable config.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default number of co-broadcast seats (the owner's seat is implicit).
pub const DEFAULT_SEAT_COUNT: u32 = 1;

/// Default room actor mailbox capacity.
pub const DEFAULT_MAILBOX_BUFFER: usize = 100;

/// Default event channel capacity per room.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// Default attempts per coordination request (including the first).
pub const DEFAULT_COORDINATION_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for coordination retry backoff, in milliseconds.
pub const DEFAULT_COORDINATION_BACKOFF_BASE_MS: u64 = 250;

/// Default maximum coordination retry backoff, in milliseconds.
pub const DEFAULT_COORDINATION_BACKOFF_MAX_MS: u64 = 4_000;

/// Default per-attempt coordination timeout, in milliseconds.
pub const DEFAULT_COORDINATION_TIMEOUT_MS: u64 = 10_000;

/// Upper bound on seats; the mode resolver only distinguishes 0 or 1 occupant.
pub const MAX_SEAT_COUNT: u32 = 8;

/// Live Room configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of co-broadcast seats, indexed from 1 (default: 1).
    pub seat_count: u32,

    /// Room actor mailbox capacity (default: 100).
    pub mailbox_buffer: usize,

    /// Event broadcast channel capacity (default: 64).
    pub event_buffer: usize,

    /// Retry policy applied by `RetryingCoordinator`.
    pub retry: RetryPolicy,
}

/// Retry policy for coordination requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, including the first (minimum 1).
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each subsequent retry.
    pub backoff_base: Duration,
    /// Cap for the doubled delay.
    pub backoff_max: Duration,
    /// Deadline for a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_COORDINATION_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(DEFAULT_COORDINATION_BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(DEFAULT_COORDINATION_BACKOFF_MAX_MS),
            attempt_timeout: Duration::from_millis(DEFAULT_COORDINATION_TIMEOUT_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let mut delay = self.backoff_base;
        for _ in 1..retry {
            delay = (delay * 2).min(self.backoff_max);
        }
        delay.min(self.backoff_max)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seat_count: DEFAULT_SEAT_COUNT,
            mailbox_buffer: DEFAULT_MAILBOX_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let seat_count = parse_var(vars, "LIVE_ROOM_SEAT_COUNT", DEFAULT_SEAT_COUNT)?;
        if seat_count == 0 || seat_count > MAX_SEAT_COUNT {
            return Err(ConfigError::InvalidValue(format!(
                "LIVE_ROOM_SEAT_COUNT must be between 1 and {MAX_SEAT_COUNT}, got {seat_count}"
            )));
        }

        let mailbox_buffer = parse_var(vars, "LIVE_ROOM_MAILBOX_BUFFER", DEFAULT_MAILBOX_BUFFER)?;
        let event_buffer = parse_var(vars, "LIVE_ROOM_EVENT_BUFFER", DEFAULT_EVENT_BUFFER)?;
        if mailbox_buffer == 0 || event_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "channel buffers must be non-zero".to_string(),
            ));
        }

        let max_attempts = parse_var(
            vars,
            "LIVE_ROOM_COORDINATION_MAX_ATTEMPTS",
            DEFAULT_COORDINATION_MAX_ATTEMPTS,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "LIVE_ROOM_COORDINATION_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        let backoff_base_ms = parse_var(
            vars,
            "LIVE_ROOM_COORDINATION_BACKOFF_BASE_MS",
            DEFAULT_COORDINATION_BACKOFF_BASE_MS,
        )?;
        let backoff_max_ms = parse_var(
            vars,
            "LIVE_ROOM_COORDINATION_BACKOFF_MAX_MS",
            DEFAULT_COORDINATION_BACKOFF_MAX_MS,
        )?;
        if backoff_max_ms < backoff_base_ms {
            return Err(ConfigError::InvalidValue(
                "LIVE_ROOM_COORDINATION_BACKOFF_MAX_MS is below the base delay".to_string(),
            ));
        }

        let timeout_ms = parse_var(
            vars,
            "LIVE_ROOM_COORDINATION_TIMEOUT_MS",
            DEFAULT_COORDINATION_TIMEOUT_MS,
        )?;

        Ok(Config {
            seat_count,
            mailbox_buffer,
            event_buffer,
            retry: RetryPolicy {
                max_attempts,
                backoff_base: Duration::from_millis(backoff_base_ms),
                backoff_max: Duration::from_millis(backoff_max_ms),
                attempt_timeout: Duration::from_millis(timeout_ms),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{key}={raw}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("Config should load successfully");

        assert_eq!(config.seat_count, DEFAULT_SEAT_COUNT);
        assert_eq!(config.mailbox_buffer, DEFAULT_MAILBOX_BUFFER);
        assert_eq!(config.event_buffer, DEFAULT_EVENT_BUFFER);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            ("LIVE_ROOM_SEAT_COUNT".to_string(), "2".to_string()),
            ("LIVE_ROOM_MAILBOX_BUFFER".to_string(), "16".to_string()),
            ("LIVE_ROOM_EVENT_BUFFER".to_string(), "8".to_string()),
            (
                "LIVE_ROOM_COORDINATION_MAX_ATTEMPTS".to_string(),
                "5".to_string(),
            ),
            (
                "LIVE_ROOM_COORDINATION_BACKOFF_BASE_MS".to_string(),
                "100".to_string(),
            ),
            (
                "LIVE_ROOM_COORDINATION_BACKOFF_MAX_MS".to_string(),
                "800".to_string(),
            ),
            (
                "LIVE_ROOM_COORDINATION_TIMEOUT_MS".to_string(),
                "2000".to_string(),
            ),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.seat_count, 2);
        assert_eq!(config.mailbox_buffer, 16);
        assert_eq!(config.event_buffer, 8);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(100));
        assert_eq!(config.retry.backoff_max, Duration::from_millis(800));
        assert_eq!(config.retry.attempt_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_from_vars_rejects_zero_seats() {
        let vars = HashMap::from([("LIVE_ROOM_SEAT_COUNT".to_string(), "0".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_from_vars_rejects_unparsable_value() {
        let vars = HashMap::from([(
            "LIVE_ROOM_COORDINATION_TIMEOUT_MS".to_string(),
            "soon".to_string(),
        )]);
        let result = Config::from_vars(&vars);
        assert!(
            matches!(result, Err(ConfigError::InvalidValue(v)) if v.contains("LIVE_ROOM_COORDINATION_TIMEOUT_MS"))
        );
    }

    #[test]
    fn test_from_vars_rejects_inverted_backoff() {
        let vars = HashMap::from([
            (
                "LIVE_ROOM_COORDINATION_BACKOFF_BASE_MS".to_string(),
                "1000".to_string(),
            ),
            (
                "LIVE_ROOM_COORDINATION_BACKOFF_MAX_MS".to_string(),
                "10".to_string(),
            ),
        ]);
        assert!(Config::from_vars(&vars).is_err());
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let policy = RetryPolicy {
            max_attempts: 6,
            backoff_base: Duration::from_millis(250),
            backoff_max: Duration::from_millis(1_500),
            attempt_timeout: Duration::from_secs(1),
        };

        assert_eq!(policy.backoff_for(1), Duration::from_millis(250));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(1_000));
        // 2000ms -> capped
        assert_eq!(policy.backoff_for(4), Duration::from_millis(1_500));
        assert_eq!(policy.backoff_for(5), Duration::from_millis(1_500));
    }
}
