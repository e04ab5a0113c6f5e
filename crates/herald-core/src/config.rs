//! Centralized configuration for the Herald runtime
//!
//! Each subsystem owns a small config struct with sensible defaults; the
//! master [`HeraldConfig`] consolidates them and validates the combination.
//! Durations are stored as integer seconds/milliseconds so values survive
//! layered TOML/env loading untouched; accessor methods hand out
//! [`Duration`]s.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ----------------------------------------------------------------------------
// Reconnect Configuration
// ----------------------------------------------------------------------------

/// Policy for the supervisor's reconnect loop.
///
/// The defaults reproduce the original behavior: a fixed 5s delay with no
/// attempt cap, favoring availability over fast-fail. Setting
/// `backoff_multiplier` above 1.0 turns on exponential growth up to
/// `max_delay_secs` without any structural change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first retry after a close or a failed start.
    pub initial_delay_secs: u64,
    /// Growth factor applied after each consecutive failure (1.0 = fixed).
    pub backoff_multiplier: f64,
    /// Upper bound on the grown delay.
    pub max_delay_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 5,
            backoff_multiplier: 1.0,
            max_delay_secs: 60,
        }
    }
}

impl ReconnectConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// The delay to use after `delay` just elapsed and the attempt failed.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay.mul_f64(self.backoff_multiplier.max(1.0));
        grown.min(Duration::from_secs(self.max_delay_secs))
    }

    /// Fast retries for tests.
    pub fn testing() -> Self {
        Self {
            initial_delay_secs: 0,
            backoff_multiplier: 1.0,
            max_delay_secs: 1,
        }
    }
}

// ----------------------------------------------------------------------------
// Supervisor Configuration
// ----------------------------------------------------------------------------

/// Behavior of the connection supervisor itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Reconnect policy.
    pub reconnect: ReconnectConfig,
    /// Delay after transport construction before requesting a pairing code,
    /// giving the transport time to stabilize.
    pub pairing_delay_secs: u64,
    /// When set, non-group messages not authored by the instance owner are
    /// dropped before dispatch.
    pub owner_only: bool,
    /// Rolling window in which a rejected caller is notified at most once.
    pub call_notify_window_secs: u64,
    /// Delay between rejecting a call and blocking the caller.
    pub call_block_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            pairing_delay_secs: 3,
            owner_only: false,
            call_notify_window_secs: 60,
            call_block_delay_ms: 800,
        }
    }
}

impl SupervisorConfig {
    pub fn pairing_delay(&self) -> Duration {
        Duration::from_secs(self.pairing_delay_secs)
    }

    pub fn call_notify_window(&self) -> Duration {
        Duration::from_secs(self.call_notify_window_secs)
    }

    pub fn call_block_delay(&self) -> Duration {
        Duration::from_millis(self.call_block_delay_ms)
    }

    pub fn testing() -> Self {
        Self {
            reconnect: ReconnectConfig::testing(),
            pairing_delay_secs: 0,
            owner_only: false,
            call_notify_window_secs: 60,
            call_block_delay_ms: 1,
        }
    }
}

// ----------------------------------------------------------------------------
// Event Cache Configuration
// ----------------------------------------------------------------------------

/// Event cache sizing and flush cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Interval between durable snapshots of the in-memory cache.
    pub flush_interval_secs: u64,
    /// Cap on retained messages; the oldest insertion is evicted first.
    pub max_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 10,
            max_messages: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

// ----------------------------------------------------------------------------
// Memory Watchdog Configuration
// ----------------------------------------------------------------------------

/// Resident-memory watchdog. A breach is fatal: the process exits
/// non-zero and an external process manager restarts it fresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Interval between resident-memory samples.
    pub check_interval_secs: u64,
    /// Resident set size above which the process terminates itself.
    pub max_rss_bytes: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            max_rss_bytes: 400 * 1024 * 1024,
        }
    }
}

impl MemoryConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }
}

// ----------------------------------------------------------------------------
// Control Surface Configuration
// ----------------------------------------------------------------------------

/// Loopback HTTP control surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Grace period between acknowledging a stop request and terminating,
    /// long enough for the HTTP response to flush.
    pub stop_grace_ms: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { stop_grace_ms: 500 }
    }
}

impl ControlConfig {
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Default control port when none is supplied at startup.
pub const DEFAULT_CONTROL_PORT: u16 = 3001;

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration consolidating all Herald subsystems.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    pub supervisor: SupervisorConfig,
    pub cache: CacheConfig,
    pub memory: MemoryConfig,
    pub control: ControlConfig,
}

impl HeraldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with timings collapsed for tests.
    pub fn testing() -> Self {
        Self {
            supervisor: SupervisorConfig::testing(),
            cache: CacheConfig {
                flush_interval_secs: 1,
                max_messages: 100,
            },
            memory: MemoryConfig {
                check_interval_secs: 1,
                ..Default::default()
            },
            control: ControlConfig { stop_grace_ms: 10 },
        }
    }

    /// Validate the configuration for consistency and feasibility.
    pub fn validate(&self) -> Result<(), String> {
        if self.supervisor.reconnect.backoff_multiplier < 1.0 {
            return Err("Reconnect backoff multiplier must be at least 1.0".into());
        }
        if self.supervisor.reconnect.max_delay_secs < self.supervisor.reconnect.initial_delay_secs {
            return Err("Reconnect max delay cannot be below the initial delay".into());
        }
        if self.cache.max_messages == 0 {
            return Err("Cache message cap cannot be zero".into());
        }
        if self.cache.flush_interval_secs == 0 {
            return Err("Cache flush interval cannot be zero".into());
        }
        if self.memory.max_rss_bytes == 0 {
            return Err("Memory threshold cannot be zero".into());
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(HeraldConfig::default().validate().is_ok());
        assert!(HeraldConfig::testing().validate().is_ok());
    }

    #[test]
    fn fixed_delay_stays_fixed() {
        let reconnect = ReconnectConfig::default();
        let d = reconnect.initial_delay();
        assert_eq!(reconnect.next_delay(d), d);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let reconnect = ReconnectConfig {
            initial_delay_secs: 5,
            backoff_multiplier: 2.0,
            max_delay_secs: 15,
        };
        let d1 = reconnect.next_delay(reconnect.initial_delay());
        assert_eq!(d1, Duration::from_secs(10));
        let d2 = reconnect.next_delay(d1);
        assert_eq!(d2, Duration::from_secs(15));
        assert_eq!(reconnect.next_delay(d2), Duration::from_secs(15));
    }

    #[test]
    fn invalid_config_rejected() {
        let mut config = HeraldConfig::default();
        config.cache.max_messages = 0;
        assert!(config.validate().is_err());

        let mut config = HeraldConfig::default();
        config.supervisor.reconnect.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }
}
