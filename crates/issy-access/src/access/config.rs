//! Rotation engine configuration.

use serde::{Deserialize, Serialize};

use crate::access::types::*;

/// How often the engine polls the clock.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;
/// Countdown value at or below which the display turns to a warning colour.
pub const DEFAULT_WARNING_SECONDS: u64 = 5;
/// Countdown value at or below which the display turns critical.
pub const DEFAULT_CRITICAL_SECONDS: u64 = 3;

/// Tunables for a [`RotationEngine`](crate::access::RotationEngine).
///
/// The time step itself is not configurable: it is part of the wire
/// contract with the verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RotationConfig {
    /// Poll period in milliseconds. Must be shorter than the time step.
    pub poll_interval_ms: u64,
    pub warning_seconds: u64,
    pub critical_seconds: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            warning_seconds: DEFAULT_WARNING_SECONDS,
            critical_seconds: DEFAULT_CRITICAL_SECONDS,
        }
    }
}

impl RotationConfig {
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_thresholds(mut self, warning_seconds: u64, critical_seconds: u64) -> Self {
        self.warning_seconds = warning_seconds;
        self.critical_seconds = critical_seconds;
        self
    }

    /// Reject settings that would break boundary detection or colouring.
    pub fn validate(&self) -> AccessResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(AccessError::invalid_config("poll interval must be non-zero"));
        }
        if self.poll_interval_ms >= TIME_STEP_MS {
            return Err(AccessError::invalid_config(format!(
                "poll interval {}ms must be shorter than the {}s time step",
                self.poll_interval_ms, TIME_STEP
            )));
        }
        if self.critical_seconds > self.warning_seconds || self.warning_seconds > TIME_STEP {
            return Err(AccessError::invalid_config(
                "thresholds must satisfy critical <= warning <= time step",
            ));
        }
        Ok(())
    }

    /// Colour hint for a countdown value.
    pub fn urgency(&self, remaining_seconds: u64) -> Urgency {
        if remaining_seconds <= self.critical_seconds {
            Urgency::Critical
        } else if remaining_seconds <= self.warning_seconds {
            Urgency::Warning
        } else {
            Urgency::Normal
        }
    }
}
