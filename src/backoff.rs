//! Re-invocation cadence and abandonment bound

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay between re-invocations and how long an operation may stay in progress.
///
/// Invariants: `timeout >= delay`, and both are whole seconds since that is
/// all the host and the serialized form carry. The engine never sleeps on
/// this; it only reports `delay` back to the host in `InProgress` outcomes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBackoff", into = "RawBackoff")]
pub struct BackoffPolicy {
    delay: Duration,
    timeout: Duration,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct RawBackoff {
    delay_seconds: u64,
    timeout_seconds: u64,
}

impl TryFrom<RawBackoff> for BackoffPolicy {
    type Error = ConfigError;

    fn try_from(raw: RawBackoff) -> Result<Self, Self::Error> {
        BackoffPolicy::new(
            Duration::from_secs(raw.delay_seconds),
            Duration::from_secs(raw.timeout_seconds),
        )
    }
}

impl From<BackoffPolicy> for RawBackoff {
    fn from(policy: BackoffPolicy) -> Self {
        RawBackoff {
            delay_seconds: policy.delay.as_secs(),
            timeout_seconds: policy.timeout.as_secs(),
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            timeout: Duration::from_secs(3 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    pub fn new(delay: Duration, timeout: Duration) -> Result<Self, ConfigError> {
        whole_seconds("delay", delay)?;
        whole_seconds("timeout", timeout)?;
        if timeout < delay {
            return Err(ConfigError::TimeoutShorterThanDelay {
                delay_seconds: delay.as_secs(),
                timeout_seconds: timeout.as_secs(),
            });
        }
        Ok(Self { delay, timeout })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay to report in an `InProgress` outcome
    pub fn delay_seconds(&self) -> u32 {
        u32::try_from(self.delay.as_secs()).unwrap_or(u32::MAX)
    }

    /// Whether an operation that has been in progress for `elapsed` should be abandoned
    pub fn is_exhausted(&self, elapsed: Duration) -> bool {
        elapsed >= self.timeout
    }

    /// Upper bound on re-invocations before the timeout is reached
    pub fn max_invocations(&self) -> u32 {
        if self.delay.is_zero() {
            return u32::MAX;
        }
        let n = self.timeout.as_secs() / self.delay.as_secs();
        u32::try_from(n).unwrap_or(u32::MAX)
    }
}

fn whole_seconds(field: &'static str, value: Duration) -> Result<(), ConfigError> {
    if value.subsec_nanos() == 0 {
        return Ok(());
    }
    Err(ConfigError::SubSecondDuration {
        field,
        millis: value.as_millis(),
    })
}
