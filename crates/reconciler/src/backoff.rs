//! Per-record exponential backoff.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::ObjectKey;
use tokio::sync::Mutex;

use crate::config::{as_millis, duration_ms};

/// Exponential backoff with a ceiling: `min_delay * multiplier^attempt`,
/// capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    #[serde(rename = "min_delay_ms", with = "duration_ms", default = "default_min_delay")]
    pub min_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms", default = "default_max_delay")]
    pub max_delay: Duration,
    #[serde(default = "default_multiplier")]
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            min_delay: default_min_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
        }
    }
}

const fn default_min_delay() -> Duration {
    Duration::from_millis(500)
}

const fn default_max_delay() -> Duration {
    Duration::from_secs(300)
}

const fn default_multiplier() -> u32 {
    2
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(min_delay: Duration, max_delay: Duration, multiplier: u32) -> Self {
        Self {
            min_delay,
            max_delay,
            multiplier,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let base_ms = as_millis(self.min_delay);
        let max_ms = as_millis(self.max_delay);
        let backoff = base_ms.saturating_mul(u64::from(self.multiplier).saturating_pow(attempt));
        Duration::from_millis(backoff.min(max_ms))
    }
}

/// Tracks consecutive failed or deferred passes per record.
#[derive(Debug, Default)]
pub struct BackoffTracker {
    policy: BackoffPolicy,
    attempts: Mutex<HashMap<ObjectKey, u32>>,
}

impl BackoffTracker {
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Delay for the next retry of `key`, advancing its attempt count.
    pub async fn next(&self, key: &ObjectKey) -> Duration {
        let mut attempts = self.attempts.lock().await;
        let attempt = attempts.entry(key.clone()).or_insert(0);
        let delay = self.policy.delay(*attempt);
        *attempt = attempt.saturating_add(1);
        delay
    }

    /// The ceiling delay for `key`, still counting the attempt.
    pub async fn ceiling(&self, key: &ObjectKey) -> Duration {
        let mut attempts = self.attempts.lock().await;
        let attempt = attempts.entry(key.clone()).or_insert(0);
        *attempt = attempt.saturating_add(1);
        self.policy.delay(u32::MAX)
    }

    /// Forget `key`; its next retry starts at the minimum delay again.
    pub async fn reset(&self, key: &ObjectKey) {
        self.attempts.lock().await.remove(key);
    }

    pub async fn attempts(&self, key: &ObjectKey) -> u32 {
        self.attempts.lock().await.get(key).copied().unwrap_or(0)
    }
}
