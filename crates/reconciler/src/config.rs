//! Reconciler and controller configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tether_core::{Error, Result};

use crate::backoff::BackoffPolicy;

/// Settings for a single kind's reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Requeue delays for failed or deferred passes.
    #[serde(default)]
    pub backoff: BackoffPolicy,

    /// Deadline for a single adapter call.
    #[serde(rename = "adapter_timeout_ms", with = "duration_ms", default = "default_adapter_timeout")]
    pub adapter_timeout: Duration,

    /// Whole-pass retries on a storage conflict before requeueing.
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,

    /// Re-verify Ready records this often. `None` leaves them alone until
    /// the next notification.
    #[serde(rename = "resync_interval_ms", with = "option_duration_ms", default)]
    pub resync_interval: Option<Duration>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            adapter_timeout: default_adapter_timeout(),
            max_conflict_retries: default_max_conflict_retries(),
            resync_interval: None,
        }
    }
}

const fn default_adapter_timeout() -> Duration {
    Duration::from_secs(30)
}

const fn default_max_conflict_retries() -> u32 {
    3
}

impl ReconcilerConfig {
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub const fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_resync_interval(mut self, interval: Duration) -> Self {
        self.resync_interval = Some(interval);
        self
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` for zero or inverted durations, and for a
    /// minimum backoff below one millisecond.
    pub fn validate(&self) -> Result<()> {
        // Requeues are scheduled in whole milliseconds.
        if as_millis(self.backoff.min_delay) == 0 {
            return Err(Error::invalid_config("backoff.min_delay_ms must be at least 1"));
        }
        if self.backoff.max_delay < self.backoff.min_delay {
            return Err(Error::invalid_config(
                "backoff.max_delay_ms must not be below backoff.min_delay_ms",
            ));
        }
        if self.backoff.multiplier == 0 {
            return Err(Error::invalid_config("backoff.multiplier must be at least 1"));
        }
        if self.adapter_timeout.is_zero() {
            return Err(Error::invalid_config("adapter_timeout_ms must be positive"));
        }
        if self.resync_interval.is_some_and(|d| d.is_zero()) {
            return Err(Error::invalid_config("resync_interval_ms must be positive"));
        }
        Ok(())
    }
}

/// Settings for a controller running many kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Concurrent reconciliation workers.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Defaults applied to every registered kind.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            reconciler: ReconcilerConfig::default(),
        }
    }
}

const fn default_workers() -> usize {
    4
}

impl ControllerConfig {
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn with_reconciler(mut self, reconciler: ReconcilerConfig) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Parse and validate TOML.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text does not parse or validate.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the text does not parse or validate.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a `.toml` or `.json` file.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the file cannot be read, has another
    /// extension, or does not parse or validate.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(Error::invalid_config(format!(
                "{}: expected a .toml or .json file",
                path.display()
            ))),
        }
    }

    /// # Errors
    ///
    /// Returns `InvalidConfig` if any setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        self.reconciler.validate()
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Serialization helper for Duration as milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        super::as_millis(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

/// Serialization helper for `Option<Duration>` as milliseconds.
pub(crate) mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        duration
            .map(super::as_millis)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]

    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.reconciler.max_conflict_retries, 3);
        assert_eq!(config.reconciler.resync_interval, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_with_partial_fields() {
        let text = r"
            workers = 8

            [reconciler]
            adapter_timeout_ms = 2500
            resync_interval_ms = 60000

            [reconciler.backoff]
            min_delay_ms = 100
        ";
        let config = ControllerConfig::from_toml_str(text).ok();
        assert_eq!(config.as_ref().map(|c| c.workers), Some(8));
        assert_eq!(
            config.as_ref().map(|c| c.reconciler.adapter_timeout),
            Some(Duration::from_millis(2500))
        );
        assert_eq!(
            config.as_ref().and_then(|c| c.reconciler.resync_interval),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            config.as_ref().map(|c| c.reconciler.backoff.min_delay),
            Some(Duration::from_millis(100))
        );
        assert_eq!(
            config.map(|c| c.reconciler.backoff.max_delay),
            Some(Duration::from_secs(300))
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            ControllerConfig::from_toml_str("workers = 0"),
            Err(Error::InvalidConfig { .. })
        ));

        let inverted = r"
            [reconciler.backoff]
            min_delay_ms = 1000
            max_delay_ms = 10
        ";
        assert!(ControllerConfig::from_toml_str(inverted).is_err());
        assert!(ControllerConfig::from_toml_str("workers = \"many\"").is_err());
    }

    #[test]
    fn test_sub_millisecond_backoff_is_rejected() {
        let config = ReconcilerConfig::default().with_backoff(BackoffPolicy::new(
            Duration::from_micros(500),
            Duration::from_secs(1),
            2,
        ));
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));

        let config = ReconcilerConfig::default().with_backoff(BackoffPolicy::new(
            Duration::from_millis(1),
            Duration::from_secs(1),
            2,
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = ControllerConfig::default()
            .with_workers(2)
            .with_reconciler(ReconcilerConfig::default().with_resync_interval(Duration::from_secs(5)));
        let text = serde_json::to_string(&config).unwrap_or_default();
        assert!(text.contains("\"resync_interval_ms\":5000"));
        assert_eq!(ControllerConfig::from_json_str(&text).ok(), Some(config));
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().expect("temp dir");

        let toml_path = dir.path().join("controller.toml");
        let written = std::fs::File::create(&toml_path)
            .and_then(|mut f| f.write_all(b"workers = 3\n"));
        assert!(written.is_ok());
        assert_eq!(
            ControllerConfig::from_file(&toml_path).map(|c| c.workers).ok(),
            Some(3)
        );

        let yaml_path = dir.path().join("controller.yaml");
        assert!(std::fs::write(&yaml_path, "workers: 3").is_ok());
        assert!(ControllerConfig::from_file(&yaml_path).is_err());
        assert!(ControllerConfig::from_file(dir.path().join("missing.toml")).is_err());
    }
}
