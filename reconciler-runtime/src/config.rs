//! Controller configuration
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```
//! use reconciler_runtime::Config;
//! let config = Config::from_yaml("agentName: widget-controller\nfinalizerName: widgets.example.com\nworkers: 4\nstatusRetry:\n  maxAttempts: 3\n  maxDelay: 2s\n").unwrap();
//! assert_eq!(config.finalizer_name.as_deref(), Some("widgets.example.com"));
//! assert_eq!(config.status_retry.max_attempts, 3);
//! assert_eq!(config.status_retry.max_delay, std::time::Duration::from_secs(2));
//! ```
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Errors from loading a [`Config`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {path:?}: {source}")]
    ReadFile {
        /// The file that was read
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
    /// The document is not valid YAML for a [`Config`]
    #[error("failed to parse config: {0}")]
    ParseYaml(#[source] serde_yaml::Error),
    /// The values parsed but cannot be used together
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for one controller instance
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Name the controller reports events under
    pub agent_name: String,
    /// Finalizer token managed by the reconciler, `None` disables finalization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finalizer_name: Option<String>,
    /// Retry budget for status writes that hit a version conflict
    pub status_retry: RetryPolicy,
    /// Backoff for keys whose reconcile failed
    pub requeue: RequeuePolicy,
    /// Number of keys reconciled concurrently
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            agent_name: "reconciler".into(),
            finalizer_name: None,
            status_retry: RetryPolicy::default(),
            requeue: RequeuePolicy::default(),
            workers: 2,
        }
    }
}

impl Config {
    /// Parse and validate a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(ConfigError::ParseYaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_owned(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Check that the values can be used together
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.status_retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "statusRetry.maxAttempts must be at least 1".into(),
            ));
        }
        if self.status_retry.min_delay > self.status_retry.max_delay {
            return Err(ConfigError::Invalid(
                "statusRetry.minDelay exceeds statusRetry.maxDelay".into(),
            ));
        }
        if self.requeue.min_delay > self.requeue.max_delay {
            return Err(ConfigError::Invalid(
                "requeue.minDelay exceeds requeue.maxDelay".into(),
            ));
        }
        Ok(())
    }
}

/// Bounded exponential retry for optimistic-concurrency conflicts
///
/// `max_attempts` counts the first attempt, so at most `max_attempts - 1` delays are taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Delay before the first retry
    #[serde(with = "duration")]
    pub min_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration")]
    pub max_delay: Duration,
    /// Total attempts, including the first
    pub max_attempts: usize,
    /// Randomize delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            max_attempts: 5,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// The delays between consecutive attempts
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1));
        if self.jitter {
            builder.with_jitter().build()
        } else {
            builder.build()
        }
    }
}

/// Per-key backoff for re-delivering keys whose reconcile failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequeuePolicy {
    /// Delay after the first failure
    #[serde(with = "duration")]
    pub min_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "duration")]
    pub max_delay: Duration,
}

impl Default for RequeuePolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
        }
    }
}

impl RequeuePolicy {
    /// An unbounded backoff, doubling from `min_delay` up to `max_delay`
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .without_max_times()
            .build()
    }
}

/// Human-readable durations: `"250ms"`, `"2s"`, `"5m"`, `"1h"`, or a bare number of milliseconds
pub(crate) mod duration {
    use serde::{de, Deserializer, Serializer};
    use std::{fmt, time::Duration};

    pub fn serialize<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&render(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        de.deserialize_any(DurationVisitor)
    }

    fn render(d: Duration) -> String {
        let ms = d.as_millis();
        match ms {
            0 => "0ms".into(),
            _ if ms % 3_600_000 == 0 => format!("{}h", ms / 3_600_000),
            _ if ms % 60_000 == 0 => format!("{}m", ms / 60_000),
            _ if ms % 1000 == 0 => format!("{}s", ms / 1000),
            _ => format!("{ms}ms"),
        }
    }

    pub(crate) fn parse(s: &str) -> Option<Duration> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let (value, unit) = s.split_at(split);
        let value: u64 = value.parse().ok()?;
        let per_unit = match unit.trim() {
            "" | "ms" => 1,
            "s" => 1000,
            "m" => 60_000,
            "h" => 3_600_000,
            _ => return None,
        };
        value.checked_mul(per_unit).map(Duration::from_millis)
    }

    struct DurationVisitor;

    impl de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a duration such as \"250ms\", \"2s\", \"5m\", \"1h\" or a number of milliseconds")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_millis(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_millis)
                .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            parse(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::{parse, render};
        use std::time::Duration;

        #[test]
        fn units() {
            assert_eq!(parse("250ms"), Some(Duration::from_millis(250)));
            assert_eq!(parse("2s"), Some(Duration::from_secs(2)));
            assert_eq!(parse("5m"), Some(Duration::from_secs(300)));
            assert_eq!(parse("1h"), Some(Duration::from_secs(3600)));
            assert_eq!(parse("40"), Some(Duration::from_millis(40)));
            assert_eq!(parse("2 weeks"), None);
            assert_eq!(parse("s"), None);
        }

        #[test]
        fn renders_largest_exact_unit() {
            assert_eq!(render(Duration::from_millis(1500)), "1500ms");
            assert_eq!(render(Duration::from_secs(120)), "2m");
            assert_eq!(render(Duration::from_secs(1000)), "1000s");
        }
    }
}
