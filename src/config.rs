//! Aggregator configuration
//!
//! Loaded from JSON (every field optional) and validated before use.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::PedometerError;

/// Default sub-interval width in seconds
pub const DEFAULT_WINDOW_SECS: f64 = 5.0;

/// Default cap on sub-intervals per computation (one day at the default width)
pub const DEFAULT_MAX_SUB_INTERVALS: usize = 17_280;

/// What to do when a sub-interval query fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed sub-interval fails the whole computation
    #[default]
    DiscardAll,
    /// Failed sub-intervals contribute nothing and leave the previous count untouched
    SkipFailed,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::DiscardAll => "discard_all",
            FailurePolicy::SkipFailed => "skip_failed",
        }
    }
}

/// Order in which resolved samples are applied to the accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrder {
    /// Applied by each query as it completes; the result depends on completion timing
    Completion,
    /// Applied after every query settled, in partition order
    #[default]
    Interval,
}

impl SampleOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleOrder::Completion => "completion",
            SampleOrder::Interval => "interval",
        }
    }
}

/// Configuration for [`crate::ActiveTimeAggregator`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Sub-interval width in seconds
    pub window_secs: f64,
    pub failure_policy: FailurePolicy,
    pub sample_order: SampleOrder,
    /// Ranges needing more sub-intervals than this are rejected before any query
    pub max_sub_intervals: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            failure_policy: FailurePolicy::default(),
            sample_order: SampleOrder::default(),
            max_sub_intervals: DEFAULT_MAX_SUB_INTERVALS,
        }
    }
}

impl AggregatorConfig {
    /// Default configuration with a different window width
    pub fn with_window_secs(window_secs: f64) -> Self {
        Self {
            window_secs,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, PedometerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, PedometerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), PedometerError> {
        if self.max_sub_intervals == 0 {
            return Err(PedometerError::InvalidConfig(
                "max_sub_intervals must be at least 1".to_string(),
            ));
        }
        self.window().map(|_| ())
    }

    /// Sub-interval width, at microsecond resolution
    pub fn window(&self) -> Result<Duration, PedometerError> {
        if !self.window_secs.is_finite() || self.window_secs <= 0.0 {
            return Err(PedometerError::InvalidConfig(format!(
                "window_secs must be a positive number, got {}",
                self.window_secs
            )));
        }

        let micros = (self.window_secs * 1_000_000.0).round();
        if micros < 1.0 || micros > i64::MAX as f64 {
            return Err(PedometerError::InvalidConfig(format!(
                "window_secs {} is outside the supported range",
                self.window_secs
            )));
        }

        Ok(Duration::microseconds(micros as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = AggregatorConfig::default();
        assert_eq!(config.window_secs, 5.0);
        assert_eq!(config.failure_policy, FailurePolicy::DiscardAll);
        assert_eq!(config.sample_order, SampleOrder::Interval);
        assert_eq!(config.max_sub_intervals, 17_280);
        assert_eq!(config.window().unwrap(), Duration::seconds(5));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AggregatorConfig::from_json(r#"{"failure_policy": "skip_failed"}"#).unwrap();
        assert_eq!(
            config,
            AggregatorConfig {
                window_secs: 5.0,
                failure_policy: FailurePolicy::SkipFailed,
                sample_order: SampleOrder::Interval,
                max_sub_intervals: DEFAULT_MAX_SUB_INTERVALS,
            }
        );
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AggregatorConfig {
            window_secs: 2.5,
            failure_policy: FailurePolicy::SkipFailed,
            sample_order: SampleOrder::Completion,
            max_sub_intervals: 100,
        };
        let json = config.to_json().unwrap();
        assert!(json.contains("\"sample_order\": \"completion\""));
        assert_eq!(AggregatorConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_rejects_bad_window() {
        for window in [0.0, -5.0, f64::NAN, 1e-9] {
            let result = AggregatorConfig::with_window_secs(window).validate();
            assert!(
                matches!(result, Err(PedometerError::InvalidConfig(_))),
                "window {window} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_zero_sub_interval_cap() {
        let result = AggregatorConfig::from_json(r#"{"max_sub_intervals": 0}"#);
        assert!(matches!(result, Err(PedometerError::InvalidConfig(_))));
    }

    #[test]
    fn test_unknown_policy_is_json_error() {
        let result = AggregatorConfig::from_json(r#"{"failure_policy": "retry"}"#);
        assert!(matches!(result, Err(PedometerError::JsonError(_))));
    }
}
