//! Pedometer facade
//!
//! This module provides the public `Result`-returning API over one step-count source:
//! total step count for a range and active walking duration for a range.

use std::sync::Arc;

use tracing::{info, warn};

use crate::aggregator::ActiveTimeAggregator;
use crate::config::AggregatorConfig;
use crate::error::PedometerError;
use crate::source::StepCountSource;
use crate::types::{ActiveDuration, TimeRange};

/// Step metrics over an injected motion data source.
///
/// # Example
/// ```ignore
/// let pedometer = Pedometer::new(Arc::new(step_log))?;
/// let range = TimeRange::from_millis(start_ms, end_ms)?;
/// let steps = pedometer.total_steps(&range).await?;
/// let active = pedometer.walking_duration(&range).await?;
/// ```
pub struct Pedometer {
    source: Arc<dyn StepCountSource>,
    aggregator: ActiveTimeAggregator,
}

impl Pedometer {
    /// Create a pedometer with the default configuration
    pub fn new(source: Arc<dyn StepCountSource>) -> Result<Self, PedometerError> {
        Self::with_config(source, AggregatorConfig::default())
    }

    pub fn with_config(
        source: Arc<dyn StepCountSource>,
        config: AggregatorConfig,
    ) -> Result<Self, PedometerError> {
        let aggregator = ActiveTimeAggregator::new(Arc::clone(&source), config)?;
        Ok(Self { source, aggregator })
    }

    pub fn config(&self) -> &AggregatorConfig {
        self.aggregator.config()
    }

    /// Steps taken in `range`, from a single query over the whole range
    pub async fn total_steps(&self, range: &TimeRange) -> Result<u64, PedometerError> {
        match self.source.query_step_count(range.start, range.end).await {
            Ok(steps) => {
                info!(steps, source = self.source.name(), "total step count");
                Ok(steps)
            }
            Err(err) => {
                warn!(error = %err, source = self.source.name(), "total step count query failed");
                Err(PedometerError::QueryFailed(err))
            }
        }
    }

    /// Active walking duration in `range`
    pub async fn walking_duration(
        &self,
        range: &TimeRange,
    ) -> Result<ActiveDuration, PedometerError> {
        self.aggregator.active_duration(range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::source::fake::{origin, FakeSource};
    use chrono::Duration;

    fn range_secs(secs: i64) -> TimeRange {
        TimeRange::new(origin(), origin() + Duration::seconds(secs)).unwrap()
    }

    #[tokio::test]
    async fn test_total_steps_single_query() {
        let source = Arc::new(FakeSource::counts(5, &[]).with_whole_range(Ok(1234)));
        let pedometer = Pedometer::new(source.clone()).unwrap();

        let steps = pedometer.total_steps(&range_secs(3600)).await.unwrap();
        assert_eq!(steps, 1234);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_total_steps_failure() {
        let source = Arc::new(
            FakeSource::counts(5, &[])
                .with_whole_range(Err(SourceError::Unavailable("no sensor".to_string()))),
        );
        let pedometer = Pedometer::new(source).unwrap();

        let result = pedometer.total_steps(&range_secs(60)).await;
        assert!(matches!(
            result,
            Err(PedometerError::QueryFailed(SourceError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_walking_duration_uses_config() {
        let source = Arc::new(FakeSource::counts(10, &[5, 9]));
        let pedometer =
            Pedometer::with_config(source.clone(), AggregatorConfig::with_window_secs(10.0))
                .unwrap();

        let report = pedometer.walking_duration(&range_secs(20)).await.unwrap();
        assert_eq!(report.total_seconds, 20.0);
        assert_eq!(source.calls(), 2);
        assert_eq!(pedometer.config().window_secs, 10.0);
    }
}
