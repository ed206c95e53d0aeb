//! Active-time aggregation
//!
//! Splits a range into fixed-width sub-intervals, queries every sub-interval at once,
//! and sums the durations of sub-intervals whose step count rose above the previous
//! applied sample.
//!
//! Each query runs as its own tokio task. The accumulator is shared behind a mutex and
//! the result is only produced once every task has settled, successfully or not.
//! Nothing is cancelled and nothing is retried. Ranges needing more than
//! `max_sub_intervals` sub-intervals are rejected before any task is spawned.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::{AggregatorConfig, FailurePolicy, SampleOrder};
use crate::error::{PedometerError, SourceError};
use crate::partition::partition;
use crate::source::StepCountSource;
use crate::types::{ActiveDuration, StepSample, SubInterval, TimeRange};

/// Signed difference `current - previous`, saturating at the `i64` bounds
fn step_delta(current: u64, previous: u64) -> i64 {
    if current >= previous {
        i64::try_from(current - previous).unwrap_or(i64::MAX)
    } else {
        i64::try_from(previous - current).map_or(i64::MIN, |d| -d)
    }
}

/// Running state of one computation
#[derive(Debug, Default)]
struct Accumulator {
    previous_count: u64,
    total_active: f64,
    samples: Vec<StepSample>,
}

impl Accumulator {
    fn apply(&mut self, interval: SubInterval, steps: u64) {
        let delta = step_delta(steps, self.previous_count);
        let active = delta > 0;
        if active {
            self.total_active += interval.duration_secs();
        }
        self.previous_count = steps;

        debug!(
            index = interval.index,
            steps,
            delta,
            active,
            "applied sub-interval sample"
        );

        self.samples.push(StepSample {
            interval,
            steps,
            delta,
            active,
        });
    }
}

/// Computes active walking duration over a step-count source
pub struct ActiveTimeAggregator {
    source: Arc<dyn StepCountSource>,
    config: AggregatorConfig,
}

impl ActiveTimeAggregator {
    pub fn new(
        source: Arc<dyn StepCountSource>,
        config: AggregatorConfig,
    ) -> Result<Self, PedometerError> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Total seconds in `range` spent in sub-intervals with a positive step delta.
    ///
    /// Under [`FailurePolicy::DiscardAll`] any failed query fails the computation with
    /// [`PedometerError::SubIntervalFailed`]; under [`FailurePolicy::SkipFailed`] failed
    /// sub-intervals are left out and counted in `failed_intervals`.
    pub async fn active_duration(&self, range: &TimeRange) -> Result<ActiveDuration, PedometerError> {
        let span = tracing::info_span!(
            "active_duration",
            run_id = %Uuid::new_v4(),
            source = self.source.name(),
            policy = self.config.failure_policy.as_str(),
            order = self.config.sample_order.as_str(),
        );
        self.compute(range).instrument(span).await
    }

    async fn compute(&self, range: &TimeRange) -> Result<ActiveDuration, PedometerError> {
        let intervals = partition(range, self.config.window()?, self.config.max_sub_intervals)?;
        if intervals.is_empty() {
            debug!("empty range, nothing to query");
            return Ok(ActiveDuration::empty());
        }

        debug!(sub_intervals = intervals.len(), "dispatching step count queries");

        let accumulator = Arc::new(Mutex::new(Accumulator::default()));
        let apply_on_completion = self.config.sample_order == SampleOrder::Completion;

        let handles = intervals.iter().map(|interval| {
            let interval = *interval;
            let source = Arc::clone(&self.source);
            let accumulator = Arc::clone(&accumulator);

            tokio::spawn(
                async move {
                    let result = source.query_step_count(interval.start, interval.end).await;
                    if apply_on_completion {
                        if let Ok(steps) = result {
                            accumulator.lock().await.apply(interval, steps);
                        }
                    }
                    result
                }
                .in_current_span(),
            )
        });

        let settled = join_all(handles).await;

        let mut accumulator = std::mem::take(&mut *accumulator.lock().await);
        let mut failures: Vec<(usize, SourceError)> = Vec::new();

        for (interval, joined) in intervals.iter().zip(settled) {
            let result = joined.unwrap_or_else(|e| {
                Err(SourceError::Query(format!("query task aborted: {e}")))
            });

            match result {
                Ok(steps) if !apply_on_completion => accumulator.apply(*interval, steps),
                Ok(_) => {}
                Err(err) => {
                    warn!(index = interval.index, error = %err, "sub-interval query failed");
                    failures.push((interval.index, err));
                }
            }
        }

        if let Some((index, source)) = failures.first().cloned() {
            if self.config.failure_policy == FailurePolicy::DiscardAll {
                warn!(
                    failed = failures.len(),
                    total = intervals.len(),
                    "discarding active duration after failed sub-interval"
                );
                return Err(PedometerError::SubIntervalFailed {
                    index,
                    total: intervals.len(),
                    failed: failures.len(),
                    source,
                });
            }
        }

        let report = ActiveDuration {
            total_seconds: accumulator.total_active,
            sub_intervals: intervals.len(),
            active_intervals: accumulator.samples.iter().filter(|s| s.active).count(),
            failed_intervals: failures.len(),
            samples: accumulator.samples,
        };

        info!(
            total_seconds = report.total_seconds,
            active = report.active_intervals,
            failed = report.failed_intervals,
            sub_intervals = report.sub_intervals,
            "active duration computed"
        );

        Ok(report)
    }
}
