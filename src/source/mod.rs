//! Step-count data sources
//!
//! The host motion service is injected through [`StepCountSource`], so the aggregation
//! logic never binds to a concrete platform API. [`StepLog`] replays recorded steps and
//! backs the CLI.

mod step_log;

#[cfg(test)]
pub(crate) mod fake;

pub use step_log::{Outage, RecordedStep, StepLog};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SourceError;

/// Capability to count steps taken between two instants
#[async_trait]
pub trait StepCountSource: Send + Sync {
    /// Number of steps reported for `[from, to)`
    async fn query_step_count(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, SourceError>;

    /// Short identifier used in logs
    fn name(&self) -> &str {
        "step_source"
    }
}
