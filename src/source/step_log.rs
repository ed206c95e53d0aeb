//! Recorded step log
//!
//! Replays step events captured from a device. Accepted inputs:
//! - a JSON array of steps: `[{"timestamp": "...", "steps": 2}, ...]`
//! - a JSON document: `{"steps": [...], "outages": [{"start": "...", "end": "..."}]}`
//! - NDJSON, one step event per line
//!
//! An outage marks a period where the sensor had no data; any query overlapping it fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::StepCountSource;
use crate::error::{PedometerError, SourceError};

fn one_step() -> u64 {
    1
}

/// Steps recorded at one instant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedStep {
    pub timestamp: DateTime<Utc>,
    #[serde(default = "one_step")]
    pub steps: u64,
}

/// Period with no sensor data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outage {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Outage {
    fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && from < self.end
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StepLogDocument {
    Steps(Vec<RecordedStep>),
    Full {
        #[serde(default)]
        steps: Vec<RecordedStep>,
        #[serde(default)]
        outages: Vec<Outage>,
    },
}

/// In-memory step source built from recorded events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepLog {
    steps: Vec<RecordedStep>,
    outages: Vec<Outage>,
}

impl StepLog {
    pub fn new(mut steps: Vec<RecordedStep>) -> Self {
        steps.sort_by_key(|s| s.timestamp);
        Self {
            steps,
            outages: Vec::new(),
        }
    }

    /// Add an outage window
    pub fn with_outage(
        mut self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Self, PedometerError> {
        let outage = Outage { start, end, reason };
        validate_outage(&outage)?;
        self.outages.push(outage);
        Ok(self)
    }

    /// Parse a JSON array of steps or a `{steps, outages}` document
    pub fn from_json(json: &str) -> Result<Self, PedometerError> {
        let document: StepLogDocument = serde_json::from_str(json)?;
        let (steps, outages) = match document {
            StepLogDocument::Steps(steps) => (steps, Vec::new()),
            StepLogDocument::Full { steps, outages } => (steps, outages),
        };

        for outage in &outages {
            validate_outage(outage)?;
        }

        let mut log = Self::new(steps);
        log.outages = outages;
        Ok(log)
    }

    /// Parse newline-delimited step events, skipping blank lines
    pub fn from_ndjson(input: &str) -> Result<Self, PedometerError> {
        let mut steps = Vec::new();
        for (line_no, line) in input.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let step: RecordedStep = serde_json::from_str(trimmed).map_err(|e| {
                PedometerError::InvalidArgument(format!("line {}: {}", line_no + 1, e))
            })?;
            steps.push(step);
        }
        Ok(Self::new(steps))
    }

    pub fn steps(&self) -> &[RecordedStep] {
        &self.steps
    }

    pub fn outages(&self) -> &[Outage] {
        &self.outages
    }

    /// Total number of recorded steps
    pub fn total_steps(&self) -> u64 {
        self.steps.iter().map(|s| s.steps).sum()
    }

    /// Steps recorded in `[from, to)`, ignoring outages
    pub fn count_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
        let lower = self.steps.partition_point(|s| s.timestamp < from);
        let upper = self.steps.partition_point(|s| s.timestamp < to);
        if upper <= lower {
            return 0;
        }
        self.steps[lower..upper].iter().map(|s| s.steps).sum()
    }
}

fn validate_outage(outage: &Outage) -> Result<(), PedometerError> {
    if outage.end < outage.start {
        return Err(PedometerError::InvalidRange {
            start: outage.start.to_rfc3339(),
            end: outage.end.to_rfc3339(),
        });
    }
    Ok(())
}

#[async_trait]
impl StepCountSource for StepLog {
    async fn query_step_count(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, SourceError> {
        if let Some(outage) = self.outages.iter().find(|o| o.overlaps(from, to)) {
            let reason = outage.reason.as_deref().unwrap_or("sensor outage");
            return Err(SourceError::Unavailable(format!(
                "{} between {} and {}",
                reason,
                outage.start.to_rfc3339(),
                outage.end.to_rfc3339()
            )));
        }
        Ok(self.count_between(from, to))
    }

    fn name(&self) -> &str {
        "step_log"
    }
}
