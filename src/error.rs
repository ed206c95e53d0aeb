//! Error types for Simple Pedometer

use thiserror::Error;

/// Errors reported by a step-count data source
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Motion data unavailable: {0}")]
    Unavailable(String),

    #[error("Step count query failed: {0}")]
    Query(String),
}

/// Errors that can occur while computing step metrics
#[derive(Debug, Error)]
pub enum PedometerError {
    #[error("Missing required argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid time range: end {end} is before start {start}")]
    InvalidRange { start: String, end: String },

    #[error("Range needs {needed} sub-intervals, more than the limit of {max}")]
    TooManySubIntervals { needed: u128, max: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Step count query failed: {0}")]
    QueryFailed(#[source] SourceError),

    #[error("Sub-interval {index} of {total} failed ({failed} failed in total): {source}")]
    SubIntervalFailed {
        index: usize,
        total: usize,
        failed: usize,
        #[source]
        source: SourceError,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),
}
