//! Simple Pedometer - step count and active walking duration over a host motion sensor
//!
//! The host platform's motion service is injected as a [`StepCountSource`]. On top of it
//! the crate offers two operations:
//!
//! - **Total step count**: one query over the whole range.
//! - **Active walking duration**: the range is split into fixed-width sub-intervals that
//!   are queried concurrently, and the durations of sub-intervals whose step count rose
//!   above the previous one are summed.
//!
//! ## Layers
//!
//! - [`Pedometer`]: explicit `Result` API over a source
//! - [`bridge::PedometerPlugin`]: method-channel contract (`getSteps`, `getWalkingDuration`)
//!   where every failure collapses to `0`
//! - [`ffi`]: C ABI for native plugin shells

pub mod aggregator;
pub mod bridge;
pub mod config;
pub mod error;
pub mod partition;
pub mod pedometer;
pub mod source;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use aggregator::ActiveTimeAggregator;
pub use bridge::{MethodCall, MethodResponse, PedometerPlugin, CHANNEL_NAME};
pub use config::{AggregatorConfig, FailurePolicy, SampleOrder};
pub use error::{PedometerError, SourceError};
pub use pedometer::Pedometer;
pub use source::{StepCountSource, StepLog};
pub use types::{ActiveDuration, StepSample, SubInterval, TimeRange};

/// Library version
pub const PEDOMETER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI and FFI
pub const PRODUCER_NAME: &str = "simple-pedometer";
