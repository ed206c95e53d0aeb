//! Method-channel bridge
//!
//! Implements the caller-facing contract of the `simple_pedometer` channel:
//!
//! - `getSteps {startTime, endTime}` → integer step count
//! - `getWalkingDuration {startTime, endTime}` → active seconds as a float
//!
//! Times are epoch milliseconds. Missing or malformed arguments, query failures and
//! aggregation failures all reply `0`; the underlying error is logged. Callers that
//! need to tell those cases apart should use [`crate::Pedometer`] directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::PedometerError;
use crate::pedometer::Pedometer;
use crate::types::TimeRange;

/// Channel name registered by the host plugin
pub const CHANNEL_NAME: &str = "simple_pedometer";

/// Methods understood by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GetSteps,
    GetWalkingDuration,
}

impl Method {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "getSteps" => Some(Method::GetSteps),
            "getWalkingDuration" => Some(Method::GetWalkingDuration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GetSteps => "getSteps",
            Method::GetWalkingDuration => "getWalkingDuration",
        }
    }
}

/// Incoming call from the application layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Reply sent back over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success { result: Value },
    NotImplemented { method: String },
}

/// Parse `{startTime, endTime}` (epoch millis) into a range
pub fn parse_range(arguments: &Value) -> Result<TimeRange, PedometerError> {
    let map = arguments.as_object().ok_or_else(|| {
        PedometerError::InvalidArgument("arguments must be a map".to_string())
    })?;

    let millis = |key: &str| -> Result<f64, PedometerError> {
        let value = map
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| PedometerError::MissingArgument(key.to_string()))?;
        value
            .as_f64()
            .ok_or_else(|| PedometerError::InvalidArgument(format!("{key} must be a number")))
    };

    TimeRange::from_millis(millis("startTime")?, millis("endTime")?)
}

/// Dispatches channel calls to a [`Pedometer`]
pub struct PedometerPlugin {
    pedometer: Pedometer,
}

impl PedometerPlugin {
    pub fn new(pedometer: Pedometer) -> Self {
        Self { pedometer }
    }

    pub fn pedometer(&self) -> &Pedometer {
        &self.pedometer
    }

    /// Handle one call; every call gets exactly one reply
    pub async fn handle(&self, call: &MethodCall) -> MethodResponse {
        debug!(method = %call.method, "method call");

        match Method::from_name(&call.method) {
            Some(Method::GetSteps) => MethodResponse::Success {
                result: Value::from(self.get_steps(&call.arguments).await),
            },
            Some(Method::GetWalkingDuration) => MethodResponse::Success {
                result: Value::from(self.get_walking_duration(&call.arguments).await),
            },
            None => {
                warn!(method = %call.method, "unknown method");
                MethodResponse::NotImplemented {
                    method: call.method.clone(),
                }
            }
        }
    }

    /// `getSteps`: step count for the range, or 0
    pub async fn get_steps(&self, arguments: &Value) -> u64 {
        let result = match parse_range(arguments) {
            Ok(range) => self.pedometer.total_steps(&range).await,
            Err(err) => Err(err),
        };
        result.unwrap_or_else(|err| {
            warn!(method = Method::GetSteps.as_str(), error = %err, "replying 0");
            0
        })
    }

    /// `getWalkingDuration`: active seconds for the range, or 0
    pub async fn get_walking_duration(&self, arguments: &Value) -> f64 {
        let result = match parse_range(arguments) {
            Ok(range) => self.pedometer.walking_duration(&range).await,
            Err(err) => Err(err),
        };
        result.map(|report| report.total_seconds).unwrap_or_else(|err| {
            warn!(
                method = Method::GetWalkingDuration.as_str(),
                error = %err,
                "replying 0"
            );
            0.0
        })
    }
}
