//! Scripted source for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::StepCountSource;
use crate::error::SourceError;

/// Scripted reply for one sub-interval
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Steps(u64),
    Delayed(u64, u64),
    Fail,
}

/// Answers sub-interval queries by index from `origin`, and whole-range queries
/// (anything wider than one window) with `whole_range`.
pub(crate) struct FakeSource {
    origin: DateTime<Utc>,
    window: Duration,
    replies: Vec<Reply>,
    whole_range: Result<u64, SourceError>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

pub(crate) fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap()
}

impl FakeSource {
    pub(crate) fn new(window_secs: i64, replies: Vec<Reply>) -> Self {
        Self {
            origin: origin(),
            window: Duration::seconds(window_secs),
            replies,
            whole_range: Ok(0),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn counts(window_secs: i64, counts: &[u64]) -> Self {
        Self::new(window_secs, counts.iter().map(|c| Reply::Steps(*c)).collect())
    }

    pub(crate) fn with_whole_range(mut self, result: Result<u64, SourceError>) -> Self {
        self.whole_range = result;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Queries started but not yet answered
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn reply(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<u64, SourceError> {
        if to - from > self.window {
            return self.whole_range.clone();
        }

        let offset = (from - self.origin).num_milliseconds();
        let index = (offset / self.window.num_milliseconds()) as usize;

        match self.replies.get(index) {
            Some(Reply::Steps(steps)) => Ok(*steps),
            Some(Reply::Delayed(steps, delay_ms)) => {
                tokio::time::sleep(StdDuration::from_millis(*delay_ms)).await;
                Ok(*steps)
            }
            Some(Reply::Fail) => Err(SourceError::Query(format!("scripted failure at {index}"))),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl StepCountSource for FakeSource {
    async fn query_step_count(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<u64, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.reply(from, to).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "fake"
    }
}
