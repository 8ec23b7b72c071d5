//! Metric collection for the metrion agent.
//!
//! A poll loop samples the gauge registry ([`runtime::SystemProbe`]) into a
//! shared [`Collection`]; a separate shipper turns the collection into a
//! wire batch and clears the `PollCount` counter only after the batch was
//! transmitted successfully.

pub mod runtime;

use metrion_common::metric::Metric;
use std::collections::HashMap;
use std::sync::Mutex;

/// Counter transmitted with every report: polls since the last successful
/// send.
pub const POLL_COUNT: &str = "PollCount";

#[derive(Debug, Default)]
struct Inner {
    gauges: HashMap<String, f64>,
    poll_count: i64,
}

/// Latest sampled gauges plus the `PollCount` delta, under one lock.
///
/// The poller overwrites gauges and increments the counter; the shipper
/// reads a batch under the same lock so a report is a consistent image of
/// one or more whole polls.
#[derive(Debug, Default)]
pub struct Collection {
    inner: Mutex<Inner>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one poll: replaces each sampled gauge and bumps `PollCount`.
    pub fn record(&self, samples: Vec<(String, f64)>) {
        let mut inner = self.lock();
        for (name, value) in samples {
            inner.gauges.insert(name, value);
        }
        inner.poll_count += 1;
    }

    /// Builds the wire batch: every gauge plus the `PollCount` delta.
    ///
    /// Returns an empty batch before the first poll.
    pub fn to_batch(&self) -> Vec<Metric> {
        let inner = self.lock();
        if inner.poll_count == 0 && inner.gauges.is_empty() {
            return Vec::new();
        }
        let mut batch: Vec<Metric> = inner
            .gauges
            .iter()
            .map(|(name, value)| Metric::gauge(name.clone(), *value))
            .collect();
        batch.sort_by(|a, b| a.id.cmp(&b.id));
        batch.push(Metric::counter(POLL_COUNT, inner.poll_count));
        batch
    }

    /// Clears `PollCount`. Called only after a successful transmission;
    /// polls recorded while a report was in flight stay counted.
    pub fn reset_counter(&self, reported: i64) {
        let mut inner = self.lock();
        inner.poll_count -= reported;
        if inner.poll_count < 0 {
            inner.poll_count = 0;
        }
    }

    pub fn poll_count(&self) -> i64 {
        self.lock().poll_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
