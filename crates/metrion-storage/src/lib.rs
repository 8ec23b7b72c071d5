//! Layered metric store for the metrion server.
//!
//! The store is a write-through composition: every mutation lands in the
//! in-memory layer ([`memory::MemStorage`]) first, then propagates to an
//! optional durable [`sink::Sink`] (a JSON snapshot file
//! [`file::FileSink`], or a SQLite database [`db::DbSink`]) either
//! immediately (sync mode) or on a timer ([`layered::run_flush_loop`]).
//! Connection-class back-end failures are retried on a fixed 1-3-5 second
//! schedule ([`retry::with_retry`]) before being surfaced.

pub mod db;
pub mod error;
pub mod file;
pub mod layered;
pub mod memory;
pub mod retry;
pub mod sink;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use error::{Result, StorageError};
pub use layered::{run_flush_loop, LayeredStorage};

/// Full state of both metric namespaces.
///
/// Also the on-disk snapshot layout: one JSON object with a map per kind,
/// `{"gauge": {...}, "counter": {...}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub gauge: HashMap<String, f64>,
    #[serde(default)]
    pub counter: HashMap<String, i64>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.gauge.is_empty() && self.counter.is_empty()
    }
}

/// Metric store operations shared by every backing configuration.
///
/// Implementations must be safe to share across tasks (`Send + Sync`): the
/// store is hit concurrently by the HTTP handlers, the gRPC ingest service
/// and the background flush loop.
///
/// Mutations to a single `(kind, name)` pair are linearizable; callers that
/// need multi-key atomicity use the bulk operations, which are applied
/// atomically as far as the durable back-end allows.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Replaces the gauge `name` with `value`.
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()>;

    /// Adds `delta` to the counter `name`, creating it at zero first.
    async fn add_counter(&self, name: &str, delta: i64) -> Result<()>;

    /// Replaces every gauge in `values` in one atomic step.
    async fn set_gauges(&self, values: &HashMap<String, f64>) -> Result<()>;

    /// Applies every counter delta in `deltas` in one atomic step.
    async fn add_counters(&self, deltas: &HashMap<String, i64>) -> Result<()>;

    /// Reads one gauge. A missing name is `Ok(None)`, never an error.
    async fn gauge(&self, name: &str) -> Result<Option<f64>>;

    /// Reads one counter. A missing name is `Ok(None)`, never an error.
    async fn counter(&self, name: &str) -> Result<Option<i64>>;

    /// Returns a snapshot copy of the gauge namespace.
    async fn gauges(&self) -> Result<HashMap<String, f64>>;

    /// Returns a snapshot copy of the counter namespace.
    async fn counters(&self) -> Result<HashMap<String, i64>>;
}

/// Synchronization surface of a store with a durable back-end.
#[async_trait]
pub trait SyncStorage: Storage {
    /// Pushes the full in-memory state to the durable back-end.
    async fn flush(&self) -> Result<()>;

    /// Final flush, then fences the store: every later call returns
    /// [`StorageError::Closed`]. The fence is set even when the flush fails
    /// so resources are released deterministically.
    async fn flush_and_close(&self) -> Result<()>;

    /// Whether each mutation is flushed before its call returns.
    fn is_sync_mode(&self) -> bool;

    /// Durable back-end reachability probe.
    async fn ping(&self) -> Result<()>;
}
