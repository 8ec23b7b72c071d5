//! After-write sinks for the layered store.
//!
//! Instead of stacking decorator stores (file wraps mem, db wraps mem), the
//! layered store owns the in-memory layer and forwards committed writes to a
//! pluggable [`Sink`]. Snapshot-shaped back-ends (the file sink) persist the
//! full post-write state; row-shaped back-ends (the SQLite sink) persist the
//! change itself.

use crate::error::Result;
use crate::memory::MemStorage;
use crate::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;

/// One committed write, as seen by a sink.
#[derive(Debug)]
pub enum Change<'a> {
    Gauge(&'a str, f64),
    Counter(&'a str, i64),
    Gauges(&'a HashMap<String, f64>),
    Counters(&'a HashMap<String, i64>),
}

/// A durable back-end attached behind the in-memory layer.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persists one committed write. `mem` exposes the post-write state for
    /// sinks that persist whole snapshots. Called only in sync mode.
    async fn on_write(&self, change: Change<'_>, mem: &MemStorage) -> Result<()>;

    /// Persists the full state. Called by the flush loop and on close.
    async fn flush(&self, snapshot: Snapshot) -> Result<()>;

    /// Loads the last flushed state, or `None` when the back-end holds
    /// nothing yet.
    async fn restore(&self) -> Result<Option<Snapshot>>;

    /// Drops any persisted state; called at startup when restore is
    /// disabled.
    async fn clear(&self) -> Result<()>;

    /// Reachability probe for the health endpoint.
    async fn ping(&self) -> Result<()>;
}
