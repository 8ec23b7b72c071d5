//! Write-through layered store.
//!
//! Every mutation commits to the in-memory layer first, so reads within the
//! process always observe their own writes. With a sink attached, sync mode
//! forwards each committed write before the call returns; async mode leaves
//! persistence to the periodic flush loop, which also runs one final flush
//! when the shutdown signal fires.

use crate::error::{Result, StorageError};
use crate::memory::MemStorage;
use crate::sink::{Change, Sink};
use crate::{Snapshot, Storage, SyncStorage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct LayeredStorage {
    mem: MemStorage,
    sink: Option<Arc<dyn Sink>>,
    sync_mode: bool,
    closed: AtomicBool,
    // serializes full flushes so overlapping timer/close flushes cannot
    // interleave their snapshots
    flush_lock: tokio::sync::Mutex<()>,
}

impl LayeredStorage {
    /// Pure in-memory store with no durable back-end.
    pub fn memory() -> Self {
        Self {
            mem: MemStorage::new(),
            sink: None,
            sync_mode: false,
            closed: AtomicBool::new(false),
            flush_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Opens a store over `sink`. With `restore` the last flushed state is
    /// replayed into the in-memory layer before the store is handed out;
    /// otherwise any persisted state is dropped.
    pub async fn open(sink: Arc<dyn Sink>, sync_mode: bool, restore: bool) -> Result<Self> {
        let mem = MemStorage::new();
        if restore {
            if let Some(snapshot) = sink.restore().await? {
                tracing::info!(
                    gauges = snapshot.gauge.len(),
                    counters = snapshot.counter.len(),
                    "restored durable state"
                );
                mem.load(snapshot);
            }
        } else {
            sink.clear().await?;
        }
        Ok(Self {
            mem,
            sink: Some(sink),
            sync_mode,
            closed: AtomicBool::new(false),
            flush_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }

    async fn propagate(&self, change: Change<'_>) -> Result<()> {
        if !self.sync_mode {
            return Ok(());
        }
        match &self.sink {
            Some(sink) => sink.on_write(change, &self.mem).await,
            None => Ok(()),
        }
    }

    async fn flush_inner(&self) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        let _guard = self.flush_lock.lock().await;
        sink.flush(self.mem.snapshot()).await
    }
}

#[async_trait]
impl Storage for LayeredStorage {
    async fn set_gauge(&self, name: &str, value: f64) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(StorageError::EmptyName);
        }
        self.mem.set_gauge(name, value);
        self.propagate(Change::Gauge(name, value)).await
    }

    async fn add_counter(&self, name: &str, delta: i64) -> Result<()> {
        self.ensure_open()?;
        if name.is_empty() {
            return Err(StorageError::EmptyName);
        }
        self.mem.add_counter(name, delta);
        self.propagate(Change::Counter(name, delta)).await
    }

    async fn set_gauges(&self, values: &HashMap<String, f64>) -> Result<()> {
        self.ensure_open()?;
        if values.is_empty() {
            return Ok(());
        }
        self.mem.set_gauges(values);
        self.propagate(Change::Gauges(values)).await
    }

    async fn add_counters(&self, deltas: &HashMap<String, i64>) -> Result<()> {
        self.ensure_open()?;
        if deltas.is_empty() {
            return Ok(());
        }
        self.mem.add_counters(deltas);
        self.propagate(Change::Counters(deltas)).await
    }

    async fn gauge(&self, name: &str) -> Result<Option<f64>> {
        self.ensure_open()?;
        Ok(self.mem.gauge(name))
    }

    async fn counter(&self, name: &str) -> Result<Option<i64>> {
        self.ensure_open()?;
        Ok(self.mem.counter(name))
    }

    async fn gauges(&self) -> Result<HashMap<String, f64>> {
        self.ensure_open()?;
        Ok(self.mem.gauges())
    }

    async fn counters(&self) -> Result<HashMap<String, i64>> {
        self.ensure_open()?;
        Ok(self.mem.counters())
    }
}

#[async_trait]
impl SyncStorage for LayeredStorage {
    async fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.flush_inner().await
    }

    async fn flush_and_close(&self) -> Result<()> {
        // set the fence even when the final flush fails, so the store shuts
        // down deterministically
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        let result = self.flush_inner().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "final flush failed during close");
        }
        result
    }

    fn is_sync_mode(&self) -> bool {
        self.sync_mode
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        match &self.sink {
            Some(sink) => sink.ping().await,
            None => Ok(()),
        }
    }
}

/// Periodic flush driver for async mode.
///
/// Flushes every `period` and once more when `shutdown` fires, then exits.
pub async fn run_flush_loop(
    store: Arc<dyn SyncStorage>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = tokio::time::interval(period);
    // the first interval tick fires immediately; skip the redundant flush
    tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                match store.flush().await {
                    Ok(()) => tracing::debug!("periodic flush completed"),
                    Err(StorageError::Closed) => break,
                    Err(e) => tracing::error!(error = %e, "periodic flush failed"),
                }
            }
            _ = shutdown.changed() => {
                if let Err(e) = store.flush().await {
                    if !matches!(e, StorageError::Closed) {
                        tracing::error!(error = %e, "shutdown flush failed");
                    }
                }
                break;
            }
        }
    }
}
