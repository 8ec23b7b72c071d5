//! Poll and report loops.
//!
//! The poller refreshes the sampler registry into the shared collection on
//! the poll interval; the shipper builds a batch on the report interval,
//! submits it to the send pool and clears `PollCount` only when the server
//! acknowledged the batch.

use crate::pool::{PoolError, SendPool};
use metrion_collector::runtime::SystemProbe;
use metrion_collector::{Collection, POLL_COUNT};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;

pub async fn run_poll_loop(
    collection: Arc<Collection>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut probe = SystemProbe::new();
    let mut tick = interval(period);
    loop {
        tokio::select! {
            _ = tick.tick() => {
                collection.record(probe.sample());
                tracing::debug!(poll_count = collection.poll_count(), "runtime sampled");
            }
            _ = shutdown.changed() => break,
        }
    }
}

pub async fn run_report_loop(
    collection: Arc<Collection>,
    pool: Arc<SendPool>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tick = interval(period);
    // skip the immediate first tick; there is nothing to report yet
    tick.tick().await;
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if !report_once(&collection, &pool).await {
                    break;
                }
            }
            _ = shutdown.changed() => {
                // one last report so the server sees the final poll window
                report_once(&collection, &pool).await;
                break;
            }
        }
    }
}

/// Builds and submits one report. Returns `false` once the pool is closed.
async fn report_once(collection: &Collection, pool: &SendPool) -> bool {
    let batch = collection.to_batch();
    if batch.is_empty() {
        return true;
    }
    let reported = batch
        .iter()
        .find(|m| m.id == POLL_COUNT)
        .and_then(|m| m.delta)
        .unwrap_or(0);

    match pool.send(batch).await {
        Ok(reply) if reply.is_success() => {
            // reset only after the server acknowledged the batch
            collection.reset_counter(reported);
            tracing::debug!(status = reply.status, polls = reported, "batch reported");
            true
        }
        Ok(reply) => {
            tracing::warn!(status = reply.status, message = %reply.message, "server rejected batch");
            true
        }
        Err(PoolError::PoolClosed) => false,
        Err(e) => {
            tracing::warn!(error = %e, "failed to report batch");
            true
        }
    }
}
