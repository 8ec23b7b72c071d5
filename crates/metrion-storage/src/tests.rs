use crate::db::DbSink;
use crate::error::{Result, StorageError};
use crate::file::FileSink;
use crate::layered::LayeredStorage;
use crate::memory::MemStorage;
use crate::sink::{Change, Sink};
use crate::{Snapshot, Storage, SyncStorage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Sink that only counts calls, for fencing and propagation assertions.
#[derive(Default)]
struct CountingSink {
    writes: AtomicUsize,
    flushes: AtomicUsize,
}

#[async_trait]
impl Sink for CountingSink {
    async fn on_write(&self, _change: Change<'_>, _mem: &MemStorage) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn flush(&self, _snapshot: Snapshot) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn restore(&self) -> Result<Option<Snapshot>> {
        Ok(None)
    }

    async fn clear(&self) -> Result<()> {
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn counter_sums_sequential_deltas() {
    let store = LayeredStorage::memory();
    for delta in [1, 2, 3] {
        store.add_counter("n", delta).await.unwrap();
    }
    assert_eq!(store.counter("n").await.unwrap(), Some(6));
}

#[tokio::test]
async fn gauge_keeps_last_value() {
    let store = LayeredStorage::memory();
    store.set_gauge("n", 1.0).await.unwrap();
    store.set_gauge("n", 2.0).await.unwrap();
    assert_eq!(store.gauge("n").await.unwrap(), Some(2.0));
}

#[tokio::test]
async fn bulk_counter_update_equals_single_summed_add() {
    let bulk = LayeredStorage::memory();
    bulk.add_counters(&HashMap::from([("n".to_string(), 6)]))
        .await
        .unwrap();

    let single = LayeredStorage::memory();
    single.add_counter("n", 6).await.unwrap();

    assert_eq!(
        bulk.counter("n").await.unwrap(),
        single.counter("n").await.unwrap()
    );
}

#[tokio::test]
async fn empty_name_is_rejected() {
    let store = LayeredStorage::memory();
    assert!(matches!(
        store.set_gauge("", 1.0).await,
        Err(StorageError::EmptyName)
    ));
    assert!(matches!(
        store.add_counter("", 1).await,
        Err(StorageError::EmptyName)
    ));
}

#[tokio::test]
async fn one_name_lives_in_both_namespaces() {
    let store = LayeredStorage::memory();
    store.set_gauge("dual", 1.5).await.unwrap();
    store.add_counter("dual", 3).await.unwrap();
    assert_eq!(store.gauge("dual").await.unwrap(), Some(1.5));
    assert_eq!(store.counter("dual").await.unwrap(), Some(3));
}

#[tokio::test]
async fn sync_mode_propagates_every_write() {
    let sink = Arc::new(CountingSink::default());
    let store = LayeredStorage::open(sink.clone(), true, false)
        .await
        .unwrap();

    store.set_gauge("g", 1.0).await.unwrap();
    store.add_counter("c", 1).await.unwrap();
    store
        .set_gauges(&HashMap::from([("g2".to_string(), 2.0)]))
        .await
        .unwrap();

    assert_eq!(sink.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn async_mode_defers_to_flush() {
    let sink = Arc::new(CountingSink::default());
    let store = LayeredStorage::open(sink.clone(), false, false)
        .await
        .unwrap();

    store.set_gauge("g", 1.0).await.unwrap();
    assert_eq!(sink.writes.load(Ordering::SeqCst), 0);

    store.flush().await.unwrap();
    assert_eq!(sink.flushes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn closed_store_fences_all_calls_without_touching_the_sink() {
    let sink = Arc::new(CountingSink::default());
    let store = LayeredStorage::open(sink.clone(), true, false)
        .await
        .unwrap();
    store.set_gauge("g", 1.0).await.unwrap();

    store.flush_and_close().await.unwrap();
    let writes_at_close = sink.writes.load(Ordering::SeqCst);
    let flushes_at_close = sink.flushes.load(Ordering::SeqCst);

    assert!(matches!(
        store.set_gauge("g", 2.0).await,
        Err(StorageError::Closed)
    ));
    assert!(matches!(
        store.add_counter("c", 1).await,
        Err(StorageError::Closed)
    ));
    assert!(matches!(
        store.gauge("g").await,
        Err(StorageError::Closed)
    ));
    assert!(matches!(
        store.counters().await,
        Err(StorageError::Closed)
    ));
    assert!(matches!(store.flush().await, Err(StorageError::Closed)));
    assert!(matches!(store.ping().await, Err(StorageError::Closed)));
    assert!(matches!(
        store.flush_and_close().await,
        Err(StorageError::Closed)
    ));

    assert_eq!(sink.writes.load(Ordering::SeqCst), writes_at_close);
    assert_eq!(sink.flushes.load(Ordering::SeqCst), flushes_at_close);
}

#[tokio::test]
async fn file_sync_mode_makes_disk_match_after_each_write() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.json");
    let sink = Arc::new(FileSink::new(&path));
    let store = LayeredStorage::open(sink, true, false).await.unwrap();

    store.set_gauge("foo", 1.5).await.unwrap();
    let on_disk: Snapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk.gauge["foo"], 1.5);

    store.add_counter("bar", 7).await.unwrap();
    let on_disk: Snapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(on_disk.counter["bar"], 7);
}

#[tokio::test]
async fn file_restore_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.json");

    {
        let sink = Arc::new(FileSink::new(&path));
        let store = LayeredStorage::open(sink, false, false).await.unwrap();
        store.set_gauge("foo", 1.5).await.unwrap();
        store.add_counter("bar", 7).await.unwrap();
        store.flush_and_close().await.unwrap();
    }

    let sink = Arc::new(FileSink::new(&path));
    let store = LayeredStorage::open(sink, false, true).await.unwrap();
    assert_eq!(store.gauge("foo").await.unwrap(), Some(1.5));
    assert_eq!(store.counter("bar").await.unwrap(), Some(7));
}

#[tokio::test]
async fn db_restore_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");

    {
        let sink = Arc::new(DbSink::open(&path).unwrap());
        let store = LayeredStorage::open(sink, true, false).await.unwrap();
        store.set_gauge("foo", 1.5).await.unwrap();
        store.add_counter("bar", 4).await.unwrap();
        store.add_counter("bar", 3).await.unwrap();
        store.flush_and_close().await.unwrap();
    }

    let sink = Arc::new(DbSink::open(&path).unwrap());
    let store = LayeredStorage::open(sink, true, true).await.unwrap();
    assert_eq!(store.gauge("foo").await.unwrap(), Some(1.5));
    assert_eq!(store.counter("bar").await.unwrap(), Some(7));
}

#[tokio::test]
async fn db_startup_clear_truncates_tables() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.db");

    {
        let sink = Arc::new(DbSink::open(&path).unwrap());
        let store = LayeredStorage::open(sink, true, false).await.unwrap();
        store.add_counter("bar", 9).await.unwrap();
        store.flush_and_close().await.unwrap();
    }

    // restore disabled drops the persisted rows
    let sink = Arc::new(DbSink::open(&path).unwrap());
    let store = LayeredStorage::open(sink, true, false).await.unwrap();
    assert_eq!(store.counter("bar").await.unwrap(), None);
}

#[tokio::test]
async fn random_updates_survive_restore() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.json");
    let mut expected_gauges = HashMap::new();
    let mut expected_counters = HashMap::new();

    {
        let sink = Arc::new(FileSink::new(&path));
        let store = LayeredStorage::open(sink, false, false).await.unwrap();
        for i in 0..50 {
            let name = format!("m{}", i % 10);
            if i % 2 == 0 {
                let value = i as f64 * 0.5;
                store.set_gauge(&name, value).await.unwrap();
                expected_gauges.insert(name, value);
            } else {
                store.add_counter(&name, i).await.unwrap();
                *expected_counters.entry(name).or_insert(0) += i;
            }
        }
        store.flush_and_close().await.unwrap();
    }

    let sink = Arc::new(FileSink::new(&path));
    let store = LayeredStorage::open(sink, false, true).await.unwrap();
    assert_eq!(store.gauges().await.unwrap(), expected_gauges);
    assert_eq!(store.counters().await.unwrap(), expected_counters);
}
