//! Snapshot-file sink.
//!
//! The whole store serializes to a single JSON document,
//! `{"gauge": {...}, "counter": {...}}`. A flush writes the document to a
//! sibling temp file and renames it over the target, so a crash mid-flush
//! leaves the previous snapshot intact rather than a truncated file.

use crate::error::Result;
use crate::memory::MemStorage;
use crate::sink::{Change, Sink};
use crate::Snapshot;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;

pub struct FileSink {
    path: PathBuf,
    // serializes flushes; concurrent writers would race on the temp file
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let data = serde_json::to_vec(snapshot)?;
        let tmp = self.tmp_path();
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn on_write(&self, _change: Change<'_>, mem: &MemStorage) -> Result<()> {
        // the file holds whole snapshots, so every write rewrites it
        self.flush(mem.snapshot()).await
    }

    async fn flush(&self, snapshot: Snapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_snapshot(&snapshot)?;
        tracing::debug!(
            path = %self.path.display(),
            gauges = snapshot.gauge.len(),
            counters = snapshot.counter.len(),
            "snapshot flushed"
        );
        Ok(())
    }

    async fn restore(&self) -> Result<Option<Snapshot>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&data)?;
        Ok(Some(snapshot))
    }

    async fn clear(&self) -> Result<()> {
        // an empty store's first flush overwrites the file; nothing to do
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        Snapshot {
            gauge: HashMap::from([("foo".to_string(), 1.5)]),
            counter: HashMap::from([("bar".to_string(), 7)]),
        }
    }

    #[tokio::test]
    async fn flush_restore_roundtrip() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join("metrics.json"));

        sink.flush(snapshot()).await.unwrap();
        let restored = sink.restore().await.unwrap().unwrap();
        assert_eq!(restored, snapshot());
    }

    #[tokio::test]
    async fn restore_of_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join("absent.json"));
        assert!(sink.restore().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn flush_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        let sink = FileSink::new(&path);

        sink.flush(snapshot()).await.unwrap();
        assert!(path.exists());
        assert!(!sink.tmp_path().exists());
    }

    #[tokio::test]
    async fn file_layout_is_one_map_per_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        let sink = FileSink::new(&path);

        sink.flush(snapshot()).await.unwrap();
        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["gauge"]["foo"], 1.5);
        assert_eq!(raw["counter"]["bar"], 7);
    }

    #[tokio::test]
    async fn restore_rejects_corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.json");
        std::fs::write(&path, b"{not json").unwrap();

        let sink = FileSink::new(&path);
        assert!(sink.restore().await.is_err());
    }
}
