//! SQLite sink.
//!
//! Mirrors writes into two tables, `t_gauge` and `t_counter`, with literal
//! upsert SQL. Single-row writes upsert the one row; bulk writes and full
//! flushes run one transaction with a cached prepared statement per kind.
//! Connection-class failures (busy, locked, unreachable file) go through the
//! retry schedule in [`crate::retry`].

use crate::error::Result;
use crate::memory::MemStorage;
use crate::retry::with_retry;
use crate::sink::{Change, Sink};
use crate::Snapshot;
use async_trait::async_trait;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS t_gauge (
    name        TEXT PRIMARY KEY,
    value       DOUBLE PRECISION NOT NULL,
    created_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS t_counter (
    name        TEXT PRIMARY KEY,
    value       BIGINT NOT NULL,
    created_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at  TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

const UPSERT_GAUGE: &str = "INSERT INTO t_gauge (name, value) VALUES (?1, ?2)
     ON CONFLICT (name) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP";

// counters accumulate: conflicting rows add the incoming delta
const UPSERT_COUNTER_ADD: &str = "INSERT INTO t_counter (name, value) VALUES (?1, ?2)
     ON CONFLICT (name) DO UPDATE SET value = t_counter.value + excluded.value, updated_at = CURRENT_TIMESTAMP";

// full-state dumps overwrite: the in-memory value is already the total
const UPSERT_COUNTER_SET: &str = "INSERT INTO t_counter (name, value) VALUES (?1, ?2)
     ON CONFLICT (name) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP";

pub struct DbSink {
    conn: Mutex<Connection>,
}

impl DbSink {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "wal")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn upsert_gauges(conn: &mut Connection, values: &HashMap<String, f64>) -> Result<()> {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_GAUGE)?;
            for (name, value) in values {
                stmt.execute(rusqlite::params![name, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_counters(
        conn: &mut Connection,
        deltas: &HashMap<String, i64>,
        sql: &str,
    ) -> Result<()> {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(sql)?;
            for (name, delta) in deltas {
                stmt.execute(rusqlite::params![name, delta])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn write_snapshot(conn: &mut Connection, snapshot: &Snapshot) -> Result<()> {
        let tx = conn.transaction()?;
        {
            let mut gauge_stmt = tx.prepare_cached(UPSERT_GAUGE)?;
            for (name, value) in &snapshot.gauge {
                gauge_stmt.execute(rusqlite::params![name, value])?;
            }
            let mut counter_stmt = tx.prepare_cached(UPSERT_COUNTER_SET)?;
            for (name, value) in &snapshot.counter {
                counter_stmt.execute(rusqlite::params![name, value])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn read_snapshot(conn: &Connection) -> Result<Snapshot> {
        let mut snapshot = Snapshot::default();

        let mut stmt = conn.prepare_cached("SELECT name, value FROM t_gauge")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;
        for row in rows {
            let (name, value) = row?;
            snapshot.gauge.insert(name, value);
        }

        let mut stmt = conn.prepare_cached("SELECT name, value FROM t_counter")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (name, value) = row?;
            snapshot.counter.insert(name, value);
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl Sink for DbSink {
    async fn on_write(&self, change: Change<'_>, _mem: &MemStorage) -> Result<()> {
        match change {
            Change::Gauge(name, value) => {
                with_retry(|| {
                    self.lock().execute(UPSERT_GAUGE, rusqlite::params![name, value])?;
                    Ok(())
                })
                .await
            }
            Change::Counter(name, delta) => {
                with_retry(|| {
                    self.lock()
                        .execute(UPSERT_COUNTER_ADD, rusqlite::params![name, delta])?;
                    Ok(())
                })
                .await
            }
            Change::Gauges(values) => {
                with_retry(|| Self::upsert_gauges(&mut self.lock(), values)).await
            }
            Change::Counters(deltas) => {
                with_retry(|| Self::upsert_counters(&mut self.lock(), deltas, UPSERT_COUNTER_ADD))
                    .await
            }
        }
    }

    async fn flush(&self, snapshot: Snapshot) -> Result<()> {
        with_retry(|| Self::write_snapshot(&mut self.lock(), &snapshot)).await
    }

    async fn restore(&self) -> Result<Option<Snapshot>> {
        let snapshot = with_retry(|| Self::read_snapshot(&self.lock())).await?;
        if snapshot.is_empty() {
            Ok(None)
        } else {
            Ok(Some(snapshot))
        }
    }

    async fn clear(&self) -> Result<()> {
        with_retry(|| {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM t_gauge", [])?;
            tx.execute("DELETE FROM t_counter", [])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        with_retry(|| {
            self.lock().query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
        .await
    }
}
