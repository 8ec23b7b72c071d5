//! In-memory metric maps.

use crate::Snapshot;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Maps {
    gauges: HashMap<String, f64>,
    counters: HashMap<String, i64>,
}

/// Two independent metric namespaces under a single readers-writer lock.
///
/// Enumeration returns snapshot copies, not views of the live maps, so
/// callers can iterate without holding the lock.
#[derive(Debug, Default)]
pub struct MemStorage {
    inner: RwLock<Maps>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_gauge(&self, name: &str, value: f64) {
        let mut maps = self.write();
        maps.gauges.insert(name.to_string(), value);
    }

    pub fn add_counter(&self, name: &str, delta: i64) {
        let mut maps = self.write();
        *maps.counters.entry(name.to_string()).or_insert(0) += delta;
    }

    pub fn set_gauges(&self, values: &HashMap<String, f64>) {
        let mut maps = self.write();
        for (name, value) in values {
            maps.gauges.insert(name.clone(), *value);
        }
    }

    pub fn add_counters(&self, deltas: &HashMap<String, i64>) {
        let mut maps = self.write();
        for (name, delta) in deltas {
            *maps.counters.entry(name.clone()).or_insert(0) += delta;
        }
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.read().gauges.get(name).copied()
    }

    pub fn counter(&self, name: &str) -> Option<i64> {
        self.read().counters.get(name).copied()
    }

    pub fn gauges(&self) -> HashMap<String, f64> {
        self.read().gauges.clone()
    }

    pub fn counters(&self) -> HashMap<String, i64> {
        self.read().counters.clone()
    }

    /// Copies both namespaces under one read-lock acquisition, so the
    /// snapshot is a consistent image of the store.
    pub fn snapshot(&self) -> Snapshot {
        let maps = self.read();
        Snapshot {
            gauge: maps.gauges.clone(),
            counter: maps.counters.clone(),
        }
    }

    /// Replays a restored snapshot: gauges replace, counters add.
    pub fn load(&self, snapshot: Snapshot) {
        let mut maps = self.write();
        for (name, value) in snapshot.gauge {
            maps.gauges.insert(name, value);
        }
        for (name, delta) in snapshot.counter {
            *maps.counters.entry(name).or_insert(0) += delta;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Maps> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Maps> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
