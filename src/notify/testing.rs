//! Test doubles for the notification engine.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::db::{init_database, WatermarkStore};
use crate::fetcher::{CollectionFetcher, FetchError};
use crate::models::{AlertStatus, CollectionKind, Record};

/// Fetcher serving whatever snapshots the test scripted, counting calls per kind.
#[derive(Default)]
pub struct ScriptedFetcher {
    snapshots: Mutex<HashMap<CollectionKind, Vec<Record>>>,
    failing: Mutex<HashSet<CollectionKind>>,
    calls: Mutex<HashMap<CollectionKind, usize>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, kind: CollectionKind, records: Vec<Record>) {
        self.snapshots.lock().insert(kind, records);
    }

    pub fn fail(&self, kind: CollectionKind, failing: bool) {
        let mut set = self.failing.lock();
        if failing {
            set.insert(kind);
        } else {
            set.remove(&kind);
        }
    }

    pub fn delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self, kind: CollectionKind) -> usize {
        self.calls.lock().get(&kind).copied().unwrap_or(0)
    }
}

#[async_trait]
impl CollectionFetcher for ScriptedFetcher {
    async fn fetch(&self, kind: CollectionKind) -> Result<Vec<Record>, FetchError> {
        *self.calls.lock().entry(kind).or_insert(0) += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&kind) {
            return Err(FetchError::Transport("scripted failure".to_string()));
        }
        Ok(self.snapshots.lock().get(&kind).cloned().unwrap_or_default())
    }
}

pub fn open(id: i64) -> Record {
    Record::new(id).with_status(AlertStatus::Open)
}

pub fn closed(id: i64) -> Record {
    Record::new(id).with_status(AlertStatus::Closed)
}

pub fn announcement(id: i64) -> Record {
    Record::new(id)
}

/// Watermark store backed by a throwaway SQLite file. Keep the `TempDir` alive.
pub async fn temp_store() -> (TempDir, WatermarkStore) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let pool = init_database(&dir.path().join("watermarks.sqlite"))
        .await
        .expect("Failed to init DB");
    (dir, WatermarkStore::new(pool))
}
