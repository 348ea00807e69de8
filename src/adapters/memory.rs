// In-process stores for tests and local runs.
//
// Both stores can be scripted to fail, stall or crash so deadline and reconciliation
// paths can be exercised without a live backend.

use crate::domain::model::{Filter, Record};
use crate::domain::ports::{ClaimsStore, RecordStore};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    NotFound,
    Transport,
    /// Sleep before answering normally.
    Stall(Duration),
    Panic,
}

#[derive(Default)]
struct TableScript {
    once: VecDeque<Failure>,
    always: Option<Failure>,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    scripts: Mutex<HashMap<String, TableScript>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: &str, record: Record) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.to_string()).or_default().push(record);
    }

    /// Inserts a JSON object row. Non-object values are ignored.
    pub fn insert_json(&self, table: &str, value: Value) {
        if let Some(record) = Record::from_json(value) {
            self.insert(table, record);
        }
    }

    /// Queues a failure for the next query against `table`.
    pub fn fail_next(&self, table: &str, failure: Failure) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts
            .entry(table.to_string())
            .or_default()
            .once
            .push_back(failure);
    }

    /// Applies `failure` to every query against `table` once queued failures are used up.
    pub fn fail_always(&self, table: &str, failure: Failure) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.entry(table.to_string()).or_default().always = Some(failure);
    }

    pub fn clear_failures(&self, table: &str) {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        scripts.remove(table);
    }

    /// Number of queries issued against `table`.
    pub fn calls(&self, table: &str) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.get(table).copied().unwrap_or(0)
    }

    fn next_failure(&self, table: &str) -> Option<Failure> {
        let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
        let script = scripts.get_mut(table)?;
        script.once.pop_front().or(script.always)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn query(&self, table: &str, filter: &Filter) -> Result<Vec<Record>> {
        {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            *calls.entry(table.to_string()).or_default() += 1;
        }

        match self.next_failure(table) {
            Some(Failure::NotFound) => return Err(SyncError::not_found(table)),
            Some(Failure::Transport) => {
                return Err(SyncError::transport(format!("scripted failure on {}", table)))
            }
            Some(Failure::Stall(delay)) => tokio::time::sleep(delay).await,
            Some(Failure::Panic) => panic!("scripted panic on {}", table),
            None => {}
        }

        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|r| filter.matches(r))
                    .take(filter.limit().unwrap_or(usize::MAX))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }
}

/// Session claims held in memory.
#[derive(Default)]
pub struct MemoryClaimsStore {
    claims: Mutex<HashMap<String, Value>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryClaimsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim(self, key: &str, value: Value) -> Self {
        {
            let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
            claims.insert(key.to_string(), value);
        }
        self
    }

    pub fn claim(&self, key: &str) -> Option<Value> {
        let claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.get(key).cloned()
    }

    /// Write attempts, including failed ones.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ClaimsStore for MemoryClaimsStore {
    async fn get_claim(&self, key: &str) -> Option<Value> {
        self.claim(key)
    }

    async fn set_claim(&self, key: &str, value: Value) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::transport("claims store rejected the update"));
        }
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_query_filters_rows() {
        let store = MemoryRecordStore::new();
        store.insert_json("items", json!({"id": 1, "shop_id": 10, "status": "available"}));
        store.insert_json("items", json!({"id": 2, "shop_id": 10, "status": "rented"}));
        store.insert_json("items", json!({"id": 3, "shop_id": 11, "status": "available"}));

        let filter = Filter::eq("shop_id", "10");
        assert_eq!(store.count("items", &filter).await.unwrap(), 2);
        let available = filter.and_eq("status", "available");
        assert_eq!(store.query("items", &available).await.unwrap().len(), 1);
        assert_eq!(store.calls("items"), 2);
    }

    #[tokio::test]
    async fn test_fetch_one_reports_not_found() {
        let store = MemoryRecordStore::new();
        let err = store
            .fetch_one("shops", &Filter::eq("owner_id", "nobody"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!store
            .exists("shops", &Filter::eq("owner_id", "nobody"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_scripted_failures_run_in_order() {
        let store = MemoryRecordStore::new();
        store.insert_json("shops", json!({"id": 1, "owner_id": "u-1"}));
        store.fail_next("shops", Failure::NotFound);
        store.fail_next("shops", Failure::Transport);

        let filter = Filter::eq("owner_id", "u-1");
        assert!(store.fetch_one("shops", &filter).await.unwrap_err().is_not_found());
        assert!(!store.fetch_one("shops", &filter).await.unwrap_err().is_not_found());
        assert!(store.fetch_one("shops", &filter).await.is_ok());
    }

    #[tokio::test]
    async fn test_claims_store_counts_writes() {
        let claims = MemoryClaimsStore::new().with_claim("has_shop", json!(false));
        claims.set_claim("has_shop", json!(true)).await.unwrap();
        assert_eq!(claims.claim("has_shop"), Some(json!(true)));

        claims.set_fail_writes(true);
        assert!(claims.set_claim("has_shop", json!(false)).await.is_err());
        assert_eq!(claims.writes(), 2);
        assert_eq!(claims.claim("has_shop"), Some(json!(true)));
    }
}
