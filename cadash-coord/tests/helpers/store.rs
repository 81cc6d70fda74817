//! Remote store wrapper that counts calls and injects failures

use async_trait::async_trait;
use cadash_coord::store::{MemoryStore, Query, QueryPage, RemoteStore, Row, StoreError, StoreResult};
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct CountingStore {
    /// Backing store; generated `created_at` values come from the test clock
    pub inner: MemoryStore,
    queries: AtomicUsize,
    inserts: AtomicUsize,
    last_query: Mutex<Option<Query>>,
    query_delay: Mutex<Duration>,
    fail_queries: AtomicBool,
    failing_tables: Mutex<HashSet<String>>,
}

impl CountingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::with_clock(super::manual_clock()),
            queries: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            last_query: Mutex::new(None),
            query_delay: Mutex::new(Duration::ZERO),
            fail_queries: AtomicBool::new(false),
            failing_tables: Mutex::new(HashSet::new()),
        })
    }

    /// Seed `n` transcripts created on consecutive days from 2026-10-01
    pub fn seed_transcripts(&self, n: usize) {
        self.inner.seed(
            "call_transcripts",
            (0..n).map(|i| {
                let sentiment = if i % 2 == 0 { "positive" } else { "negative" };
                json!({
                    "id": format!("t-{:02}", i),
                    "text": format!("call {} about pricing", i),
                    "sentiment": sentiment,
                    "call_score": 50 + i as i64,
                    "created_at": format!("2026-10-{:02}T08:00:00Z", (i % 16) + 1),
                })
                .as_object()
                .cloned()
                .unwrap()
            }),
        );
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<Query> {
        self.last_query.lock().unwrap().clone()
    }

    /// Every query sleeps this long (tokio time) before answering
    pub fn set_query_delay(&self, delay: Duration) {
        *self.query_delay.lock().unwrap() = delay;
    }

    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Inserts into `table` fail with a 500
    pub fn fail_inserts_into(&self, table: &str) {
        self.failing_tables.lock().unwrap().insert(table.to_string());
    }

    fn table_fails(&self, table: &str) -> bool {
        self.failing_tables.lock().unwrap().contains(table)
    }
}

#[async_trait]
impl RemoteStore for CountingStore {
    async fn query(&self, table: &str, query: &Query) -> StoreResult<QueryPage> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());

        let delay = *self.query_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(StoreError::Network("connection reset".to_string()));
        }
        self.inner.query(table, query).await
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if self.table_fails(table) {
            return Err(StoreError::Api {
                status: 500,
                message: format!("insert into {} rejected", table),
            });
        }
        self.inner.insert(table, row).await
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResult<Row> {
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        if self.table_fails(table) {
            return Err(StoreError::Api {
                status: 500,
                message: format!("delete from {} rejected", table),
            });
        }
        self.inner.delete(table, id).await
    }
}
