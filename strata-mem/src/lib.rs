//! In-memory backend for Strata.
//!
//! [`MemoryBackend`] implements the same query contract as the live adapter
//! against per-table in-process collections, and reproduces its observable
//! behavior: filter semantics, stable ordering, inclusive pagination,
//! cardinality rules and normalized error shapes. Tests seed and inspect it
//! directly, and can force specific outcomes with per-call mocks.
//!
//! # Example
//!
//! ```ignore
//! let backend = MemoryBackend::new();
//! backend.add_items("users", vec![record(json!({"id": 1, "name": "a"}))]);
//! let store = backend.datastore();
//! let rows = store.from("users").eq("name", "a").execute().await;
//! ```

mod pipeline;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_core::query::{Datastore, QueryBackend};
use strata_core::response::ErrorInfo;
use strata_core::spec::{OpKind, Operation, QuerySpec, Row};
use uuid::Uuid;

type MockOutcome = Result<Vec<Row>, ErrorInfo>;

/// One mutable collection per logical table, shared across clones.
///
/// Writes mutate the collections directly with last-write-wins semantics;
/// there is no locking beyond the per-table map shard. Mock overrides are
/// FIFO one-shot per `(table, operation)` and take precedence over the
/// processing pipeline without touching the collections.
#[derive(Clone)]
pub struct MemoryBackend {
    tables: Arc<DashMap<String, Vec<Row>>>,
    mocks: Arc<DashMap<(String, OpKind), VecDeque<MockOutcome>>>,
    native_count: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(DashMap::new()),
            mocks: Arc::new(DashMap::new()),
            native_count: true,
        }
    }

    /// Answer `count()` as unsupported so callers exercise their
    /// fetch-and-measure fallback.
    pub fn without_native_count(mut self) -> Self {
        self.native_count = false;
        self
    }

    /// Handle usable as the query entry point for this backend.
    pub fn datastore(&self) -> Datastore {
        Datastore::new(Arc::new(self.clone()))
    }

    /// Seed rows into a table, creating it on first use.
    pub fn add_items(&self, table: &str, rows: Vec<Row>) {
        self.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Remove every row of a table.
    pub fn clear_items(&self, table: &str) {
        if let Some(mut rows) = self.tables.get_mut(table) {
            rows.clear();
        }
    }

    /// Direct lookup by the `id` field, bypassing the query pipeline.
    pub fn find_by_id(&self, table: &str, id: impl Into<Value>) -> Option<Row> {
        let id = id.into();
        self.tables
            .get(table)?
            .iter()
            .find(|row| row.get("id") == Some(&id))
            .cloned()
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables.get(table).map_or(0, |rows| rows.len())
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }

    /// Queue an error outcome for the next call of `op` on `table`.
    pub fn mock_error(&self, table: &str, op: OpKind, error: ErrorInfo) {
        self.mocks
            .entry((table.to_string(), op))
            .or_default()
            .push_back(Err(error));
    }

    /// Queue a fixed row set for the next call of `op` on `table`.
    pub fn mock_success(&self, table: &str, op: OpKind, rows: Vec<Row>) {
        self.mocks
            .entry((table.to_string(), op))
            .or_default()
            .push_back(Ok(rows));
    }

    pub fn clear_mocks(&self) {
        self.mocks.clear();
    }

    fn take_mock(&self, table: &str, op: OpKind) -> Option<MockOutcome> {
        self.mocks
            .get_mut(&(table.to_string(), op))?
            .pop_front()
    }

    fn select(&self, spec: &QuerySpec) -> Result<Vec<Row>, ErrorInfo> {
        let compiled = pipeline::compile(spec)?;
        let mut matched: Vec<Row> = self
            .tables
            .get(&spec.table)
            .map(|rows| rows.iter().filter(|r| compiled.matches(r)).cloned().collect())
            .unwrap_or_default();
        pipeline::sort_rows(&mut matched, &spec.order);
        let matched = pipeline::paginate(matched, spec.offset, spec.limit);
        Ok(pipeline::project(matched, &spec.select))
    }

    fn insert(&self, spec: &QuerySpec, rows: Vec<Row>) -> Result<Vec<Row>, ErrorInfo> {
        let mut inserted = Vec::with_capacity(rows.len());
        {
            let mut table = self.tables.entry(spec.table.clone()).or_default();
            for mut row in rows {
                let missing_id = row.get("id").map_or(true, Value::is_null);
                if missing_id {
                    row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
                }
                table.push(row.clone());
                inserted.push(row);
            }
        }
        Ok(pipeline::project(inserted, &spec.select))
    }

    fn update(&self, spec: &QuerySpec, patch: &Row) -> Result<Vec<Row>, ErrorInfo> {
        let compiled = pipeline::compile(spec)?;
        let mut updated = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(&spec.table) {
            for row in rows.iter_mut() {
                if compiled.matches(row) {
                    for (key, value) in patch {
                        row.insert(key.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
            }
        }
        Ok(pipeline::project(updated, &spec.select))
    }

    fn delete(&self, spec: &QuerySpec) -> Result<Vec<Row>, ErrorInfo> {
        let compiled = pipeline::compile(spec)?;
        let mut removed = Vec::new();
        if let Some(mut rows) = self.tables.get_mut(&spec.table) {
            rows.retain(|row| {
                if compiled.matches(row) {
                    removed.push(row.clone());
                    false
                } else {
                    true
                }
            });
        }
        Ok(pipeline::project(removed, &spec.select))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn run(&self, spec: QuerySpec) -> Result<Vec<Row>, ErrorInfo> {
        if let Some(outcome) = self.take_mock(&spec.table, spec.op.kind()) {
            return outcome;
        }
        match &spec.op {
            Operation::Select => self.select(&spec),
            Operation::Insert(rows) => self.insert(&spec, rows.clone()),
            Operation::Update(patch) => self.update(&spec, patch),
            Operation::Delete => self.delete(&spec),
        }
    }

    async fn count(&self, spec: QuerySpec) -> Result<Option<u64>, ErrorInfo> {
        if !self.native_count {
            return Ok(None);
        }
        let compiled = pipeline::compile(&spec)?;
        let count = self
            .tables
            .get(&spec.table)
            .map_or(0, |rows| rows.iter().filter(|r| compiled.matches(r)).count());
        Ok(Some(count as u64))
    }
}

/// Build a [`Row`] from a JSON object literal. Seeding helper for tests.
///
/// # Panics
///
/// Panics when `value` is not a JSON object.
pub fn record(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("record() needs a JSON object, got {other}"),
    }
}
