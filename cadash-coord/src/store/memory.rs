//! In-process remote store
//!
//! Evaluates queries the way the HTTP store's backend would: all predicates
//! AND-ed, exact total count before ranging, RFC 3339 strings compared as
//! timestamps. Used for local runs and as the backing store in tests.

use super::{Predicate, Query, QueryPage, RemoteStore, Row, StoreError, StoreResult};
use async_trait::async_trait;
use cadash_common::time::{Clock, SystemClock};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Clock used for generated `created_at` values
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Insert rows as-is (no generated columns)
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Snapshot of a table's rows in insertion order
    pub fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.get(table).cloned().unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn query(&self, table: &str, query: &Query) -> StoreResult<QueryPage> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<Row> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.predicates.iter().all(|p| matches_predicate(row, p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        if let Some(sort) = &query.sort {
            matching.sort_by(|a, b| {
                let ordering = match (a.get(&sort.column), b.get(&sort.column)) {
                    (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
                    // Nulls last regardless of direction
                    (Some(Value::Null) | None, _) => return Ordering::Greater,
                    (_, Some(Value::Null) | None) => return Ordering::Less,
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(Ordering::Equal),
                };
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        let total_count = matching.len() as u64;
        let rows = match query.range {
            Some(range) => matching
                .into_iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .collect(),
            None => matching,
        };

        Ok(QueryPage { rows, total_count })
    }

    async fn insert(&self, table: &str, mut row: Row) -> StoreResult<Row> {
        let id = match row.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Null) | None => Uuid::new_v4().to_string(),
            Some(other) => other.to_string(),
        };
        row.insert("id".to_string(), Value::String(id.clone()));
        if matches!(row.get("created_at"), None | Some(Value::Null)) {
            let created_at = serde_json::to_value(self.clock.now())
                .map_err(|e| StoreError::Parse(e.to_string()))?;
            row.insert("created_at".to_string(), created_at);
        }

        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let rows = tables.entry(table.to_string()).or_default();
        if rows.iter().any(|existing| row_id(existing).as_deref() == Some(id.as_str())) {
            return Err(StoreError::InvalidRequest(format!(
                "duplicate id '{}' in {}",
                id, table
            )));
        }
        rows.push(row.clone());
        Ok(row)
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResult<Row> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let row = tables
            .get_mut(table)
            .and_then(|rows| rows.iter_mut().find(|row| row_id(row).as_deref() == Some(id)))
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", table, id)))?;

        for (key, value) in patch {
            if key != "id" {
                row.insert(key, value);
            }
        }
        Ok(row.clone())
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| row_id(row).as_deref() != Some(id));
        }
        Ok(())
    }
}

fn row_id(row: &Row) -> Option<String> {
    match row.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn matches_predicate(row: &Row, predicate: &Predicate) -> bool {
    let cell = row.get(predicate.column()).unwrap_or(&Value::Null);
    match predicate {
        Predicate::Eq { value, .. } => {
            cell == value || compare_values(cell, value) == Some(Ordering::Equal)
        }
        Predicate::ILike { pattern, .. } => match cell {
            Value::String(text) => ilike(text, pattern),
            _ => false,
        },
        Predicate::Gte { value, .. } => matches!(
            compare_values(cell, value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Predicate::Lte { value, .. } => matches!(
            compare_values(cell, value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Predicate::In { values, .. } => values.iter().any(|v| v == cell),
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok()
}

/// Order two cells; `None` when they are not comparable
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(tx), Some(ty)) => Some(tx.cmp(&ty)),
            _ => Some(x.cmp(y)),
        },
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Case-insensitive SQL LIKE
pub(crate) fn ilike(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // Greedy wildcard matching with backtracking to the last '%'
    let (mut t, mut p) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '_' || pattern[p] == text[t]) {
            t += 1;
            p += 1;
        } else if p < pattern.len() && pattern[p] == '%' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '%' {
        p += 1;
    }
    p == pattern.len()
}
