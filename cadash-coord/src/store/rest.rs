//! PostgREST-style HTTP store
//!
//! Speaks the REST dialect of the hosted call-analytics backend: filters as
//! `column=op.value` query parameters, paging through the `Range` header and
//! the exact total count read back from `Content-Range`.

use super::{Predicate, Query, QueryPage, RemoteStore, Row, StoreError, StoreResult};
use crate::config::StoreConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("cadash/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the remote store
pub struct RestStore {
    http_client: reqwest::Client,
    base_url: String,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<&str>) -> StoreResult<Self> {
        Self::build(base_url.into(), api_key, Duration::from_secs(15), Duration::from_secs(5))
    }

    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::build(
            config.base_url.clone(),
            config.api_key.as_deref(),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    fn build(
        base_url: String,
        api_key: Option<&str>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> StoreResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let apikey = HeaderValue::from_str(key)
                .map_err(|e| StoreError::InvalidRequest(format!("invalid api key: {}", e)))?;
            let bearer = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| StoreError::InvalidRequest(format!("invalid api key: {}", e)))?;
            headers.insert("apikey", apikey);
            headers.insert(AUTHORIZATION, bearer);
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| StoreError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.base_url, table)
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Parse a `return=representation` body into its first row
    async fn single_row(response: Response, what: &str) -> StoreResult<Row> {
        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(what.to_string()))
    }
}

#[async_trait]
impl RemoteStore for RestStore {
    async fn query(&self, table: &str, query: &Query) -> StoreResult<QueryPage> {
        let params = encode_query(query);
        debug!(table, ?params, "Querying remote store");

        let mut request = self
            .http_client
            .get(self.table_url(table))
            .query(&params)
            .header("Prefer", "count=exact");
        if let Some(range) = query.range {
            let last = range.offset + range.limit.max(1) - 1;
            request = request
                .header("Range-Unit", "items")
                .header("Range", format!("{}-{}", range.offset, last));
        }

        let response = self.send(request).await?;
        let total_from_header = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total);

        let rows: Vec<Row> = response
            .json()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        let total_count = total_from_header.unwrap_or(rows.len() as u64);

        Ok(QueryPage { rows, total_count })
    }

    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row> {
        let request = self
            .http_client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row));
        let response = self.send(request).await?;
        Self::single_row(response, table).await
    }

    async fn update(&self, table: &str, id: &str, patch: Row) -> StoreResult<Row> {
        let request = self
            .http_client
            .patch(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&Value::Object(patch));
        let response = self.send(request).await?;
        Self::single_row(response, &format!("{}/{}", table, id)).await
    }

    async fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        let request = self
            .http_client
            .delete(self.table_url(table))
            .query(&[("id", format!("eq.{}", id))]);
        self.send(request).await?;
        Ok(())
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Query-string parameters for a list query
pub(crate) fn encode_query(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), "*".to_string())];

    for predicate in &query.predicates {
        let encoded = match predicate {
            Predicate::Eq { value, .. } => format!("eq.{}", literal(value)),
            Predicate::ILike { pattern, .. } => format!("ilike.{}", pattern),
            Predicate::Gte { value, .. } => format!("gte.{}", literal(value)),
            Predicate::Lte { value, .. } => format!("lte.{}", literal(value)),
            Predicate::In { values, .. } => {
                let items: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", literal(v).replace('"', "\\\"")))
                    .collect();
                format!("in.({})", items.join(","))
            }
        };
        params.push((predicate.column().to_string(), encoded));
    }

    if let Some(sort) = &query.sort {
        let direction = if sort.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", sort.column, direction)));
    }

    params
}

/// Total from a `Content-Range` header such as `0-9/42` or `*/0`
pub(crate) fn parse_content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.rsplit_once('/')?;
    total.trim().parse().ok()
}
