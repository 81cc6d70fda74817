//! Keyword and sentiment trend aggregates
//!
//! Both updates run as background fan-out after a transcript is saved. They
//! report failures as `BackgroundTaskFailed` and never touch the transcript.

use super::analysis::Sentiment;
use crate::config::UploadConfig;
use crate::error::{CoordError, CoordResult};
use crate::store::{Query, RemoteStore, Row};
use cadash_common::time::Clock;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

pub struct TrendUpdater {
    store: Arc<dyn RemoteStore>,
    clock: Arc<dyn Clock>,
    keyword_table: String,
    sentiment_table: String,
}

fn background_failure(task: &str, err: impl std::fmt::Display) -> CoordError {
    CoordError::BackgroundTaskFailed {
        task: task.to_string(),
        message: err.to_string(),
    }
}

fn object(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

impl TrendUpdater {
    pub fn new(store: Arc<dyn RemoteStore>, clock: Arc<dyn Clock>, config: &UploadConfig) -> Self {
        Self {
            store,
            clock,
            keyword_table: config.keyword_trends_table.clone(),
            sentiment_table: config.sentiment_trends_table.clone(),
        }
    }

    /// Bump the mention count of each keyword, creating missing rows
    pub async fn update_keyword_trends(
        &self,
        keywords: &[String],
        sentiment: Sentiment,
    ) -> CoordResult<()> {
        const TASK: &str = "keyword_trends";
        let now = serde_json::to_value(self.clock.now()).map_err(|e| background_failure(TASK, e))?;

        for keyword in keywords {
            let lookup = Query::new().eq("keyword", keyword.as_str()).range(0, 1);
            let existing = self
                .store
                .query(&self.keyword_table, &lookup)
                .await
                .map_err(|e| background_failure(TASK, e))?;

            match existing.rows.first() {
                Some(row) => {
                    let id = row.get("id").and_then(Value::as_str).ok_or_else(|| {
                        background_failure(TASK, format!("trend row for '{}' has no id", keyword))
                    })?;
                    let count = row.get("count").and_then(Value::as_i64).unwrap_or(0);
                    let patch = object(json!({
                        "count": count + 1,
                        "category": sentiment.as_str(),
                        "last_updated": now,
                    }));
                    self.store
                        .update(&self.keyword_table, id, patch)
                        .await
                        .map_err(|e| background_failure(TASK, e))?;
                }
                None => {
                    let row = object(json!({
                        "keyword": keyword,
                        "category": sentiment.as_str(),
                        "count": 1,
                        "last_updated": now,
                    }));
                    self.store
                        .insert(&self.keyword_table, row)
                        .await
                        .map_err(|e| background_failure(TASK, e))?;
                }
            }
        }

        debug!(keywords = keywords.len(), "Keyword trends updated");
        Ok(())
    }

    /// Record one sentiment observation
    pub async fn update_sentiment_trends(
        &self,
        sentiment: Sentiment,
        call_score: i32,
        user_id: Option<&str>,
    ) -> CoordResult<()> {
        const TASK: &str = "sentiment_trends";
        // Distance from neutral, 0.0-1.0
        let confidence = (f64::from(call_score - 50).abs() / 50.0).min(1.0);
        let row = object(json!({
            "sentiment_label": sentiment.as_str(),
            "confidence": confidence,
            "user_id": user_id,
            "recorded_at": self.clock.now(),
        }));

        self.store
            .insert(&self.sentiment_table, row)
            .await
            .map_err(|e| background_failure(TASK, e))?;
        debug!(sentiment = sentiment.as_str(), "Sentiment trend recorded");
        Ok(())
    }
}
