//! Transcript records as stored in the remote `call_transcripts` table

use crate::store::{Row, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One diarized stretch of a transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Seconds from start of audio
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub end: f64,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// Persisted transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// `positive`, `neutral` or `negative`
    #[serde(default)]
    pub sentiment: Option<String>,
    /// 0-100
    #[serde(default)]
    pub call_score: Option<i32>,
    /// Audio length in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Owning user
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub speaker_count: Option<u32>,
    #[serde(default)]
    pub transcript_segments: Option<Vec<TranscriptSegment>>,
}

impl TranscriptRecord {
    pub fn from_row(row: Row) -> StoreResult<Self> {
        serde_json::from_value(Value::Object(row))
            .map_err(|e| StoreError::Parse(format!("transcript row: {}", e)))
    }

    pub fn from_rows(rows: Vec<Row>) -> StoreResult<Vec<Self>> {
        rows.into_iter().map(Self::from_row).collect()
    }
}

/// Transcript to insert; the store assigns `id` and `created_at`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTranscript {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub text: String,
    pub keywords: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_segments: Option<Vec<TranscriptSegment>>,
}

/// Partial update; only `Some` fields are sent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn to_row<T: Serialize>(value: &T) -> StoreResult<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StoreError::InvalidRequest(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(StoreError::InvalidRequest(e.to_string())),
    }
}

impl NewTranscript {
    pub fn to_row(&self) -> StoreResult<Row> {
        to_row(self)
    }
}

impl TranscriptPatch {
    pub fn to_row(&self) -> StoreResult<Row> {
        to_row(self)
    }

    pub fn is_empty(&self) -> bool {
        *self == TranscriptPatch::default()
    }
}
