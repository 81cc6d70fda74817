//! Transcript list filters, normalization and fingerprints

use crate::store::{Predicate, Query};
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sortable transcript column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    CreatedAt,
    Sentiment,
    CallScore,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::Sentiment => "sentiment",
            SortField::CallScore => "call_score",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Values filled in by [`TranscriptFilter::normalize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDefaults {
    pub page_size: u32,
    pub window_days: i64,
    /// Window end is rounded up to a multiple of this (0 = exact)
    pub window_granularity_secs: i64,
}

impl Default for FilterDefaults {
    fn default() -> Self {
        Self {
            page_size: 10,
            window_days: 30,
            window_granularity_secs: 60,
        }
    }
}

/// Transcript list query as requested by a call site
///
/// `force` bypasses deduplication; `force_timestamp` lets a caller make an
/// otherwise identical forced request distinct in logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranscriptFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search_term: Option<String>,
    #[serde(rename = "sentimentFilter")]
    pub sentiments: Option<Vec<String>>,
    /// 1-based
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortDirection>,
    pub force: bool,
    pub force_timestamp: Option<i64>,
}

impl TranscriptFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search_term = Some(term.into());
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn sentiments<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sentiments = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_by = Some(field);
        self.sort_order = Some(direction);
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Apply defaults so that equivalent filters compare equal
    ///
    /// Missing dates get the trailing default window unless the filter is
    /// forced. Idempotent: normalizing twice yields the same filter.
    pub fn normalize(&self, now: DateTime<Utc>, defaults: &FilterDefaults) -> TranscriptFilter {
        let mut normalized = self.clone();

        normalized.search_term = self.search_term.clone().filter(|term| !term.is_empty());
        normalized.sentiments = self.sentiments.clone().filter(|labels| !labels.is_empty());
        normalized.page = Some(self.page.unwrap_or(1).max(1));
        normalized.limit = Some(match self.limit {
            Some(limit) if limit > 0 => limit,
            _ => defaults.page_size.max(1),
        });
        normalized.sort_by = Some(self.sort_by.unwrap_or_default());
        normalized.sort_order = Some(self.sort_order.unwrap_or_default());

        if !self.force {
            normalized = normalized.with_default_window(now, defaults);
        }
        normalized
    }

    /// Fill whichever of the dates is missing from the default window
    pub fn with_default_window(mut self, now: DateTime<Utc>, defaults: &FilterDefaults) -> Self {
        if self.start_date.is_none() || self.end_date.is_none() {
            let (start, end) = default_window(now, defaults);
            self.start_date.get_or_insert(start);
            self.end_date.get_or_insert(end);
        }
        self
    }

    /// Deterministic dedup key over the normalized fields
    ///
    /// `force` and `force_timestamp` are deliberately not part of the key.
    pub fn fingerprint(&self) -> String {
        let fields: Value = json!({
            "startDate": self.start_date.map(iso),
            "endDate": self.end_date.map(iso),
            "searchTerm": self.search_term,
            "sentimentFilter": self.sentiments,
            "page": self.page.unwrap_or(1),
            "sortBy": self.sort_by.unwrap_or_default(),
            "sortOrder": self.sort_order.unwrap_or_default(),
            "limit": self.limit,
        });
        fields.to_string()
    }

    /// Remote query for this (normalized) filter
    pub fn to_query(&self) -> Query {
        let page = u64::from(self.page.unwrap_or(1).max(1));
        let limit = u64::from(self.limit.unwrap_or(FilterDefaults::default().page_size).max(1));
        let direction = self.sort_order.unwrap_or_default();

        let mut query = Query::new()
            .range((page - 1) * limit, limit)
            .order(
                self.sort_by.unwrap_or_default().column(),
                direction == SortDirection::Asc,
            );

        if let Some(term) = self.search_term.as_deref().filter(|t| !t.is_empty()) {
            query = query.filter(Predicate::ILike {
                column: "text".to_string(),
                pattern: format!("%{}%", term),
            });
        }
        if let Some(start) = self.start_date {
            query = query.filter(Predicate::Gte {
                column: "created_at".to_string(),
                value: Value::String(iso(start)),
            });
        }
        if let Some(end) = self.end_date {
            query = query.filter(Predicate::Lte {
                column: "created_at".to_string(),
                value: Value::String(iso(end)),
            });
        }
        if let Some(labels) = self.sentiments.as_ref().filter(|l| !l.is_empty()) {
            query = query.filter(Predicate::In {
                column: "sentiment".to_string(),
                values: labels.iter().cloned().map(Value::String).collect(),
            });
        }
        query
    }
}

/// Millisecond-precision UTC timestamp, e.g. `2026-10-17T09:30:00.000Z`
pub fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Trailing window ending at `now` rounded up to the configured granularity
pub fn default_window(
    now: DateTime<Utc>,
    defaults: &FilterDefaults,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = align_up(now, defaults.window_granularity_secs);
    (end - Duration::days(defaults.window_days), end)
}

fn align_up(now: DateTime<Utc>, granularity_secs: i64) -> DateTime<Utc> {
    if granularity_secs <= 0 {
        return now;
    }
    let step = granularity_secs * 1000;
    let millis = now.timestamp_millis();
    let exact = now.timestamp_subsec_nanos() % 1_000_000 == 0;
    let rem = millis.rem_euclid(step);
    let aligned = if rem == 0 && exact {
        millis
    } else {
        millis - rem + step
    };
    Utc.timestamp_millis_opt(aligned).single().unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, h, m, s).unwrap()
    }

    #[test]
    fn test_defaults_applied() {
        let now = at(9, 30, 0);
        let normalized = TranscriptFilter::new()
            .search("pricing")
            .normalize(now, &FilterDefaults::default());

        assert_eq!(normalized.end_date, Some(now));
        assert_eq!(normalized.start_date, Some(now - Duration::days(30)));
        assert_eq!(normalized.page, Some(1));
        assert_eq!(normalized.limit, Some(10));
        assert_eq!(normalized.sort_by, Some(SortField::CreatedAt));
        assert_eq!(normalized.sort_order, Some(SortDirection::Desc));
        assert_eq!(normalized.search_term.as_deref(), Some("pricing"));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let defaults = FilterDefaults::default();
        let now = at(9, 30, 17);
        let filters = vec![
            TranscriptFilter::new(),
            TranscriptFilter::new().search("").sentiments(Vec::<String>::new()),
            TranscriptFilter::new().page(0).limit(0),
            TranscriptFilter::new().forced(),
            TranscriptFilter::new()
                .between(at(1, 0, 0), at(2, 0, 0))
                .sort(SortField::CallScore, SortDirection::Asc),
            TranscriptFilter {
                end_date: Some(at(3, 0, 0)),
                ..Default::default()
            },
        ];

        for filter in filters {
            let once = filter.normalize(now, &defaults);
            let twice = once.normalize(now + Duration::minutes(5), &defaults);
            assert_eq!(once, twice, "normalize not idempotent for {:?}", filter);
        }
    }

    #[test]
    fn test_equivalent_filters_share_fingerprint() {
        let defaults = FilterDefaults::default();
        let now = at(9, 30, 0);
        let implicit = TranscriptFilter::new().search("pricing");
        let explicit = TranscriptFilter::new()
            .search("pricing")
            .page(1)
            .limit(10)
            .sort(SortField::CreatedAt, SortDirection::Desc)
            .between(now - Duration::days(30), now);

        assert_eq!(
            implicit.normalize(now, &defaults).fingerprint(),
            explicit.normalize(now, &defaults).fingerprint()
        );
    }

    #[test]
    fn test_fingerprint_ignores_force_flags() {
        let defaults = FilterDefaults::default();
        let now = at(9, 30, 0);
        let base = TranscriptFilter::new().between(at(1, 0, 0), at(2, 0, 0));
        let mut forced = base.clone().forced();
        forced.force_timestamp = Some(1234);

        assert_eq!(
            base.normalize(now, &defaults).fingerprint(),
            forced.normalize(now, &defaults).fingerprint()
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_fields() {
        let defaults = FilterDefaults::default();
        let now = at(9, 30, 0);
        let a = TranscriptFilter::new().search("pricing").normalize(now, &defaults);
        let b = TranscriptFilter::new().search("refund").normalize(now, &defaults);
        let c = TranscriptFilter::new().search("pricing").page(2).normalize(now, &defaults);
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn test_default_window_rounds_end_up() {
        let defaults = FilterDefaults::default();
        let (start, end) = default_window(at(9, 30, 17), &defaults);
        assert_eq!(end, at(9, 31, 0));
        assert_eq!(start, at(9, 31, 0) - Duration::days(30));

        // Calls within the same minute agree
        let later = default_window(at(9, 30, 59), &defaults);
        assert_eq!(later.1, end);

        let exact = FilterDefaults {
            window_granularity_secs: 0,
            ..defaults
        };
        assert_eq!(default_window(at(9, 30, 17), &exact).1, at(9, 30, 17));
    }

    #[test]
    fn test_forced_filter_keeps_missing_dates() {
        let normalized = TranscriptFilter::new()
            .forced()
            .normalize(at(9, 30, 0), &FilterDefaults::default());
        assert_eq!(normalized.start_date, None);
        assert_eq!(normalized.end_date, None);
    }

    #[test]
    fn test_to_query_builds_predicates_and_range() {
        let filter = TranscriptFilter::new()
            .search("pricing")
            .sentiments(["negative"])
            .page(3)
            .sort(SortField::CallScore, SortDirection::Asc)
            .normalize(at(9, 30, 0), &FilterDefaults::default());
        let query = filter.to_query();

        assert_eq!(query.range.map(|r| (r.offset, r.limit)), Some((20, 10)));
        let sort = query.sort.clone().unwrap();
        assert_eq!(sort.column, "call_score");
        assert!(sort.ascending);
        assert_eq!(query.predicates.len(), 4);
        assert!(query.predicates.contains(&Predicate::ILike {
            column: "text".into(),
            pattern: "%pricing%".into()
        }));
        assert!(query.predicates.contains(&Predicate::Gte {
            column: "created_at".into(),
            value: Value::String("2026-09-17T09:30:00.000Z".into())
        }));
    }

    #[test]
    fn test_filter_deserializes_from_camel_case() {
        let filter: TranscriptFilter = serde_json::from_str(
            r#"{"searchTerm": "refund", "sentimentFilter": ["negative"], "sortBy": "call_score", "sortOrder": "asc", "force": true}"#,
        )
        .unwrap();
        assert_eq!(filter.search_term.as_deref(), Some("refund"));
        assert_eq!(filter.sort_by, Some(SortField::CallScore));
        assert_eq!(filter.sort_order, Some(SortDirection::Asc));
        assert!(filter.force);
    }
}
