//! Hybrid search engine - cosine similarity plus a bounded keyword boost
//!
//! Brute-force: every query scans the whole store. That is fine for a
//! personal history in the low tens of thousands of records; there is no
//! eviction or approximate index.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::embedding::cosine_similarity;
use super::vectordb::{MemoryStore, StoreError};
use crate::core::record::{now_millis, MemoryRecord};

/// Boost per matched keyword
pub const KEYWORD_BOOST_STEP: f32 = 0.1;
/// Upper bound of the total keyword boost
pub const KEYWORD_BOOST_CAP: f32 = 0.3;
/// Keywords must be longer than this many characters
const MIN_KEYWORD_CHARS: usize = 2;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Recency window applied before scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFilter {
    #[default]
    #[serde(rename = "all")]
    All,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl TimeFilter {
    /// Oldest timestamp kept, or `None` for no filtering
    pub fn cutoff(self, now: i64) -> Option<i64> {
        match self {
            TimeFilter::All => None,
            TimeFilter::Day => Some(now - DAY_MS),
            TimeFilter::SevenDays => Some(now - 7 * DAY_MS),
            TimeFilter::ThirtyDays => Some(now - 30 * DAY_MS),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeFilter::All => "all",
            TimeFilter::Day => "24h",
            TimeFilter::SevenDays => "7d",
            TimeFilter::ThirtyDays => "30d",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(TimeFilter::All),
            "24h" => Ok(TimeFilter::Day),
            "7d" => Ok(TimeFilter::SevenDays),
            "30d" => Ok(TimeFilter::ThirtyDays),
            other => Err(format!(
                "Invalid time filter '{}' (must be: all|24h|7d|30d)",
                other
            )),
        }
    }
}

/// Errors that abort a single search
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Dimension mismatch: query has {query} dimensions, {url} has {stored}")]
    DimensionMismatch {
        query: usize,
        stored: usize,
        url: String,
    },
}

/// Search result with the record and its score breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub record: MemoryRecord,
    pub semantic_score: f32,
    pub keyword_boost: f32,
    /// `semantic_score + keyword_boost`, may exceed 1.0
    pub score: f32,
}

/// Search engine over a memory store
#[derive(Clone)]
pub struct HybridSearchEngine {
    store: Arc<MemoryStore>,
}

impl HybridSearchEngine {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Rank records against a query, newest-wins on score ties.
    pub fn search(
        &self,
        query_vector: &[f32],
        query_text: &str,
        limit: usize,
        time_filter: TimeFilter,
    ) -> Result<Vec<ScoredRecord>, SearchError> {
        self.search_at(now_millis(), query_vector, query_text, limit, time_filter)
    }

    /// Same as [`search`](Self::search) with an explicit "now".
    pub fn search_at(
        &self,
        now: i64,
        query_vector: &[f32],
        query_text: &str,
        limit: usize,
        time_filter: TimeFilter,
    ) -> Result<Vec<ScoredRecord>, SearchError> {
        let records = self.store.scan_all()?;
        rank(records, now, query_vector, query_text, limit, time_filter)
    }
}

/// Score, sort and truncate a set of records.
///
/// Ties on score are broken by timestamp descending, then URL ascending, so
/// identical input always yields identical order.
pub fn rank(
    records: Vec<MemoryRecord>,
    now: i64,
    query_vector: &[f32],
    query_text: &str,
    limit: usize,
    time_filter: TimeFilter,
) -> Result<Vec<ScoredRecord>, SearchError> {
    let cutoff = time_filter.cutoff(now);
    let keywords = keywords(query_text);

    let mut results = Vec::new();
    for record in records {
        if cutoff.is_some_and(|cutoff| record.timestamp < cutoff) {
            continue;
        }

        let semantic_score = cosine_similarity(query_vector, &record.vector).ok_or_else(|| {
            SearchError::DimensionMismatch {
                query: query_vector.len(),
                stored: record.vector.len(),
                url: record.url.clone(),
            }
        })?;
        let keyword_boost = keyword_boost(&keywords, &record);

        results.push(ScoredRecord {
            semantic_score,
            keyword_boost,
            score: semantic_score + keyword_boost,
            record,
        });
    }

    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.record.timestamp.cmp(&a.record.timestamp))
            .then_with(|| a.record.url.cmp(&b.record.url))
    });
    results.truncate(limit);

    Ok(results)
}

/// Distinct lowercase whitespace-separated tokens longer than two characters
pub fn keywords(query: &str) -> BTreeSet<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|token| token.chars().count() > MIN_KEYWORD_CHARS)
        .map(String::from)
        .collect()
}

/// `min(matches * 0.1, 0.3)` over keywords found in the title + text
pub fn keyword_boost(keywords: &BTreeSet<String>, record: &MemoryRecord) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }

    let haystack = format!("{} {}", record.title, record.text).to_lowercase();
    let matches = keywords
        .iter()
        .filter(|keyword| haystack.contains(keyword.as_str()))
        .count();

    (matches as f32 * KEYWORD_BOOST_STEP).min(KEYWORD_BOOST_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::embedding::{Embedder, HtpEmbedder};

    const NOW: i64 = 1_760_000_000_000;

    fn record(url: &str, title: &str, text: &str, vector: Vec<f32>, timestamp: i64) -> MemoryRecord {
        MemoryRecord {
            url: url.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            vector,
            favicon: None,
            timestamp,
        }
    }

    fn engine_with(records: &[MemoryRecord]) -> HybridSearchEngine {
        let store = Arc::new(MemoryStore::open_in_memory().unwrap());
        for r in records {
            store.upsert(r).unwrap();
        }
        HybridSearchEngine::new(store)
    }

    fn urls(results: &[ScoredRecord]) -> Vec<&str> {
        results.iter().map(|r| r.record.url.as_str()).collect()
    }

    #[test]
    fn test_time_filter_parse_and_display() {
        for s in ["all", "24h", "7d", "30d"] {
            assert_eq!(s.parse::<TimeFilter>().unwrap().to_string(), s);
        }
        assert!("1y".parse::<TimeFilter>().is_err());
        assert_eq!(serde_json::to_string(&TimeFilter::Day).unwrap(), "\"24h\"");
    }

    #[test]
    fn test_empty_store() {
        let engine = engine_with(&[]);
        let results = engine.search(&[1.0, 0.0], "anything", 10, TimeFilter::All).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_time_filter_windows() {
        let v = vec![1.0, 0.0];
        let engine = engine_with(&[
            record("https://1h.test", "a", "a", v.clone(), NOW - HOUR_MS),
            record("https://2d.test", "b", "b", v.clone(), NOW - 2 * DAY_MS),
            record("https://10d.test", "c", "c", v.clone(), NOW - 10 * DAY_MS),
            record("https://40d.test", "d", "d", v.clone(), NOW - 40 * DAY_MS),
        ]);

        let run = |filter| engine.search_at(NOW, &v, "", 10, filter).unwrap();

        assert_eq!(urls(&run(TimeFilter::Day)), ["https://1h.test"]);
        assert_eq!(urls(&run(TimeFilter::SevenDays)), ["https://1h.test", "https://2d.test"]);
        assert_eq!(
            urls(&run(TimeFilter::ThirtyDays)),
            ["https://1h.test", "https://2d.test", "https://10d.test"]
        );
        assert_eq!(run(TimeFilter::All).len(), 4);
    }

    #[test]
    fn test_keyword_boost_is_capped() {
        let r = record(
            "https://k.test",
            "alpha beta",
            "gamma delta epsilon",
            vec![1.0, 0.0],
            NOW,
        );
        let kw = keywords("alpha beta gamma delta epsilon");
        assert_eq!(kw.len(), 5);
        assert!((keyword_boost(&kw, &r) - 0.3).abs() < 1e-6);

        let kw = keywords("alpha beta");
        assert!((keyword_boost(&kw, &r) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_keywords_are_distinct_and_longer_than_two() {
        let kw = keywords("Rust rust IS an OWNERSHIP  model");
        let kw: Vec<_> = kw.iter().map(String::as_str).collect();
        assert_eq!(kw, ["model", "ownership", "rust"]);
    }

    #[test]
    fn test_boost_can_exceed_one() {
        let v = vec![0.6, 0.8];
        let engine = engine_with(&[record("https://x.test", "rust borrow", "checker", v.clone(), NOW)]);
        let results = engine.search_at(NOW, &v, "rust borrow checker", 10, TimeFilter::All).unwrap();
        assert!(results[0].score > 1.0);
        assert!((results[0].score - 1.3).abs() < 1e-5);
    }

    #[test]
    fn test_ranking_is_deterministic_with_ties() {
        let v = vec![1.0, 0.0];
        let engine = engine_with(&[
            record("https://b.test", "t", "t", v.clone(), NOW),
            record("https://a.test", "t", "t", v.clone(), NOW),
            record("https://older.test", "t", "t", v.clone(), NOW - HOUR_MS),
            record("https://far.test", "t", "t", vec![0.0, 1.0], NOW),
        ]);

        let first = engine.search_at(NOW, &v, "query", 10, TimeFilter::All).unwrap();
        for _ in 0..5 {
            let again = engine.search_at(NOW, &v, "query", 10, TimeFilter::All).unwrap();
            assert_eq!(urls(&first), urls(&again));
        }
        assert_eq!(
            urls(&first),
            ["https://a.test", "https://b.test", "https://older.test", "https://far.test"]
        );
    }

    #[test]
    fn test_limit() {
        let v = vec![1.0, 0.0];
        let records: Vec<_> = (0..5)
            .map(|i| record(&format!("https://{i}.test"), "t", "t", v.clone(), NOW - i))
            .collect();
        let engine = engine_with(&records);
        assert_eq!(engine.search_at(NOW, &v, "", 3, TimeFilter::All).unwrap().len(), 3);
        assert!(engine.search_at(NOW, &v, "", 0, TimeFilter::All).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_fails_loudly() {
        let engine = engine_with(&[record("https://a.test", "t", "t", vec![1.0, 0.0], NOW)]);
        let err = engine.search_at(NOW, &[1.0, 0.0, 0.0], "", 10, TimeFilter::All).unwrap_err();
        assert!(matches!(err, SearchError::DimensionMismatch { query: 3, stored: 2, .. }));
    }

    #[test]
    fn test_semantic_score_bounds() {
        let model = HtpEmbedder::new();
        let texts = ["rust ownership", "cooking pasta", "borrow checker basics", "boil water"];
        let records: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| record(&format!("https://{i}.test"), "", t, model.embed(t).unwrap(), NOW))
            .collect();
        let engine = engine_with(&records);

        let query = model.embed("rust ownership").unwrap();
        let results = engine.search_at(NOW, &query, "", 10, TimeFilter::All).unwrap();
        for r in &results {
            assert!((-1.0f32 - 1e-6..=1.0 + 1e-6).contains(&r.semantic_score));
        }
        assert_eq!(results[0].record.text, "rust ownership");
        assert!((results[0].semantic_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rust_borrow_scenario() {
        let model = HtpEmbedder::new();
        let a_text = "Title: Rust ownership. Content: borrow checker basics";
        let b_text = "Title: Cooking pasta. Content: boil water";
        let engine = engine_with(&[
            record("https://a.test", "Rust ownership", a_text, model.embed(a_text).unwrap(), NOW),
            record(
                "https://b.test",
                "Cooking pasta",
                b_text,
                model.embed(b_text).unwrap(),
                NOW - 40 * DAY_MS,
            ),
        ]);

        let query = model.embed("rust borrow").unwrap();
        let results = engine
            .search_at(NOW, &query, "rust borrow", 10, TimeFilter::ThirtyDays)
            .unwrap();

        assert_eq!(urls(&results), ["https://a.test"]);
        assert!((results[0].keyword_boost - 0.2).abs() < 1e-6);
        assert!((results[0].score - (results[0].semantic_score + 0.2)).abs() < 1e-6);
    }
}
