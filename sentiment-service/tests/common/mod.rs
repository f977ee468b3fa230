#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sentiment_service::types::{
    ArticleRecord, Candidate, RecordQuery, Result, ServiceError,
};
use sentiment_service::{Classifier, ContentSource, MemoryRecordStore, RecordStore};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Fixed reference instant so bucket boundaries are predictable.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

pub fn secs_before(end: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    end - Duration::seconds(seconds)
}

pub fn record(link: &str, symbol: &str, sentiment: f64, published_at: DateTime<Utc>) -> ArticleRecord {
    ArticleRecord {
        id: Uuid::new_v4(),
        link: link.to_string(),
        title: format!("Title of {}", link),
        published_at,
        content: String::new(),
        symbol: symbol.to_string(),
        sentiment,
        reason: "test".to_string(),
        created_at: Utc::now(),
    }
}

pub fn candidate(link: &str, content: &str) -> Candidate {
    Candidate {
        link: link.to_string(),
        title: format!("Title of {}", link),
        published_at: t0(),
        content: content.to_string(),
    }
}

/// Content source returning whatever it was last given. It still lists seen links,
/// but remembers which ones the pipeline reported as seen.
#[derive(Default)]
pub struct StaticSource {
    candidates: Mutex<Vec<Candidate>>,
    fail: AtomicBool,
    reported_seen: Mutex<Vec<String>>,
}

impl StaticSource {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            ..Self::default()
        }
    }

    pub fn reported_seen(&self) -> Vec<String> {
        self.reported_seen.lock().unwrap().clone()
    }

    pub fn set(&self, candidates: Vec<Candidate>) {
        *self.candidates.lock().unwrap() = candidates;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentSource for StaticSource {
    fn source_name(&self) -> String {
        "static".to_string()
    }

    async fn list_candidates(&self, is_seen: &(dyn for<'a> Fn(&'a str) -> bool + Sync)) -> Result<Vec<Candidate>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::General("feed unreachable".to_string()));
        }
        let candidates = self.candidates.lock().unwrap().clone();
        let seen: Vec<String> = candidates
            .iter()
            .filter(|c| is_seen(&c.link))
            .map(|c| c.link.clone())
            .collect();
        *self.reported_seen.lock().unwrap() = seen;
        Ok(candidates)
    }
}

/// Answers with the response whose key appears in the article text, else `default`.
pub struct ScriptedClassifier {
    rules: Vec<(String, Value)>,
    default: Value,
    calls: AtomicU32,
}

impl ScriptedClassifier {
    pub fn new(default: Value) -> Self {
        Self {
            rules: Vec::new(),
            default,
            calls: AtomicU32::new(0),
        }
    }

    pub fn when(mut self, key: &str, response: Value) -> Self {
        self.rules.push((key.to_string(), response));
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn classifier_name(&self) -> String {
        "scripted".to_string()
    }

    async fn classify(&self, text: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self
            .rules
            .iter()
            .find(|(key, _)| text.contains(key.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.default.clone());
        Ok(response)
    }
}

/// Fails the first `failures` calls, then answers with `response`.
pub struct FlakyClassifier {
    failures: u32,
    response: Value,
    calls: AtomicU32,
}

impl FlakyClassifier {
    pub fn new(failures: u32, response: Value) -> Self {
        Self {
            failures,
            response,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::new(u32::MAX, Value::Null)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for FlakyClassifier {
    fn classifier_name(&self) -> String {
        "flaky".to_string()
    }

    async fn classify(&self, _text: &str) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ServiceError::Classifier("rate limited".to_string()));
        }
        Ok(self.response.clone())
    }
}

/// Memory store that can refuse writes for chosen links, or refuse everything.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryRecordStore,
    failing_links: Mutex<HashSet<String>>,
    unavailable: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_insert_for(&self, link: &str) {
        self.failing_links.lock().unwrap().insert(link.to_string());
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::General("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FaultyStore {
    async fn insert(&self, record: &ArticleRecord) -> Result<bool> {
        self.check()?;
        if self.failing_links.lock().unwrap().contains(&record.link) {
            return Err(ServiceError::General(format!("write failed for {}", record.link)));
        }
        self.inner.insert(record).await
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<ArticleRecord>> {
        self.check()?;
        self.inner.query(query).await
    }

    async fn recent_links(&self, limit: usize) -> Result<Vec<String>> {
        self.check()?;
        self.inner.recent_links(limit).await
    }
}
