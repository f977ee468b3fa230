use crate::types::{ArticleRecord, Candidate, RecordQuery, Result, RunReport};
use async_trait::async_trait;

/// Append-only persistence for classified articles.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a record. Returns `false` when a record with the same link already exists;
    /// the store never holds two records for one link.
    async fn insert(&self, record: &ArticleRecord) -> Result<bool>;

    /// Filtered scan, strictly descending by `published_at`.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<ArticleRecord>>;

    /// Links of the most recently published records across all symbols,
    /// including articles tagged with the "None" sentinel.
    async fn recent_links(&self, limit: usize) -> Result<Vec<String>>;
}

/// Anything that can list candidate articles across a set of feeds.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn source_name(&self) -> String;

    /// `is_seen` reports links that were already ingested. A source should not spend
    /// network calls on them; returning them anyway is harmless.
    async fn list_candidates(&self, is_seen: &(dyn for<'a> Fn(&'a str) -> bool + Sync)) -> Result<Vec<Candidate>>;
}

/// Raw text classification backend. Returns the unvalidated JSON object the backend
/// produced; validation and retries happen in [`crate::classifier::RetryingClassifier`].
#[async_trait]
pub trait Classifier: Send + Sync {
    fn classifier_name(&self) -> String;

    async fn classify(&self, text: &str) -> Result<serde_json::Value>;
}

/// Work driven by the [`crate::scheduler::Scheduler`].
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> String;

    async fn run(&self) -> Result<RunReport>;
}
