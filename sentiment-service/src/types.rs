use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Symbol stored for articles that are not about any tracked trading pair.
pub const NONE_SYMBOL: &str = "None";

/// Inclusive bounds of a valid sentiment score.
pub const SENTIMENT_MIN: f64 = -1.0;
pub const SENTIMENT_MAX: f64 = 1.0;

/// Trading pairs the classifier may tag an article with.
pub const SYMBOL_ALLOW_LIST: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "NEOUSDT", "LTCUSDT", "QTUMUSDT", "ADAUSDT", "XRPUSDT",
    "TUSDUSDT", "IOTAUSDT", "XLMUSDT", "ONTUSDT", "TRXUSDT", "ETCUSDT", "ICXUSDT", "VETUSDT",
    "USDCUSDT", "LINKUSDT", "ONGUSDT", "HOTUSDT", "ZILUSDT", "ZRXUSDT", "FETUSDT", "BATUSDT",
    "ZECUSDT", "IOSTUSDT", "CELRUSDT", "DASHUSDT", "THETAUSDT", "ENJUSDT", "ATOMUSDT",
    "TFUELUSDT", "ONEUSDT", "ALGOUSDT", "DOGEUSDT", "DUSKUSDT", "ANKRUSDT", "WINUSDT", "COSUSDT",
    "MTLUSDT", "DENTUSDT", "WANUSDT", "FUNUSDT", "CVCUSDT", "CHZUSDT", "BANDUSDT", "XTZUSDT",
    "RVNUSDT", "HBARUSDT", "NKNUSDT",
];

pub fn is_known_symbol(symbol: &str) -> bool {
    symbol == NONE_SYMBOL || SYMBOL_ALLOW_LIST.contains(&symbol)
}

/// An article discovered from a feed but not yet classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub link: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
}

/// Validated classifier output. Only [`crate::classifier::validate`] builds one,
/// so a `Classification` always carries an allowed symbol and an in-range score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub symbol: String,
    pub sentiment: f64,
    pub reason: String,
}

/// A persisted, classified article. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub id: Uuid,
    pub link: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub symbol: String,
    pub sentiment: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl ArticleRecord {
    pub fn from_classification(candidate: Candidate, classification: Classification) -> Self {
        Self {
            id: Uuid::new_v4(),
            link: candidate.link,
            title: candidate.title,
            published_at: candidate.published_at,
            content: candidate.content,
            symbol: classification.symbol,
            sentiment: classification.sentiment,
            reason: classification.reason,
            created_at: Utc::now(),
        }
    }
}

/// Which records a store scan returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolFilter {
    /// Every record tagged with a tracked symbol; the "None" sentinel is excluded.
    #[default]
    All,
    Symbol(String),
}

impl SymbolFilter {
    pub fn from_option(symbol: Option<&str>) -> Self {
        match symbol {
            Some(s) if !s.is_empty() && s != NONE_SYMBOL => Self::Symbol(s.to_string()),
            _ => Self::All,
        }
    }

    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::All => symbol != NONE_SYMBOL,
            Self::Symbol(s) => s == symbol,
        }
    }
}

/// A filtered, time-descending store scan. `limit == 0` means unbounded.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub symbol: SymbolFilter,
    pub skip: usize,
    pub limit: usize,
}

impl RecordQuery {
    pub fn for_symbol(symbol: SymbolFilter) -> Self {
        Self { symbol, skip: 0, limit: 0 }
    }
}

/// Counters for a single ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub candidates: usize,
    pub fresh: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub rejected: usize,
    pub classify_failed: usize,
    pub store_failed: usize,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Minimum spacing between two requests to the same host; 0 disables it.
    pub min_host_interval_ms: u64,
    pub article_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Sentiment-Service/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 5,
            max_feed_size_mb: 10,
            max_redirects: 5,
            min_host_interval_ms: 1000,
            article_concurrency: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Response too large: {0}")]
    ResponseTooLarge(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Classifier error: {0}")]
    Classifier(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl ServiceError {
    /// True when the caller sent something malformed, as opposed to a failure on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }

    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            seconds: duration.as_secs(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
