use crate::aggregators::{SentimentAggregator, MAX_BUCKET_LIMIT};
use crate::traits::RecordStore;
use crate::types::{ArticleRecord, RecordQuery, Result, ServiceError, SymbolFilter};
use crate::utils::time::{from_unix_millis, parse_interval};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct QueryDefaults {
    /// Bucket width used when the caller gives none.
    pub interval: String,
    /// Bucket count used when the caller gives none.
    pub limit: usize,
    /// Deadline for each store read.
    pub timeout: Duration,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            interval: "1d".to_string(),
            limit: 24,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Read-side operations exposed to callers (HTTP handlers, the CLI, the forecasting service).
///
/// Malformed input comes back as [`ServiceError::InvalidQuery`]; every other error is a
/// server-side failure. A symbol without data is not an error: its buckets are zeros.
pub struct SentimentService {
    store: Arc<dyn RecordStore>,
    aggregator: SentimentAggregator,
    defaults: QueryDefaults,
}

impl SentimentService {
    pub fn new(store: Arc<dyn RecordStore>, defaults: QueryDefaults) -> Self {
        Self {
            aggregator: SentimentAggregator::new(store.clone()),
            store,
            defaults,
        }
    }

    /// Records newest first. `limit == 0` returns everything after `skip`.
    pub async fn list_records(&self, symbol: Option<&str>, skip: i64, limit: i64) -> Result<Vec<ArticleRecord>> {
        let skip = non_negative("skip", skip)?;
        let limit = non_negative("limit", limit)?;

        let query = RecordQuery {
            symbol: SymbolFilter::from_option(symbol),
            skip,
            limit,
        };

        let records = self.with_deadline("listing records", self.store.query(&query)).await?;
        debug!("Listing {} records for {:?}", records.len(), query.symbol);
        Ok(records)
    }

    /// Average sentiment in `limit` buckets of `interval`, oldest first.
    /// `start_ms` and `end_ms` are millisecond Unix timestamps; `end_ms` defaults to now.
    pub async fn aggregate_sentiment(
        &self,
        symbol: Option<&str>,
        interval: Option<&str>,
        limit: Option<i64>,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Vec<f64>> {
        let width = parse_interval(interval.unwrap_or(self.defaults.interval.as_str())).map_err(|e| {
            warn!("Rejected aggregate query: {}", e);
            e
        })?;
        let limit = match limit {
            Some(limit) => non_negative("limit", limit)?,
            None => self.defaults.limit,
        };
        if limit > MAX_BUCKET_LIMIT {
            return Err(ServiceError::InvalidQuery(format!(
                "limit {} exceeds the maximum of {} buckets",
                limit, MAX_BUCKET_LIMIT
            )));
        }
        let start = start_ms.map(from_unix_millis).transpose()?;
        let end = end_ms.map(from_unix_millis).transpose()?;

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(ServiceError::InvalidQuery(format!(
                    "start {} is after end {}",
                    start, end
                )));
            }
        }

        self.with_deadline(
            "aggregating sentiment",
            self.aggregator
                .aggregate(SymbolFilter::from_option(symbol), width, limit, start, end),
        )
        .await
    }

    async fn with_deadline<T, F>(&self, operation: &str, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.defaults.timeout, future)
            .await
            .map_err(|_| ServiceError::timeout(operation, self.defaults.timeout))?
    }
}

fn non_negative(name: &str, value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| ServiceError::InvalidQuery(format!("{} must not be negative, got {}", name, value)))
}
