use crate::traits::RecordStore;
use crate::types::{ArticleRecord, RecordQuery, Result, ServiceError, SymbolFilter};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Largest bucket count a single query may ask for.
pub const MAX_BUCKET_LIMIT: usize = 10_000;

/// Shape of a bucket query: `limit` buckets of `width`, the newest ending at `end`,
/// none reaching back before `start`.
#[derive(Debug, Clone)]
pub struct BucketSpec {
    pub width: Duration,
    pub limit: usize,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

/// Average sentiment per bucket, oldest bucket first. Always returns `spec.limit` values.
///
/// `records` must be sorted newest first. Buckets are half-open `[lower, upper)`; the walk
/// goes from `end` backwards, consuming each record exactly once. An empty bucket
/// averages to `0.0`. When `start` is set, the oldest bucket is clipped to `[start, upper)`
/// and nothing older is produced. Missing buckets are padded with `0.0` at the old end.
pub fn bucket_averages(records: &[ArticleRecord], spec: &BucketSpec) -> Vec<f64> {
    if spec.limit == 0 {
        return Vec::new();
    }

    let mut buckets = Vec::with_capacity(spec.limit.min(records.len() + 1));
    let mut upper = spec.end;
    let mut idx = 0;

    // Records at or after `end` belong to no bucket.
    while idx < records.len() && records[idx].published_at >= upper {
        idx += 1;
    }

    while buckets.len() < spec.limit {
        let (mut lower, mut last) = match upper.checked_sub_signed(spec.width) {
            Some(lower) => (lower, false),
            None => (DateTime::<Utc>::MIN_UTC, true),
        };
        if let Some(start) = spec.start {
            if lower <= start {
                lower = start;
                last = true;
            }
        }

        let mut sum = 0.0;
        let mut count = 0usize;
        while idx < records.len() && records[idx].published_at >= lower {
            sum += records[idx].sentiment;
            count += 1;
            idx += 1;
        }

        buckets.push(if count == 0 { 0.0 } else { sum / count as f64 });

        if last || idx >= records.len() {
            break;
        }
        upper = lower;
    }

    buckets.resize(spec.limit, 0.0);
    buckets.reverse();
    buckets
}

/// Sort newest first unless the records already are.
pub fn ensure_newest_first(records: &mut [ArticleRecord]) {
    let sorted = records
        .windows(2)
        .all(|pair| pair[0].published_at >= pair[1].published_at);
    if !sorted {
        warn!("Store returned {} records out of order, re-sorting", records.len());
        records.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    }
}

/// Answers bucketed sentiment queries over a [`RecordStore`].
pub struct SentimentAggregator {
    store: Arc<dyn RecordStore>,
}

impl SentimentAggregator {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn aggregate(
        &self,
        symbol: SymbolFilter,
        width: Duration,
        limit: usize,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<f64>> {
        if width <= Duration::zero() {
            return Err(ServiceError::InvalidQuery(format!(
                "bucket width must be positive, got {}s",
                width.num_seconds()
            )));
        }
        if limit > MAX_BUCKET_LIMIT {
            return Err(ServiceError::InvalidQuery(format!(
                "limit {} exceeds the maximum of {} buckets",
                limit, MAX_BUCKET_LIMIT
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }

        let spec = BucketSpec {
            width,
            limit,
            start,
            end: end.unwrap_or_else(Utc::now),
        };

        let mut records = self.store.query(&RecordQuery::for_symbol(symbol.clone())).await?;
        ensure_newest_first(&mut records);
        debug!(
            "Bucketing {} records for {:?} into {} x {}s ending {}",
            records.len(),
            symbol,
            limit,
            width.num_seconds(),
            spec.end
        );

        Ok(bucket_averages(&records, &spec))
    }
}
