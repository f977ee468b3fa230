pub mod time_bucket;

pub use time_bucket::{bucket_averages, BucketSpec, SentimentAggregator, MAX_BUCKET_LIMIT};
