pub mod types;
pub mod traits;
pub mod utils;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod llm_adapter;
pub mod classifier;
pub mod dedup;
pub mod record_store;
pub mod pipeline;
pub mod scheduler;
pub mod aggregators;
pub mod service;

pub use types::*;
pub use traits::{Classifier, ContentSource, RecordStore, ScheduledJob};
pub use config::ServiceConfig;
pub use fetcher::Fetcher;
pub use parser::FeedParser;
pub use sources::RssContentSource;
pub use llm_adapter::{GeminiClassifier, GeminiConfig, KeywordClassifier};
pub use classifier::{ClassifyFailure, RetryPolicy, RetryingClassifier, ValidationError};
pub use dedup::Deduplicator;
pub use record_store::{MemoryRecordStore, PgRecordStore};
pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use scheduler::{ScheduleConfig, Scheduler, SchedulerHandle};
pub use aggregators::{BucketSpec, SentimentAggregator};
pub use service::{QueryDefaults, SentimentService};
