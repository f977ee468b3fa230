use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sentiment_service::utils::time::parse_std_duration;
use sentiment_service::utils::url::mask_password;
use sentiment_service::{
    Classifier, Deduplicator, GeminiClassifier, IngestionPipeline, KeywordClassifier,
    MemoryRecordStore, PgRecordStore, RecordStore, RetryingClassifier, RssContentSource,
    Scheduler, SentimentService, ServiceConfig,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sentiment-service", about = "Harvests financial news and serves bucketed sentiment")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct IngestArgs {
    /// Keep records in memory instead of PostgreSQL.
    #[arg(long)]
    memory_store: bool,

    /// Use the keyword classifier instead of Gemini.
    #[arg(long)]
    offline: bool,

    /// Feed to poll, repeatable. Replaces FEED_URLS.
    #[arg(long = "feed")]
    feeds: Vec<String>,

    /// Replaces POLL_INTERVAL, e.g. 15m.
    #[arg(long)]
    poll_interval: Option<String>,
}

impl IngestArgs {
    fn apply(&self, config: &mut ServiceConfig) -> anyhow::Result<()> {
        if !self.feeds.is_empty() {
            config.feed_urls = self.feeds.clone();
        }
        if let Some(interval) = &self.poll_interval {
            config.poll_interval = parse_std_duration(interval)?;
        }
        config.validate().context("invalid command line override")?;
        Ok(())
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion scheduler until Ctrl-C.
    Run(IngestArgs),

    /// Run a single ingestion pass and print its report.
    IngestOnce(IngestArgs),

    /// Print stored records as JSON, newest first.
    Records {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },

    /// Print bucketed average sentiment as a JSON array, oldest first.
    Aggregate {
        #[arg(long)]
        symbol: Option<String>,
        /// Bucket width, e.g. 1h or 1d.
        #[arg(long)]
        interval: Option<String>,
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
        /// Oldest instant to include, Unix milliseconds.
        #[arg(long)]
        start: Option<i64>,
        /// End of the newest bucket, Unix milliseconds. Defaults to now.
        #[arg(long)]
        end: Option<i64>,
    },

    /// Create the record table and indexes.
    InitDb,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env().context("invalid configuration")?;

    match cli.command {
        Command::Run(args) => {
            args.apply(&mut config)?;
            let pipeline = build_pipeline(&config, &args).await?;
            let dedup = pipeline.deduplicator();
            let handle = Scheduler::new(config.schedule_config()).start(Arc::new(pipeline));

            tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
            info!(
                "Shutting down after {} runs, {} links seen",
                handle.runs_completed(),
                dedup.len()
            );
            handle.shutdown().await;
        }
        Command::IngestOnce(args) => {
            args.apply(&mut config)?;
            let pipeline = build_pipeline(&config, &args).await?;
            let report = pipeline.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Records { symbol, skip, limit } => {
            let service = SentimentService::new(connect_store(&config).await?, config.query_defaults());
            let records = service.list_records(symbol.as_deref(), skip, limit).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Aggregate {
            symbol,
            interval,
            limit,
            start,
            end,
        } => {
            let service = SentimentService::new(connect_store(&config).await?, config.query_defaults());
            match service
                .aggregate_sentiment(symbol.as_deref(), interval.as_deref(), limit, start, end)
                .await
            {
                Ok(buckets) => println!("{}", serde_json::to_string(&buckets)?),
                Err(e) if e.is_client_error() => {
                    error!("Bad request: {}", e);
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Command::InitDb => {
            let store = PgRecordStore::connect(&config.database_url)
                .await
                .with_context(|| format!("failed to connect to {}", mask_password(&config.database_url)))?;
            store.setup_schema().await?;
        }
    }

    Ok(())
}

async fn connect_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    info!("Connecting to database: {}", mask_password(&config.database_url));
    let store = PgRecordStore::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to {}", mask_password(&config.database_url)))?;
    Ok(Arc::new(store))
}

async fn build_pipeline(config: &ServiceConfig, args: &IngestArgs) -> anyhow::Result<IngestionPipeline> {
    let store: Arc<dyn RecordStore> = if args.memory_store {
        info!("Using in-memory record store");
        Arc::new(MemoryRecordStore::new())
    } else {
        info!("Connecting to database: {}", mask_password(&config.database_url));
        let store = PgRecordStore::connect(&config.database_url)
            .await
            .with_context(|| format!("failed to connect to {}", mask_password(&config.database_url)))?;
        store.setup_schema().await?;
        Arc::new(store)
    };

    let classifier: Arc<dyn Classifier> = if args.offline {
        Arc::new(KeywordClassifier::new())
    } else {
        Arc::new(GeminiClassifier::new(config.gemini_config()?)?)
    };
    info!("Classifier: {}", classifier.classifier_name());

    let source = RssContentSource::new(config.feed_urls.clone(), config.fetch.clone())?;
    let dedup = Deduplicator::seed_from_store(store.as_ref(), config.dedup_lookback).await?;

    Ok(IngestionPipeline::new(
        Arc::new(source),
        Arc::new(RetryingClassifier::new(classifier, config.retry_policy())),
        store,
        Arc::new(dedup),
        config.pipeline_config(),
    ))
}
