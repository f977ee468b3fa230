use crate::classifier::{ClassifyFailure, RetryingClassifier};
use crate::dedup::Deduplicator;
use crate::traits::{ContentSource, RecordStore, ScheduledJob};
use crate::types::{ArticleRecord, Candidate, Result, RunReport, ServiceError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Candidates classified at the same time within one run.
    pub classify_concurrency: usize,
    /// Upper bound for listing candidates across all feeds.
    pub source_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classify_concurrency: 4,
            source_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Stored,
    Duplicate,
    Rejected,
    ClassifyFailed,
    StoreFailed,
}

/// One ingestion run: list candidates, drop the ones already seen, classify the
/// rest and append the valid results to the store.
///
/// A candidate is marked seen before it is classified, so it is never processed
/// twice even when classification or the store write later fails.
pub struct IngestionPipeline {
    source: Arc<dyn ContentSource>,
    classifier: Arc<RetryingClassifier>,
    store: Arc<dyn RecordStore>,
    dedup: Arc<Deduplicator>,
    config: PipelineConfig,
}

impl IngestionPipeline {
    pub fn new(
        source: Arc<dyn ContentSource>,
        classifier: Arc<RetryingClassifier>,
        store: Arc<dyn RecordStore>,
        dedup: Arc<Deduplicator>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            store,
            dedup,
            config,
        }
    }

    pub fn deduplicator(&self) -> Arc<Deduplicator> {
        self.dedup.clone()
    }

    pub async fn run_once(&self) -> Result<RunReport> {
        info!(
            "Starting ingestion run from {} (up to {} classifier attempts per article)",
            self.source.source_name(),
            self.classifier.policy().attempts()
        );

        // Probe the store before touching the deduplicator so an outage does not
        // swallow this run's candidates.
        self.store.recent_links(1).await.map_err(|e| {
            error!("Record store unavailable, aborting run: {}", e);
            e
        })?;

        let dedup = &self.dedup;
        let is_seen = |link: &str| dedup.seen(link);
        let candidates = tokio::time::timeout(
            self.config.source_timeout,
            self.source.list_candidates(&is_seen),
        )
        .await
        .map_err(|_| ServiceError::timeout("listing candidates", self.config.source_timeout))??;

        let mut report = RunReport {
            candidates: candidates.len(),
            ..Default::default()
        };

        let fresh: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| self.dedup.claim(&candidate.link))
            .collect();
        report.fresh = fresh.len();
        info!("Found {} new articles out of {}", report.fresh, report.candidates);

        let outcomes: Vec<CandidateOutcome> = stream::iter(fresh)
            .map(|candidate| self.process_candidate(candidate))
            .buffer_unordered(self.config.classify_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                CandidateOutcome::Stored => report.stored += 1,
                CandidateOutcome::Duplicate => report.duplicates += 1,
                CandidateOutcome::Rejected => report.rejected += 1,
                CandidateOutcome::ClassifyFailed => report.classify_failed += 1,
                CandidateOutcome::StoreFailed => report.store_failed += 1,
            }
        }

        info!(
            "Ingestion run finished: {} candidates, {} new, {} stored, {} rejected, {} classify failures, {} store failures",
            report.candidates,
            report.fresh,
            report.stored,
            report.rejected,
            report.classify_failed,
            report.store_failed
        );
        Ok(report)
    }

    async fn process_candidate(&self, candidate: Candidate) -> CandidateOutcome {
        debug!("Classifying new entry: {}", candidate.link);

        let text = format!("Title: {}\n\nContent: {}", candidate.title, candidate.content);
        let classification = match self.classifier.classify(&text).await {
            Ok(classification) => classification,
            Err(ClassifyFailure::Invalid(e)) => {
                warn!("Rejected classification for {}: {}", candidate.link, e);
                return CandidateOutcome::Rejected;
            }
            Err(e) => {
                warn!("Failed to analyze sentiment for {}: {}", candidate.link, e);
                return CandidateOutcome::ClassifyFailed;
            }
        };

        let record = ArticleRecord::from_classification(candidate, classification);
        match self.store.insert(&record).await {
            Ok(true) => {
                info!(
                    "Saved {} ({} {:+.2}) for {}",
                    record.id, record.symbol, record.sentiment, record.link
                );
                CandidateOutcome::Stored
            }
            Ok(false) => {
                debug!("Record for {} already stored", record.link);
                CandidateOutcome::Duplicate
            }
            Err(e) => {
                error!("Failed to store record for {}: {}", record.link, e);
                CandidateOutcome::StoreFailed
            }
        }
    }
}

#[async_trait]
impl ScheduledJob for IngestionPipeline {
    fn name(&self) -> String {
        "sentiment-ingestion".to_string()
    }

    async fn run(&self) -> Result<RunReport> {
        self.run_once().await
    }
}
