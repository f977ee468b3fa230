use crate::traits::RecordStore;
use crate::types::Result;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::info;

/// Links that have already been ingested (or rejected) and must not be processed again.
///
/// Seeded from the most recent records in the store at startup. Links older than the
/// lookback window are not loaded, so a feed re-publishing a very old article could see
/// it classified a second time; the store's unique link constraint still prevents a
/// duplicate record.
///
/// The set only grows while the process runs. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: Mutex<HashSet<String>>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seen: Mutex::new(links.into_iter().map(Into::into).collect()),
        }
    }

    pub async fn seed_from_store(store: &dyn RecordStore, lookback: usize) -> Result<Self> {
        let links = store.recent_links(lookback).await?;
        info!("Seeded deduplicator with {} links (lookback {})", links.len(), lookback);
        Ok(Self::with_links(links))
    }

    pub fn seen(&self, link: &str) -> bool {
        self.lock().contains(link)
    }

    /// Check and mark in one step. Returns `true` only for the first caller to claim `link`.
    pub fn claim(&self, link: &str) -> bool {
        self.lock().insert(link.to_string())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        // Inserts cannot leave the set half-updated, so a poisoned lock is still usable.
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
