use crate::parser::{FeedParser, ParsedEntry};
use crate::traits::ContentSource;
use crate::types::{Candidate, FetchConfig, Result};
use crate::Fetcher;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use tracing::{info, warn};

/// Candidates from a fixed list of RSS/Atom feeds, with article bodies pulled
/// from the linked pages.
pub struct RssContentSource {
    feed_urls: Vec<String>,
    fetcher: Fetcher,
}

impl RssContentSource {
    pub fn new(feed_urls: Vec<String>, fetch_config: FetchConfig) -> Result<Self> {
        Ok(Self {
            feed_urls,
            fetcher: Fetcher::new(fetch_config)?,
        })
    }

    async fn entries_for_feed(&self, url: &str) -> Result<Vec<ParsedEntry>> {
        let content = self.fetcher.fetch_feed(url).await?;
        FeedParser::parse_feed(&content)
    }

    async fn into_candidate(&self, entry: ParsedEntry) -> Candidate {
        let content = match self.fetcher.fetch_article(&entry.link).await {
            Ok(html) => FeedParser::extract_article_text(&html),
            Err(e) => {
                warn!("Failed to fetch {}: {}", entry.link, e);
                String::new()
            }
        };

        // Fall back to the feed's own summary when the page yields nothing.
        let content = if content.is_empty() {
            entry.summary.unwrap_or_default()
        } else {
            content
        };

        Candidate {
            link: entry.link,
            title: entry.title,
            published_at: entry.published_at,
            content,
        }
    }
}

#[async_trait]
impl ContentSource for RssContentSource {
    fn source_name(&self) -> String {
        format!("RSS ({} feeds)", self.feed_urls.len())
    }

    async fn list_candidates(&self, is_seen: &(dyn for<'a> Fn(&'a str) -> bool + Sync)) -> Result<Vec<Candidate>> {
        let mut seen_links = HashSet::new();
        let mut entries = Vec::new();
        let mut known = 0usize;

        for url in &self.feed_urls {
            match self.entries_for_feed(url).await {
                Ok(feed_entries) => {
                    info!("Feed {}: {} entries", url, feed_entries.len());
                    for entry in feed_entries {
                        if !seen_links.insert(entry.link.clone()) {
                            continue;
                        }
                        if is_seen(&entry.link) {
                            known += 1;
                            continue;
                        }
                        entries.push(entry);
                    }
                }
                Err(e) => warn!("Skipping feed {}: {}", url, e),
            }
        }

        let concurrency = self.fetcher.config().article_concurrency.max(1);
        let candidates: Vec<Candidate> = stream::iter(entries)
            .map(|entry| self.into_candidate(entry))
            .buffered(concurrency)
            .collect()
            .await;

        info!(
            "Listed {} candidates from {} feeds ({} already seen)",
            candidates.len(),
            self.feed_urls.len(),
            known
        );
        Ok(candidates)
    }
}
