use crate::types::{Result, ServiceError};
use crate::utils::text::normalize_whitespace;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEntry {
    pub link: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    /// Plain-text summary from the feed, if it carried one.
    pub summary: Option<String>,
}

pub struct FeedParser;

impl FeedParser {
    /// Parse an RSS/Atom document into entries. Entries without a link or without
    /// a publish (or update) time are skipped, as are repeated links.
    pub fn parse_feed(content: &str) -> Result<Vec<ParsedEntry>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| ServiceError::Parse(format!("Failed to parse feed: {}", e)))?;

        let mut seen_links = HashSet::new();
        let mut entries = Vec::new();

        for entry in feed.entries {
            let Some(link) = entry.links.first().map(|l| l.href.trim().to_string()) else {
                debug!("Skipping entry {} without a link", entry.id);
                continue;
            };

            let Some(published_at) = entry.published.or(entry.updated) else {
                debug!("Skipping entry without a publish time: {}", link);
                continue;
            };

            if !seen_links.insert(link.clone()) {
                debug!("Skipping duplicate entry with URL: {}", link);
                continue;
            }

            let title = entry
                .title
                .map(|t| normalize_whitespace(&strip_tags(&t.content)))
                .unwrap_or_else(|| "Untitled".to_string());

            let summary = entry
                .summary
                .map(|s| normalize_whitespace(&strip_tags(&s.content)))
                .filter(|s| !s.is_empty());

            entries.push(ParsedEntry {
                link,
                title,
                published_at: published_at.with_timezone(&Utc),
                summary,
            });
        }

        info!("Parsed feed with {} entries", entries.len());
        Ok(entries)
    }

    /// Body text of an article page: the text of its non-empty `<p>` elements,
    /// one paragraph per line.
    pub fn extract_article_text(html: &str) -> String {
        // ASCII lowercasing keeps byte offsets identical to `html`.
        let lower = html.to_ascii_lowercase();
        let mut paragraphs = Vec::new();
        let mut pos = 0;

        while let Some(found) = lower[pos..].find("<p") {
            let tag_start = pos + found;
            let after_name = tag_start + 2;

            let is_paragraph = matches!(
                lower.as_bytes().get(after_name),
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'/')
            );
            if !is_paragraph {
                pos = after_name;
                continue;
            }

            let Some(open_end) = lower[after_name..].find('>').map(|i| after_name + i + 1) else {
                break;
            };

            let close = lower[open_end..].find("</p").map(|i| open_end + i);
            let next_open = lower[open_end..].find("<p").map(|i| open_end + i);
            let body_end = match (close, next_open) {
                (Some(c), Some(n)) => c.min(n),
                (Some(c), None) => c,
                (None, Some(n)) => n,
                (None, None) => lower.len(),
            };

            let text = normalize_whitespace(&strip_tags(&html[open_end..body_end]));
            if !text.is_empty() {
                paragraphs.push(text);
            }
            pos = body_end;
        }

        paragraphs.join("\n").trim().to_string()
    }
}

/// Remove markup and decode the handful of entities that show up in feed text.
pub fn strip_tags(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
