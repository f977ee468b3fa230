/// Duration strings and time helpers
pub mod time {
    use crate::types::{Result, ServiceError};
    use chrono::{DateTime, Duration, Utc};

    /// Parse a duration string such as `"30s"`, `"15m"`, `"1h"`, `"1d"` or `"2w"`.
    /// A bare number is taken as seconds. Zero and negative durations are rejected.
    pub fn parse_interval(input: &str) -> Result<Duration> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ServiceError::InvalidQuery("empty interval".to_string()));
        }

        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(trimmed.len());
        let (amount, unit) = trimmed.split_at(split);

        let amount: i64 = amount
            .trim()
            .parse()
            .map_err(|_| ServiceError::InvalidQuery(format!("malformed interval '{}'", input)))?;

        let unit_seconds: i64 = match unit {
            "" | "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            "w" => 604_800,
            other => {
                return Err(ServiceError::InvalidQuery(format!(
                    "unknown interval unit '{}' in '{}'",
                    other, input
                )))
            }
        };

        if amount <= 0 {
            return Err(ServiceError::InvalidQuery(format!(
                "interval must be positive, got '{}'",
                input
            )));
        }

        amount
            .checked_mul(unit_seconds)
            .and_then(Duration::try_seconds)
            .ok_or_else(|| ServiceError::InvalidQuery(format!("interval '{}' is too large", input)))
    }

    /// Same grammar as [`parse_interval`], for configuration values.
    pub fn parse_std_duration(input: &str) -> Result<std::time::Duration> {
        let duration = parse_interval(input).map_err(|e| ServiceError::Config(e.to_string()))?;
        duration
            .to_std()
            .map_err(|e| ServiceError::Config(format!("invalid duration '{}': {}", input, e)))
    }

    /// Convert a millisecond Unix timestamp from the query surface.
    pub fn from_unix_millis(millis: i64) -> Result<DateTime<Utc>> {
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            ServiceError::InvalidQuery(format!("timestamp {} is out of range", millis))
        })
    }

    /// Format duration in human-readable form
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.num_seconds();

        if total_seconds < 60 {
            format!("{}s", total_seconds)
        } else if total_seconds < 3600 {
            format!("{}m", total_seconds / 60)
        } else if total_seconds < 86400 {
            format!("{}h", total_seconds / 3600)
        } else {
            format!("{}d", total_seconds / 86400)
        }
    }
}

/// URL utilities
pub mod url {
    use url::Url;

    /// Only absolute http(s) URLs with a host are accepted as feeds.
    pub fn is_valid_feed_url(url_str: &str) -> bool {
        match Url::parse(url_str) {
            Ok(url) => matches!(url.scheme(), "http" | "https") && url.host().is_some(),
            Err(_) => false,
        }
    }

    /// Replace the password of a connection string so it can be logged.
    pub fn mask_password(url_str: &str) -> String {
        match Url::parse(url_str) {
            Ok(mut url) if url.password().is_some() => {
                let _ = url.set_password(Some("***"));
                url.to_string()
            }
            _ => url_str.to_string(),
        }
    }
}

/// Text processing utilities
pub mod text {
    /// Truncate to at most `max_chars` characters, preferring a sentence or word boundary.
    pub fn smart_truncate(text: &str, max_chars: usize) -> String {
        let cut = match text.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => return text.to_string(),
        };

        let truncated = &text[..cut];
        let last_sentence = truncated.rfind('.').filter(|&idx| idx >= cut / 2);
        if let Some(last_sentence) = last_sentence {
            truncated[..last_sentence + 1].to_string()
        } else if let Some(last_space) = truncated.rfind(' ') {
            format!("{}...", &truncated[..last_space])
        } else {
            format!("{}...", truncated)
        }
    }

    /// Collapse runs of whitespace into single spaces.
    pub fn normalize_whitespace(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
