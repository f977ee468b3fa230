use crate::types::{FetchConfig, Result, ServiceError};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<Mutex<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download a feed document, retrying transport errors and non-2xx responses
    /// with exponential backoff.
    pub async fn fetch_feed(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        let mut backoff: ExponentialBackoff<backoff::SystemClock> = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            randomization_factor: 0.0,
            // Attempts are bounded by max_retries.
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.get(url).await {
                Ok(response) if response.status().is_success() => {
                    match self.read_body(response, url).await {
                        Ok(content) => {
                            info!(
                                "Fetched feed: {} ({} bytes in {}ms)",
                                url,
                                content.len(),
                                start_time.elapsed().as_millis()
                            );
                            return Ok(content);
                        }
                        Err(e @ ServiceError::ResponseTooLarge(_)) => return Err(e),
                        Err(e) => last_error = Some(e),
                    }
                }
                Ok(response) => {
                    let status = response.status();
                    last_error = Some(ServiceError::General(format!(
                        "HTTP {}: {}",
                        status,
                        status.canonical_reason().unwrap_or("Unknown")
                    )));
                }
                Err(e) => last_error = Some(e),
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {}, retrying in {:?}", attempt + 1, url, delay);
                    tokio::time::sleep(delay).await;
                    continue;
                }
            }
            break;
        }

        error!(
            "Failed to fetch feed after {} attempts: {}",
            self.config.max_retries.saturating_add(1),
            url
        );
        Err(last_error.unwrap_or_else(|| ServiceError::General(format!("Failed to fetch {}", url))))
    }

    /// Download an article page. A single attempt: a missing body is not worth retrying.
    pub async fn fetch_article(&self, url: &str) -> Result<String> {
        debug!("Fetching article: {}", url);

        let response = self.get(url).await?;
        if !response.status().is_success() {
            return Err(ServiceError::General(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        self.read_body(response, url).await
    }

    /// Read a body of at most `max_feed_size_mb`. The cap holds for chunked
    /// responses too, which carry no Content-Length.
    async fn read_body(&self, mut response: Response, url: &str) -> Result<String> {
        let limit = self.config.max_feed_size_mb.saturating_mul(1024 * 1024);
        let too_large = || {
            ServiceError::ResponseTooLarge(format!(
                "{} is over {}MB",
                url, self.config.max_feed_size_mb
            ))
        };

        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }

        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn get(&self, url: &str) -> Result<Response> {
        self.apply_rate_limit(url).await?;
        Ok(self.client.get(url).send().await?)
    }

    async fn apply_rate_limit(&self, url: &str) -> Result<()> {
        let min_interval = Duration::from_millis(self.config.min_host_interval_ms);
        if min_interval.is_zero() {
            return Ok(());
        }

        let parsed_url = Url::parse(url)?;
        let host = parsed_url.host_str().unwrap_or("").to_string();

        // Reserve the next slot for this host, then sleep without holding the lock.
        let wait_time = {
            let mut rate_limiter = self.rate_limiter.lock().await;
            let now = Instant::now();
            let slot = match rate_limiter.get(&host) {
                Some(&last) if last + min_interval > now => last + min_interval,
                _ => now,
            };
            rate_limiter.insert(host.clone(), slot);
            slot - now
        };

        if !wait_time.is_zero() {
            debug!("Rate limiting {}: waiting {:?}", host, wait_time);
            tokio::time::sleep(wait_time).await;
        }

        Ok(())
    }
}
