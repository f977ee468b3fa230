use crate::traits::Classifier;
use crate::types::{is_known_symbol, Classification, SENTIMENT_MAX, SENTIMENT_MIN};
use backoff::backoff::{Backoff, Constant};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("classifier response is not a JSON object")]
    NotAnObject,

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("field '{0}' is not a string")]
    NotAString(&'static str),

    #[error("sentiment is not numeric: {0}")]
    NotNumeric(String),

    #[error("sentiment {0} is outside [-1, 1]")]
    OutOfRange(f64),

    #[error("symbol '{0}' is not tracked")]
    UnknownSymbol(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassifyFailure {
    #[error("classification failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("classification rejected: {0}")]
    Invalid(#[from] ValidationError),
}

/// Check a raw classifier response and turn it into a [`Classification`].
pub fn validate(value: &Value) -> Result<Classification, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let symbol = match object.get("symbol") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("symbol")),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(_) => return Err(ValidationError::NotAString("symbol")),
    };

    let sentiment = match object.get("sentiment") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("sentiment")),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ValidationError::NotNumeric(n.to_string()))?,
        Some(other) => return Err(ValidationError::NotNumeric(other.to_string())),
    };

    let reason = match object.get("reason") {
        None | Some(Value::Null) => return Err(ValidationError::MissingField("reason")),
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(ValidationError::NotAString("reason")),
    };

    if !(SENTIMENT_MIN..=SENTIMENT_MAX).contains(&sentiment) {
        return Err(ValidationError::OutOfRange(sentiment));
    }

    if !is_known_symbol(&symbol) {
        return Err(ValidationError::UnknownSymbol(symbol));
    }

    Ok(Classification {
        symbol,
        sentiment,
        reason,
    })
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a call makes at most `max_retries + 1` attempts.
    pub max_retries: u32,
    /// Fixed pause between two attempts.
    pub delay: Duration,
    /// Upper bound for a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            delay: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

/// Wraps a [`Classifier`] with a bounded retry loop and response validation.
///
/// Transport failures, timeouts and unparseable responses are retried. A response
/// that parses but fails [`validate`] is returned immediately as
/// [`ClassifyFailure::Invalid`]; asking again would not change the article.
pub struct RetryingClassifier {
    inner: Arc<dyn Classifier>,
    policy: RetryPolicy,
}

impl RetryingClassifier {
    pub fn new(inner: Arc<dyn Classifier>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn classify(&self, text: &str) -> Result<Classification, ClassifyFailure> {
        let attempts = self.policy.attempts();
        let mut backoff = Constant::new(self.policy.delay);
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=attempts {
            let outcome = tokio::time::timeout(self.policy.attempt_timeout, self.inner.classify(text)).await;

            match outcome {
                Ok(Ok(value)) => {
                    debug!("{} answered on attempt {}", self.inner.classifier_name(), attempt);
                    return validate(&value).map_err(ClassifyFailure::from);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "attempt timed out after {}s",
                        self.policy.attempt_timeout.as_secs()
                    )
                }
            }

            if attempt < attempts {
                if let Some(delay) = backoff.next_backoff() {
                    warn!(
                        "Classifier attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, last_error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        warn!("Classifier gave up after {} attempts: {}", attempts, last_error);
        Err(ClassifyFailure::Exhausted {
            attempts,
            last_error,
        })
    }
}
