mod common;

use async_trait::async_trait;
use common::{init_tracing, FlakyClassifier, ScriptedClassifier};
use httpmock::{Method::POST, MockServer};
use sentiment_service::classifier::validate;
use sentiment_service::llm_adapter::parse_json_answer;
use sentiment_service::types::Result;
use sentiment_service::{
    Classifier, ClassifyFailure, GeminiClassifier, GeminiConfig, KeywordClassifier, RetryPolicy,
    RetryingClassifier, ValidationError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        delay: Duration::from_secs(5),
        attempt_timeout: Duration::from_secs(30),
    }
}

/// Never answers within any reasonable deadline.
struct StalledClassifier {
    calls: AtomicU32,
}

#[async_trait]
impl Classifier for StalledClassifier {
    fn classifier_name(&self) -> String {
        "stalled".to_string()
    }

    async fn classify(&self, _text: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(json!({ "symbol": "BTCUSDT", "sentiment": 0.1, "reason": "late" }))
    }
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_classifier_is_called_retries_plus_one_times() {
    init_tracing();

    let inner = Arc::new(FlakyClassifier::always_failing());
    let retrying = RetryingClassifier::new(inner.clone(), policy(4));

    let started = tokio::time::Instant::now();
    let result = retrying.classify("anything").await;

    assert_eq!(inner.calls(), 5);
    match result {
        Err(ClassifyFailure::Exhausted { attempts, last_error }) => {
            assert_eq!(attempts, 5);
            assert!(last_error.contains("rate limited"), "last error: {}", last_error);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
    // Four pauses between five attempts, none after the last.
    assert_eq!(started.elapsed(), Duration::from_secs(20));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    init_tracing();

    let inner = Arc::new(FlakyClassifier::new(
        2,
        json!({ "symbol": "ETHUSDT", "sentiment": -0.25, "reason": "outflows" }),
    ));
    let retrying = RetryingClassifier::new(inner.clone(), policy(4));

    let classification = retrying.classify("ether outflows").await.expect("third attempt succeeds");
    info!("Classification: {:?}", classification);

    assert_eq!(inner.calls(), 3);
    assert_eq!(classification.symbol, "ETHUSDT");
    assert_eq!(classification.sentiment, -0.25);
    assert_eq!(classification.reason, "outflows");
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_means_single_attempt() {
    let inner = Arc::new(FlakyClassifier::always_failing());
    let retrying = RetryingClassifier::new(inner.clone(), policy(0));

    assert!(retrying.classify("x").await.is_err());
    assert_eq!(inner.calls(), 1);
}

#[test]
fn test_attempt_count_saturates() {
    assert_eq!(policy(4).attempts(), 5);
    assert_eq!(policy(u32::MAX).attempts(), u32::MAX);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_counts_as_failure() {
    init_tracing();

    let inner = Arc::new(StalledClassifier {
        calls: AtomicU32::new(0),
    });
    let retrying = RetryingClassifier::new(inner.clone(), policy(2));

    let result = retrying.classify("x").await;
    assert!(matches!(result, Err(ClassifyFailure::Exhausted { attempts: 3, .. })));
    assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invalid_response_is_not_retried() {
    let inner = Arc::new(ScriptedClassifier::new(
        json!({ "symbol": "BTCUSDT", "sentiment": 2.0, "reason": "to the moon" }),
    ));
    let retrying = RetryingClassifier::new(inner.clone(), policy(4));

    let result = retrying.classify("x").await;
    assert_eq!(
        result,
        Err(ClassifyFailure::Invalid(ValidationError::OutOfRange(2.0)))
    );
    assert_eq!(inner.calls(), 1);
}

#[test]
fn test_validate_accepts_bounds_and_sentinel() {
    for sentiment in [-1.0, 0.0, 1.0] {
        let value = json!({ "symbol": "BTCUSDT", "sentiment": sentiment, "reason": "ok" });
        assert_eq!(validate(&value).map(|c| c.sentiment), Ok(sentiment));
    }

    let none = validate(&json!({ "symbol": "None", "sentiment": 0, "reason": "No relevant" }))
        .expect("sentinel is valid");
    assert_eq!(none.symbol, "None");
    assert_eq!(none.sentiment, 0.0);
}

#[test]
fn test_validate_rejections() {
    let cases = vec![
        (json!("BTCUSDT"), ValidationError::NotAnObject),
        (json!({ "sentiment": 0.1, "reason": "r" }), ValidationError::MissingField("symbol")),
        (json!({ "symbol": "BTCUSDT", "reason": "r" }), ValidationError::MissingField("sentiment")),
        (json!({ "symbol": "BTCUSDT", "sentiment": 0.1 }), ValidationError::MissingField("reason")),
        (
            json!({ "symbol": 7, "sentiment": 0.1, "reason": "r" }),
            ValidationError::NotAString("symbol"),
        ),
        (
            json!({ "symbol": "BTCUSDT", "sentiment": "high", "reason": "r" }),
            ValidationError::NotNumeric("\"high\"".to_string()),
        ),
        (
            json!({ "symbol": "BTCUSDT", "sentiment": -1.5, "reason": "r" }),
            ValidationError::OutOfRange(-1.5),
        ),
        (
            json!({ "symbol": "TSLA", "sentiment": 0.2, "reason": "r" }),
            ValidationError::UnknownSymbol("TSLA".to_string()),
        ),
    ];

    for (value, expected) in cases {
        assert_eq!(validate(&value), Err(expected), "value: {}", value);
    }
}

#[test]
fn test_parse_json_answer_strips_code_fences() {
    let plain = parse_json_answer(r#"{"symbol":"BTCUSDT","sentiment":0.5,"reason":"r"}"#).expect("plain JSON");
    let fenced = parse_json_answer("```json\n{\"symbol\":\"BTCUSDT\",\"sentiment\":0.5,\"reason\":\"r\"}\n```")
        .expect("fenced JSON");
    assert_eq!(plain, fenced);

    assert!(parse_json_answer("I think bitcoin will go up").is_err());
}

fn gemini(server: &MockServer) -> GeminiClassifier {
    let config = GeminiConfig {
        model: "test-model".to_string(),
        endpoint: server.base_url(),
        ..GeminiConfig::new("test-key")
    };
    GeminiClassifier::new(config).expect("client builds")
}

fn gemini_body(text: &str) -> Value {
    json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ], "role": "model" } }
        ]
    })
}

#[tokio::test]
async fn test_gemini_returns_parsed_answer() {
    init_tracing();
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/test-model:generateContent")
            .header("x-goog-api-key", "test-key");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(gemini_body(
                "```json\n{\"symbol\": \"BTCUSDT\", \"sentiment\": 0.9, \"reason\": \"ETF approval\"}\n```",
            ));
    });

    let answer = gemini(&server)
        .classify("Title: Bitcoin ETF approved\n\nContent: ...")
        .await
        .expect("classification");

    mock.assert();
    assert_eq!(answer["symbol"], "BTCUSDT");
    assert_eq!(answer["sentiment"], 0.9);
}

#[tokio::test]
async fn test_gemini_rate_limit_is_retried_then_reported() {
    init_tracing();
    let server = MockServer::start();

    let mock = server.mock(|when, then| {
        when.method(POST).path("/v1beta/models/test-model:generateContent");
        then.status(429).body("quota exceeded");
    });

    let retrying = RetryingClassifier::new(
        Arc::new(gemini(&server)),
        RetryPolicy {
            max_retries: 1,
            delay: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(3600),
        },
    );

    let result = retrying.classify("anything").await;
    mock.assert_hits(2);
    match result {
        Err(ClassifyFailure::Exhausted { last_error, .. }) => assert!(last_error.contains("429")),
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gemini_errors_do_not_expose_api_key() {
    init_tracing();
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).header("x-goog-api-key", "test-key");
        then.status(500).body("backend unavailable");
    });

    let server_error = gemini(&server).classify("x").await.expect_err("HTTP 500");
    mock.assert();
    assert!(!server_error.to_string().contains("test-key"), "{}", server_error);

    // Nothing listens on port 1, so the request fails before any response.
    let unreachable = GeminiClassifier::new(GeminiConfig {
        endpoint: "http://127.0.0.1:1".to_string(),
        ..GeminiConfig::new("SECRET-KEY-123")
    })
    .expect("client builds");

    let retrying = RetryingClassifier::new(
        Arc::new(unreachable),
        RetryPolicy {
            max_retries: 0,
            delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(10),
        },
    );
    match retrying.classify("x").await {
        Err(ClassifyFailure::Exhausted { last_error, .. }) => {
            info!("Transport failure: {}", last_error);
            assert!(!last_error.contains("SECRET-KEY-123"), "{}", last_error);
        }
        other => panic!("expected exhaustion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_gemini_empty_candidates_is_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(200).json_body(json!({ "candidates": [] }));
    });

    assert!(gemini(&server).classify("x").await.is_err());
}

#[tokio::test]
async fn test_keyword_classifier_scores_keywords() -> Result<()> {
    let classifier = KeywordClassifier::new();

    let bullish = classifier
        .classify("Bitcoin rallies as ETF inflows surge; BTC jumps")
        .await?;
    assert_eq!(bullish["symbol"], "BTCUSDT");
    assert_eq!(bullish["sentiment"], 1.0);
    assert!(validate(&bullish).is_ok());

    let mixed = classifier
        .classify("Ethereum gains early, then falls after hack")
        .await?;
    assert_eq!(mixed["symbol"], "ETHUSDT");
    let sentiment = mixed["sentiment"].as_f64().unwrap_or_default();
    assert!((sentiment - (-1.0 / 3.0)).abs() < 1e-9, "sentiment {}", sentiment);

    let irrelevant = classifier.classify("Quarterly earnings at a car maker").await?;
    assert_eq!(irrelevant["symbol"], "None");
    assert_eq!(irrelevant["sentiment"], 0.0);
    Ok(())
}
