use crate::traits::Classifier;
use crate::types::{Result, ServiceError, NONE_SYMBOL, SYMBOL_ALLOW_LIST};
use crate::utils::text::smart_truncate;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    /// Article text beyond this many characters is cut before prompting.
    pub max_input_chars: usize,
    pub request_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: "gemini-2.0-flash-exp".to_string(),
            endpoint: "https://generativelanguage.googleapis.com".to_string(),
            max_input_chars: 12_000,
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Classifier backed by the Gemini `generateContent` API in JSON mode.
pub struct GeminiClassifier {
    client: Client,
    config: GeminiConfig,
}

impl GeminiClassifier {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    fn build_prompt(&self, article: &str) -> String {
        let symbols = SYMBOL_ALLOW_LIST
            .iter()
            .map(|s| format!("\"{}\"", s))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "Read the following financial news article and identify the single trading pair it is about, \
             how the article is likely to move that pair, and why.\n\
             Respond with JSON only: {{\"symbol\": \"<trading pair>\", \"sentiment\": <number from -1 (bearish) to 1 (bullish)>, \"reason\": \"<one sentence>\"}}\n\
             The trading pair must be one of: {symbols}.\n\
             If the article is not about any of them, respond with {{\"symbol\": \"{none}\", \"sentiment\": 0.0, \"reason\": \"No relevant\"}}.\n\n\
             Article:\n{article}",
            symbols = symbols,
            none = NONE_SYMBOL,
            article = smart_truncate(article, self.config.max_input_chars),
        )
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    fn classifier_name(&self) -> String {
        format!("Gemini ({})", self.config.model)
    }

    async fn classify(&self, text: &str) -> Result<Value> {
        let prompt = self.build_prompt(text);
        let request = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: &prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.0,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 1024,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.url())
            // In a header so transport errors, which carry the URL, never expose the key.
            .header("x-goog-api-key", self.config.api_key.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Classifier(format!(
                "HTTP {}: {}",
                status,
                smart_truncate(&body, 200)
            )));
        }

        let body: GenerateContentResponse = response.json().await?;
        let answer = body
            .candidates
            .into_iter()
            .filter_map(|candidate| candidate.content)
            .flat_map(|content| content.parts)
            .find_map(|part| part.text)
            .ok_or_else(|| ServiceError::Classifier("response has no text candidate".to_string()))?;

        debug!("Gemini answered: {}", smart_truncate(&answer, 200));
        parse_json_answer(&answer)
    }
}

/// Parse a model answer as JSON, tolerating a surrounding Markdown code fence.
pub fn parse_json_answer(answer: &str) -> Result<Value> {
    let trimmed = answer.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    Ok(serde_json::from_str(unfenced.trim())?)
}

/// Offline classifier that tags articles by coin names and scores them by
/// bullish/bearish keyword counts. Deterministic, for development and demos.
#[derive(Debug, Default)]
pub struct KeywordClassifier;

const SYMBOL_KEYWORDS: &[(&str, &str)] = &[
    ("bitcoin", "BTCUSDT"),
    ("btc", "BTCUSDT"),
    ("ethereum", "ETHUSDT"),
    ("ether", "ETHUSDT"),
    ("eth", "ETHUSDT"),
    ("bnb", "BNBUSDT"),
    ("litecoin", "LTCUSDT"),
    ("cardano", "ADAUSDT"),
    ("xrp", "XRPUSDT"),
    ("ripple", "XRPUSDT"),
    ("stellar", "XLMUSDT"),
    ("tron", "TRXUSDT"),
    ("chainlink", "LINKUSDT"),
    ("dogecoin", "DOGEUSDT"),
    ("doge", "DOGEUSDT"),
    ("cosmos", "ATOMUSDT"),
    ("algorand", "ALGOUSDT"),
    ("hedera", "HBARUSDT"),
    ("tezos", "XTZUSDT"),
    ("zcash", "ZECUSDT"),
];

const BULLISH_KEYWORDS: &[&str] = &[
    "surge", "surges", "rally", "rallies", "soar", "soars", "bullish", "gain", "gains", "rise",
    "rises", "jump", "jumps", "record", "adoption", "approval", "approves", "inflows", "upgrade",
];

const BEARISH_KEYWORDS: &[&str] = &[
    "crash", "crashes", "fall", "falls", "drop", "drops", "bearish", "loss", "losses", "plunge",
    "plunges", "fear", "selloff", "dump", "reject", "rejects", "ban", "hack", "outflows", "lawsuit",
];

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn detect_symbol(words: &[String]) -> Option<&'static str> {
        let mut mentions: HashMap<&'static str, usize> = HashMap::new();
        for word in words {
            let upper = word.to_uppercase();
            let ticker = SYMBOL_ALLOW_LIST.iter().copied().find(|s| *s == upper.as_str());
            let named = SYMBOL_KEYWORDS
                .iter()
                .find(|(keyword, _)| *keyword == word.as_str())
                .map(|(_, symbol)| *symbol);
            if let Some(symbol) = ticker.or(named) {
                *mentions.entry(symbol).or_default() += 1;
            }
        }

        // Highest count wins; ties go to the earlier allow-list entry.
        mentions.into_iter().max_by(|a, b| {
            a.1.cmp(&b.1).then_with(|| {
                let pos = |s: &str| SYMBOL_ALLOW_LIST.iter().position(|x| *x == s);
                pos(b.0).cmp(&pos(a.0))
            })
        })
        .map(|(symbol, _)| symbol)
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    fn classifier_name(&self) -> String {
        "Keyword classifier".to_string()
    }

    async fn classify(&self, text: &str) -> Result<Value> {
        let words: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect();

        let Some(symbol) = Self::detect_symbol(&words) else {
            return Ok(json!({ "symbol": NONE_SYMBOL, "sentiment": 0.0, "reason": "No relevant" }));
        };

        let bullish = words.iter().filter(|w| BULLISH_KEYWORDS.contains(&w.as_str())).count();
        let bearish = words.iter().filter(|w| BEARISH_KEYWORDS.contains(&w.as_str())).count();
        let total = bullish + bearish;
        let sentiment = if total == 0 {
            0.0
        } else {
            (bullish as f64 - bearish as f64) / total as f64
        };

        Ok(json!({
            "symbol": symbol,
            "sentiment": sentiment,
            "reason": format!("{} bullish and {} bearish keywords", bullish, bearish),
        }))
    }
}
