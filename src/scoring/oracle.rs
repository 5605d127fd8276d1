//! Scoring oracle abstraction + concrete oracles.
//!
//! An oracle receives the ordered batch of texts and returns its raw free-text
//! answer. Turning that answer into numbers is the job of `scoring::parse`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OracleConfig;
use crate::error::ScoringError;

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";

/// External scorer: texts in, raw `<index>: <score>` lines out.
#[async_trait]
pub trait ScoreOracle: Send + Sync {
    async fn complete(&self, texts: &[String]) -> Result<String, ScoringError>;
    /// Oracle name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn ScoreOracle>;

/// Factory: build an oracle according to config and environment variables.
///
/// * If `ORACLE_TEST_MODE=mock`, returns the deterministic mock oracle.
/// * Else if `config.enabled==false` or the key is empty, returns the disabled oracle.
/// * Else builds the OpenAI oracle.
pub fn build_oracle(config: &OracleConfig) -> DynOracle {
    if std::env::var("ORACLE_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(MockOracle::hashed());
    }

    if !config.enabled || config.api_key.trim().is_empty() {
        tracing::warn!(target: "scoring", "scoring oracle disabled; batches will score neutral");
        return Arc::new(DisabledOracle);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiOracle::new(config) {
            Ok(o) => Arc::new(o),
            Err(e) => {
                tracing::error!(target: "scoring", error = %e, "failed to build http client for oracle");
                Arc::new(DisabledOracle)
            }
        },
        other => {
            tracing::warn!(target: "scoring", provider = other, "unsupported oracle provider");
            Arc::new(DisabledOracle)
        }
    }
}

/// Prompt asking for one `<index>: <score>` line per headline.
pub fn build_prompt(texts: &[String]) -> String {
    let mut lines = vec![
        "Rate the sentiment of each of the following German news headlines.".to_string(),
        "For each headline return exactly one floating point number between -1.0 (extremely negative) and +1.0 (extremely positive); 0.0 is neutral.".to_string(),
        "Use the full range from -1.0 to +1.0 and avoid values near 0 unless a headline is truly neutral.".to_string(),
        "Guidance: -1.0 to -0.7 disasters, wars; -0.7 to -0.4 serious problems, scandals; -0.4 to -0.1 mildly negative news;".to_string(),
        "0.1 to 0.4 mildly positive news; 0.4 to 0.7 good news; 0.7 to 1.0 outstanding successes, scientific breakthroughs.".to_string(),
        "Positive news is rarer, so give clearly positive headlines a slightly stronger score.".to_string(),
        "Answer as a numbered list where each line holds only the headline number, a colon and the score (e.g. \"1: -0.5\"). No other text, no explanations, no header or footer. Start directly with \"1:\".".to_string(),
        String::new(),
        "Headlines:".to_string(),
    ];
    for (i, t) in texts.iter().enumerate() {
        lines.push(format!("{}: {}", i + 1, t));
    }
    lines.push("\nScores:".to_string());
    lines.join("\n")
}

/// OpenAI oracle (Chat Completions API).
pub struct OpenAiOracle {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiOracle {
    pub fn new(config: &OracleConfig) -> Result<Self, ScoringError> {
        let http = reqwest::Client::builder()
            .user_agent("moodlight-sentiment/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl ScoreOracle for OpenAiOracle {
    async fn complete(&self, texts: &[String]) -> Result<String, ScoringError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let prompt = build_prompt(texts);
        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: &prompt,
            }],
            temperature: self.temperature,
            max_tokens: (texts.len() as u32).saturating_mul(15),
        };

        tracing::info!(target: "scoring", count = texts.len(), model = %self.model, "sending batch to oracle");
        let resp = self
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScoringError::Status(status.as_u16()));
        }
        let body: Resp = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(ScoringError::EmptyResponse);
        }
        tracing::debug!(target: "scoring", raw = %content, "oracle response");
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Always unavailable; used when no oracle is configured.
pub struct DisabledOracle;

#[async_trait]
impl ScoreOracle for DisabledOracle {
    async fn complete(&self, _texts: &[String]) -> Result<String, ScoringError> {
        Err(ScoringError::Unavailable)
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic oracle for tests/local runs.
#[derive(Debug, Clone)]
pub struct MockOracle {
    fixed: Option<Vec<f64>>,
}

impl MockOracle {
    /// Answers with `scores[i]` for item `i`; items past the end get no line.
    pub fn fixed(scores: Vec<f64>) -> Self {
        Self {
            fixed: Some(scores),
        }
    }

    /// Derives a stable score in `[-1, 1]` from each text's hash.
    pub fn hashed() -> Self {
        Self { fixed: None }
    }

    fn score_for(&self, i: usize, text: &str) -> Option<f64> {
        match &self.fixed {
            Some(v) => v.get(i).copied(),
            None => {
                let mut h = DefaultHasher::new();
                text.hash(&mut h);
                let bucket = (h.finish() % 201) as f64;
                Some((bucket - 100.0) / 100.0)
            }
        }
    }
}

#[async_trait]
impl ScoreOracle for MockOracle {
    async fn complete(&self, texts: &[String]) -> Result<String, ScoringError> {
        let lines: Vec<String> = texts
            .iter()
            .enumerate()
            .filter_map(|(i, t)| self.score_for(i, t).map(|s| format!("{}: {}", i + 1, s)))
            .collect();
        Ok(lines.join("\n"))
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}
