use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::{DEFAULT_GENERATION_MODEL, GENERATION_ENDPOINT, GENERATION_TIMEOUT};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("text generation is not configured")]
    Disabled,
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation service returned no text")]
    EmptyResponse,
}

/// External natural-language service used for translation and icebreakers.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, GenerationError>;
    async fn icebreaker(&self) -> Result<String, GenerationError>;
}

pub fn translation_prompt(text: &str) -> String {
    format!(
        "Translate to English: \"{text}\". If already English, return as is. Output only translated text."
    )
}

pub const ICEBREAKER_PROMPT: &str = "Generate one fun, short icebreaker question for two strangers in a random video chat. Output only the question.";

// ─── Gemini ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            endpoint: GENERATION_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate, trimmed.
    fn into_text(self) -> Option<String> {
        let text: String = self
            .candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        let trimmed = text.trim();
        match trimmed.is_empty() {
            true => None,
            false => Some(trimmed.to_string()),
        }
    }
}

pub struct GeminiGenerator {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiGenerator {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(GENERATION_TIMEOUT)
            .build()?;
        Ok(Self { client, config })
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!(
            "{}/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model
        );
        let body = GenerateRequest {
            contents: [Content {
                parts: [RequestPart { text: prompt }],
            }],
        };
        let response: GenerateResponse = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())?
            .json()
            .await?;
        let text = response.into_text().ok_or(GenerationError::EmptyResponse)?;
        tracing::debug!(model = %self.config.model, chars = text.len(), "generation complete");
        Ok(text)
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn translate(&self, text: &str) -> Result<String, GenerationError> {
        self.generate(&translation_prompt(text)).await
    }

    async fn icebreaker(&self) -> Result<String, GenerationError> {
        self.generate(ICEBREAKER_PROMPT).await
    }
}

/// Used when no API key is configured; every request fails with `Disabled`.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    async fn translate(&self, _text: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }

    async fn icebreaker(&self) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
