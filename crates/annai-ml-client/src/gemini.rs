//! MCQ generation through Gemini `generateContent`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use annai_models::McqDraft;

use crate::config::{GeminiConfig, MlClientConfig};
use crate::error::{MlError, MlResult};
use crate::generation::McqGenerator;
use crate::parse::parse_mcq_text;
use crate::prompt::build_mcq_prompt;
use crate::retry::with_retry;

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini-backed generator with model fallback.
pub struct GeminiMcqClient {
    client: Client,
    config: GeminiConfig,
    timeout_secs: u64,
    max_retries: u32,
}

impl GeminiMcqClient {
    pub fn new(config: &MlClientConfig) -> MlResult<Self> {
        let gemini = config
            .gemini
            .clone()
            .ok_or_else(|| MlError::Config("Gemini backend selected without Gemini settings".into()))?;

        let client = Client::builder()
            .timeout(config.mcq_timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self {
            client,
            config: gemini,
            timeout_secs: config.mcq_timeout.as_secs(),
            max_retries: config.mcq_max_retries,
        })
    }

    async fn call_model(&self, model: &str, request: &GeminiRequest) -> MlResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.config.base_url.trim_end_matches('/'),
            model,
            self.config.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| MlError::from_send(e.without_url(), self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::from_status(status, &body));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| MlError::invalid_response(format!("Gemini response: {}", e.without_url())))?;

        parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or_else(|| MlError::invalid_response("no content in Gemini response"))
    }
}

#[async_trait]
impl McqGenerator for GeminiMcqClient {
    async fn generate(&self, segment: &str) -> MlResult<Vec<McqDraft>> {
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_mcq_prompt(segment),
                }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
            },
        };

        let mut last_error = None;

        for model in &self.config.models {
            let result = with_retry(self.max_retries, "gemini_generate", || {
                self.call_model(model, &request)
            })
            .await
            .and_then(|text| parse_mcq_text(&text));

            match result {
                Ok(drafts) => {
                    info!(model = %model, count = drafts.len(), "Generated MCQs with Gemini");
                    return Ok(drafts);
                }
                Err(e) => {
                    warn!(model = %model, "Gemini model failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| MlError::Config("no Gemini models configured".into())))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
