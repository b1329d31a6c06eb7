//! MCQ generation through the MCQ service.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use annai_models::McqDraft;

use crate::config::MlClientConfig;
use crate::error::{MlError, MlResult};
use crate::parse::parse_mcq_text;
use crate::prompt::build_mcq_prompt;
use crate::retry::with_retry;

/// Produces question drafts for one transcript segment.
///
/// `Err` with [`MlError::is_malformed`] means the upstream answered with
/// nothing usable; any other error means the call itself failed.
#[async_trait]
pub trait McqGenerator: Send + Sync {
    async fn generate(&self, segment: &str) -> MlResult<Vec<McqDraft>>;

    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

/// Client for the `/generate-mcq` endpoint.
#[derive(Clone)]
pub struct McqServiceClient {
    http: Client,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl McqServiceClient {
    pub fn new(config: &MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.mcq_timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self {
            http,
            base_url: config.mcq_service_url.trim_end_matches('/').to_string(),
            timeout_secs: config.mcq_timeout.as_secs(),
            max_retries: config.mcq_max_retries,
        })
    }

    async fn send_once(&self, url: &str, prompt: &str) -> MlResult<String> {
        let response = self
            .http
            .post(url)
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| MlError::from_send(e, self.timeout_secs))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MlError::from_send(e, self.timeout_secs))?;

        if !status.is_success() {
            return Err(MlError::from_status(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl McqGenerator for McqServiceClient {
    async fn generate(&self, segment: &str) -> MlResult<Vec<McqDraft>> {
        let url = format!("{}/generate-mcq", self.base_url);
        let prompt = build_mcq_prompt(segment);
        debug!(words = segment.split_whitespace().count(), "Requesting MCQs");

        let body = with_retry(self.max_retries, "generate_mcq", || {
            self.send_once(&url, &prompt)
        })
        .await?;

        parse_mcq_text(&body)
    }

    fn name(&self) -> &'static str {
        "service"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn client_for(server: &MockServer, retries: u32) -> McqServiceClient {
        let config = MlClientConfig {
            mcq_service_url: server.uri(),
            mcq_timeout: Duration::from_secs(5),
            mcq_max_retries: retries,
            ..MlClientConfig::default()
        };
        McqServiceClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_posts_prompt_and_parses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-mcq"))
            .and(|req: &Request| {
                serde_json::from_slice::<serde_json::Value>(&req.body)
                    .ok()
                    .and_then(|v| v["prompt"].as_str().map(|p| p.contains("\"cells divide\"")))
                    .unwrap_or(false)
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "mcqs": [{"question": "What divides?", "options": ["cells", "rocks", "air", "light"], "answer": "cells"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let drafts = client_for(&server, 0).generate("cells divide").await.unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].answer, "cells");
    }

    #[tokio::test]
    async fn test_error_object_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"error": "ValueError: No JSON block found"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server, 1).generate("x").await.unwrap_err();
        assert!(err.is_malformed());
    }

    #[tokio::test]
    async fn test_server_error_retried_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server, 1).generate("x").await.unwrap_err();
        assert!(!err.is_malformed());
        assert!(matches!(err, MlError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let config = MlClientConfig {
            mcq_service_url: server.uri(),
            mcq_timeout: Duration::from_millis(200),
            mcq_max_retries: 0,
            ..MlClientConfig::default()
        };
        let err = McqServiceClient::new(&config)
            .unwrap()
            .generate("x")
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Timeout(_)));
    }
}
