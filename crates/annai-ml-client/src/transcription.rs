//! Speech-to-text service client.

use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::MlClientConfig;
use crate::error::{MlError, MlResult};
use crate::retry::with_retry;

/// Stored media the transcriber can read, once per attempt.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Name sent with the file part.
    fn filename(&self) -> &str;

    /// Total length in bytes.
    fn size(&self) -> u64;

    /// A fresh stream over the whole file.
    async fn open(&self) -> io::Result<BoxStream<'static, io::Result<Bytes>>>;
}

/// Turns uploaded media into transcript text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &dyn MediaSource) -> MlResult<String>;
}

/// Client for the `/transcribe` endpoint.
///
/// Streams the file as multipart field `file` and expects `{"text": "..."}`.
#[derive(Clone)]
pub struct TranscriptionClient {
    http: Client,
    base_url: String,
    timeout_secs: u64,
    max_retries: u32,
}

impl TranscriptionClient {
    pub fn new(config: &MlClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.transcription_timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self {
            http,
            base_url: config.transcription_url.trim_end_matches('/').to_string(),
            timeout_secs: config.transcription_timeout.as_secs(),
            max_retries: config.transcription_max_retries,
        })
    }

    async fn send_once(&self, url: &str, media: &dyn MediaSource) -> MlResult<String> {
        let chunks = media
            .open()
            .await
            .map_err(|e| MlError::Media(format!("{}: {}", media.filename(), e)))?;
        let part = Part::stream_with_length(Body::wrap_stream(chunks), media.size())
            .file_name(media.filename().to_string());
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(url)
            .multipart(form)
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

        extract_text(&body)
    }
}

#[async_trait]
impl Transcriber for TranscriptionClient {
    async fn transcribe(&self, media: &dyn MediaSource) -> MlResult<String> {
        let url = format!("{}/transcribe", self.base_url);
        let filename = media.filename();
        debug!(filename, bytes = media.size(), "Sending media for transcription");

        let text = with_retry(self.max_retries, "transcribe", || self.send_once(&url, media)).await?;

        info!(filename, chars = text.len(), "Transcription complete");
        Ok(text)
    }
}

fn extract_text(body: &str) -> MlResult<String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| MlError::invalid_response(format!("transcription body is not JSON: {}", e)))?;

    match value.get("text") {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(MlError::invalid_response("transcription `text` is not a string")),
        None => Err(MlError::invalid_response("transcription response has no `text`")),
    }
}
