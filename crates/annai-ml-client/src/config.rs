//! Configuration for the transcription and generation clients.

use std::time::Duration;

use crate::error::{MlError, MlResult};

/// Which service produces MCQs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationBackend {
    /// The MCQ service's `/generate-mcq` endpoint.
    #[default]
    Service,
    /// Gemini `generateContent`.
    Gemini,
    /// Canned questions, no network.
    Mock,
}

impl std::str::FromStr for GenerationBackend {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "service" => Ok(Self::Service),
            "gemini" => Ok(Self::Gemini),
            "mock" => Ok(Self::Mock),
            other => Err(MlError::Config(format!(
                "unknown MCQ_BACKEND '{}', expected service, gemini or mock",
                other
            ))),
        }
    }
}

/// Gemini settings.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    /// Tried in order until one answers.
    pub models: Vec<String>,
    pub base_url: String,
}

impl GeminiConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn default_models() -> Vec<String> {
        vec![
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-flash-lite".to_string(),
            "gemini-2.5-pro".to_string(),
        ]
    }

    fn from_env() -> MlResult<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MlError::Config("GEMINI_API_KEY must be set when MCQ_BACKEND=gemini".into()))?;

        let models = std::env::var("GEMINI_MODELS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
            .filter(|m| !m.is_empty())
            .unwrap_or_else(Self::default_models);

        Ok(Self {
            api_key,
            models,
            base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Configuration for ML clients.
#[derive(Debug, Clone)]
pub struct MlClientConfig {
    /// Base URL of the speech-to-text service
    pub transcription_url: String,
    pub transcription_timeout: Duration,
    pub transcription_max_retries: u32,
    /// Base URL of the MCQ service
    pub mcq_service_url: String,
    pub mcq_timeout: Duration,
    pub mcq_max_retries: u32,
    pub backend: GenerationBackend,
    /// Present when `backend` is Gemini
    pub gemini: Option<GeminiConfig>,
}

impl Default for MlClientConfig {
    fn default() -> Self {
        Self {
            transcription_url: "http://localhost:8000".to_string(),
            transcription_timeout: Duration::from_secs(600),
            transcription_max_retries: 0,
            mcq_service_url: "http://localhost:8000".to_string(),
            mcq_timeout: Duration::from_secs(180),
            mcq_max_retries: 1,
            backend: GenerationBackend::Service,
            gemini: None,
        }
    }
}

impl MlClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> MlResult<Self> {
        let defaults = Self::default();
        let backend: GenerationBackend = std::env::var("MCQ_BACKEND")
            .unwrap_or_default()
            .parse()?;

        let gemini = match backend {
            GenerationBackend::Gemini => Some(GeminiConfig::from_env()?),
            _ => None,
        };

        Ok(Self {
            transcription_url: std::env::var("TRANSCRIPTION_SERVICE_URL")
                .unwrap_or(defaults.transcription_url),
            transcription_timeout: env_secs("TRANSCRIPTION_TIMEOUT_SECS")
                .unwrap_or(defaults.transcription_timeout),
            transcription_max_retries: std::env::var("TRANSCRIPTION_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transcription_max_retries),
            mcq_service_url: std::env::var("MCQ_SERVICE_URL").unwrap_or(defaults.mcq_service_url),
            mcq_timeout: env_secs("MCQ_TIMEOUT_SECS").unwrap_or(defaults.mcq_timeout),
            mcq_max_retries: std::env::var("MCQ_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.mcq_max_retries),
            backend,
            gemini,
        })
    }
}

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|secs: &u64| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_config_defaults() {
        let config = MlClientConfig::default();
        assert_eq!(config.transcription_timeout, Duration::from_secs(600));
        assert_eq!(config.transcription_max_retries, 0);
        assert_eq!(config.mcq_timeout, Duration::from_secs(180));
        assert_eq!(config.mcq_max_retries, 1);
        assert_eq!(config.backend, GenerationBackend::Service);
    }

    #[test]
    fn test_backend_parse() {
        assert_eq!("Gemini".parse::<GenerationBackend>().unwrap(), GenerationBackend::Gemini);
        assert_eq!("".parse::<GenerationBackend>().unwrap(), GenerationBackend::Service);
        assert!("openai".parse::<GenerationBackend>().is_err());
    }

    #[test]
    #[serial]
    fn test_gemini_requires_key() {
        std::env::set_var("MCQ_BACKEND", "gemini");
        std::env::remove_var("GEMINI_API_KEY");
        assert!(matches!(MlClientConfig::from_env(), Err(MlError::Config(_))));

        std::env::set_var("GEMINI_API_KEY", "k");
        std::env::set_var("GEMINI_MODELS", "m1, m2");
        let config = MlClientConfig::from_env().unwrap();
        assert_eq!(config.gemini.unwrap().models, vec!["m1", "m2"]);

        std::env::remove_var("MCQ_BACKEND");
        std::env::remove_var("GEMINI_API_KEY");
        std::env::remove_var("GEMINI_MODELS");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("TRANSCRIPTION_SERVICE_URL", "http://whisper:9000");
        std::env::set_var("MCQ_TIMEOUT_SECS", "30");
        let config = MlClientConfig::from_env().unwrap();
        assert_eq!(config.transcription_url, "http://whisper:9000");
        assert_eq!(config.mcq_timeout, Duration::from_secs(30));
        std::env::remove_var("TRANSCRIPTION_SERVICE_URL");
        std::env::remove_var("MCQ_TIMEOUT_SECS");
    }
}
