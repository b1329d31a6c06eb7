//! Clients for the external ML services.
//!
//! This crate provides:
//! - The speech-to-text client (`/transcribe`)
//! - MCQ generators: the MCQ service, Gemini, and an offline mock
//! - Prompt building and tolerant parsing of generated payloads

pub mod config;
pub mod error;
pub mod gemini;
pub mod generation;
pub mod mock;
pub mod parse;
pub mod prompt;
pub mod retry;
pub mod transcription;

use std::sync::Arc;

pub use config::{GeminiConfig, GenerationBackend, MlClientConfig};
pub use error::{MlError, MlResult};
pub use gemini::GeminiMcqClient;
pub use generation::{McqGenerator, McqServiceClient};
pub use mock::MockMcqGenerator;
pub use parse::{parse_mcq_text, parse_mcq_value};
pub use prompt::build_mcq_prompt;
pub use transcription::{MediaSource, Transcriber, TranscriptionClient};

/// Build the generator selected by `config.backend`.
pub fn generator_from_config(config: &MlClientConfig) -> MlResult<Arc<dyn McqGenerator>> {
    Ok(match config.backend {
        GenerationBackend::Service => Arc::new(McqServiceClient::new(config)?),
        GenerationBackend::Gemini => Arc::new(GeminiMcqClient::new(config)?),
        GenerationBackend::Mock => Arc::new(MockMcqGenerator),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generator_selection() {
        let mut config = MlClientConfig::default();
        assert_eq!(generator_from_config(&config).unwrap().name(), "service");

        config.backend = GenerationBackend::Mock;
        assert_eq!(generator_from_config(&config).unwrap().name(), "mock");

        config.backend = GenerationBackend::Gemini;
        assert!(generator_from_config(&config).is_err());
    }
}
