//! Application state.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use annai_firestore::{
    FirestoreClient, FirestoreError, McqRepository, McqStore, MemoryStore, VideoRepository,
    VideoStore,
};
use annai_ml_client::{generator_from_config, McqGenerator, MlClientConfig, MlError, Transcriber, TranscriptionClient};
use annai_storage::{upload_store_from_env, StorageError, UploadStore};

use crate::auth::{verifier_for, AuthError, TokenVerifier};
use crate::config::{ApiConfig, ConfigError, PipelineConfig, StoreBackend};
use crate::services::UploadPipeline;

/// Failure while wiring up the application.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store: {0}")]
    Store(#[from] FirestoreError),

    #[error("upload storage: {0}")]
    Storage(#[from] StorageError),

    #[error("ml clients: {0}")]
    Ml(#[from] MlError),

    #[error("auth: {0}")]
    Auth(#[from] AuthError),
}

/// Shared application state.
///
/// Every collaborator is built once at startup and shared behind a trait
/// object, so tests can swap in fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: PipelineConfig,
    pub videos: Arc<dyn VideoStore>,
    pub mcqs: Arc<dyn McqStore>,
    pub uploads: Arc<dyn UploadStore>,
    pub transcriber: Arc<dyn Transcriber>,
    pub generator: Arc<dyn McqGenerator>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    /// Build every collaborator from environment variables.
    pub async fn from_env(config: ApiConfig) -> Result<Self, StartupError> {
        let pipeline = PipelineConfig::from_env()?;

        let (videos, mcqs): (Arc<dyn VideoStore>, Arc<dyn McqStore>) = match config.store_backend {
            StoreBackend::Firestore => {
                let client = FirestoreClient::from_env().await?;
                (
                    Arc::new(VideoRepository::new(client.clone())),
                    Arc::new(McqRepository::new(client)),
                )
            }
            StoreBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

        let uploads = upload_store_from_env().await?;

        let ml_config = MlClientConfig::from_env()?;
        let transcriber: Arc<dyn Transcriber> = Arc::new(TranscriptionClient::new(&ml_config)?);
        let generator = generator_from_config(&ml_config)?;

        let verifier = verifier_for(config.auth_mode)?;

        info!(
            store = ?config.store_backend,
            uploads = uploads.backend(),
            generator = generator.name(),
            segment_window = %pipeline.segment_window,
            concurrency = pipeline.generation_concurrency.get(),
            "Application state ready"
        );

        Ok(Self {
            config,
            pipeline,
            videos,
            mcqs,
            uploads,
            transcriber,
            generator,
            verifier,
        })
    }

    /// Pipeline wired to this state's collaborators.
    pub fn upload_pipeline(&self) -> UploadPipeline {
        UploadPipeline::new(
            Arc::clone(&self.videos),
            Arc::clone(&self.mcqs),
            Arc::clone(&self.uploads),
            Arc::clone(&self.transcriber),
            Arc::clone(&self.generator),
            self.pipeline,
        )
    }
}
