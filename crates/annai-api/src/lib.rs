//! Axum HTTP API for lecture uploads and generated questions.
//!
//! This crate provides:
//! - The upload pipeline (store, transcribe, segment, generate, persist)
//! - Read and edit endpoints for transcripts and questions
//! - Firebase ID token verification
//! - Rate limiting, security headers and Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use auth::{AuthUser, DevTokenVerifier, FirebaseVerifier, TokenVerifier};
pub use config::{ApiConfig, AuthMode, MalformedPolicy, PipelineConfig, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{IncomingUpload, UploadPipeline, UploadSummary};
pub use state::{AppState, StartupError};
