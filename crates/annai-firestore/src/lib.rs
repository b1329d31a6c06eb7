//! Persistence for videos and generated questions.
//!
//! This crate provides:
//! - The `VideoStore` / `McqStore` traits the API depends on
//! - Firestore REST repositories implementing them
//! - An in-memory implementation for local runs and tests
//! - Service account authentication via gcp_auth, retries and metrics

pub mod client;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod store;
pub mod token_cache;
pub mod types;


pub use client::{is_valid_document_id, FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use memory::MemoryStore;
pub use repos::{McqRepository, VideoRepository};
pub use store::{McqStore, UpdateOutcome, VideoStore};
pub use types::{Document, FromFirestoreValue, ToFirestoreValue, Value};
