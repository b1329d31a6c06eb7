//! Request handlers.

pub mod health;
pub mod mcqs;
pub mod upload;
pub mod videos;

pub use health::*;
pub use mcqs::*;
pub use upload::*;
pub use videos::*;

use crate::error::ApiError;

/// Fallback for unmatched routes.
pub async fn route_not_found(method: axum::http::Method, uri: axum::http::Uri) -> ApiError {
    tracing::warn!(method = %method, uri = %uri, "Route not found");
    ApiError::not_found("Route not found")
}
