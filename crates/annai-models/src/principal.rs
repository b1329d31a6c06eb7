//! Authenticated principal.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The caller identity established by token verification.
///
/// Passed explicitly from the HTTP layer into the upload pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Principal {
    /// User ID from the identity provider
    pub uid: String,
    /// Email (if the token carried one)
    pub email: Option<String>,
}

impl Principal {
    pub fn new(uid: impl Into<String>, email: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            email,
        }
    }
}
