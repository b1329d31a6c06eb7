//! Bearer token authentication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use annai_models::Principal;

use crate::config::AuthMode;
use crate::error::ApiError;
use crate::state::AppState;

/// Google JWKS URL for Firebase Auth.
pub const GOOGLE_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Firebase token issuer prefix.
const FIREBASE_ISSUER_PREFIX: &str = "https://securetoken.google.com/";

/// JWKS cache TTL.
const JWKS_CACHE_TTL: Duration = Duration::from_secs(3600); // 1 hour

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),

    #[error("auth configuration: {0}")]
    Config(String),
}

/// Turns a bearer token into the caller's identity.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Build the verifier selected by `mode`.
pub fn verifier_for(mode: AuthMode) -> Result<Arc<dyn TokenVerifier>, AuthError> {
    Ok(match mode {
        AuthMode::Firebase => Arc::new(FirebaseVerifier::from_env()?),
        AuthMode::InsecureDev => {
            warn!("AUTH_MODE=insecure-dev: bearer tokens are not verified");
            Arc::new(DevTokenVerifier)
        }
    })
}

/// Decoded Firebase ID token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseClaims {
    /// User ID
    pub sub: String,
    pub email: Option<String>,
    pub iss: String,
    /// Firebase project ID
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl From<FirebaseClaims> for Principal {
    fn from(claims: FirebaseClaims) -> Self {
        Principal::new(claims.sub, claims.email)
    }
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Clone, Deserialize)]
struct JwkKey {
    kid: String,
    n: String,
    e: String,
}

/// Verifies Firebase ID tokens (RS256) against Google's published keys.
pub struct FirebaseVerifier {
    http: Client,
    jwks_url: String,
    project_id: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
    last_refresh: RwLock<Option<Instant>>,
}

impl FirebaseVerifier {
    pub fn new(project_id: impl Into<String>) -> Result<Self, AuthError> {
        Self::with_jwks_url(project_id, GOOGLE_JWKS_URL)
    }

    pub fn with_jwks_url(
        project_id: impl Into<String>,
        jwks_url: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AuthError::Config(e.to_string()))?;

        Ok(Self {
            http,
            jwks_url: jwks_url.into(),
            project_id: project_id.into(),
            keys: RwLock::new(HashMap::new()),
            last_refresh: RwLock::new(None),
        })
    }

    /// Read `FIREBASE_PROJECT_ID` (or `GCP_PROJECT_ID`).
    pub fn from_env() -> Result<Self, AuthError> {
        let project_id = std::env::var("FIREBASE_PROJECT_ID")
            .or_else(|_| std::env::var("GCP_PROJECT_ID"))
            .map_err(|_| AuthError::Config("FIREBASE_PROJECT_ID or GCP_PROJECT_ID must be set".into()))?;
        Self::new(project_id)
    }

    async fn refresh_keys(&self) -> Result<(), AuthError> {
        debug!("Refreshing JWKS keys");

        let jwks: JwksResponse = self
            .http
            .get(&self.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            match DecodingKey::from_rsa_components(&jwk.n, &jwk.e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, "Skipping unusable JWKS key: {}", e),
            }
        }

        let key_count = keys.len();
        *self.keys.write().await = keys;
        *self.last_refresh.write().await = Some(Instant::now());

        debug!("Refreshed {} JWKS keys", key_count);
        Ok(())
    }

    async fn get_key(&self, kid: &str) -> Result<Option<DecodingKey>, AuthError> {
        let needs_refresh = match *self.last_refresh.read().await {
            Some(last) => last.elapsed() > JWKS_CACHE_TTL,
            None => true,
        };

        if needs_refresh {
            if let Err(e) = self.refresh_keys().await {
                // Stale keys are still better than none.
                if self.keys.read().await.is_empty() {
                    return Err(e);
                }
                warn!("Failed to refresh JWKS keys: {}", e);
            }
        }

        Ok(self.keys.read().await.get(kid).cloned())
    }
}

#[async_trait]
impl TokenVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let header = decode_header(token)
            .map_err(|e| AuthError::InvalidToken(format!("header: {}", e)))?;

        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing key id".into()))?;

        let key = self
            .get_key(&kid)
            .await?
            .ok_or_else(|| AuthError::InvalidToken(format!("unknown key id {}", kid)))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[format!("{}{}", FIREBASE_ISSUER_PREFIX, self.project_id)]);
        validation.set_audience(&[&self.project_id]);

        let claims = decode::<FirebaseClaims>(token, &key, &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?
            .claims;

        if claims.sub.is_empty() {
            return Err(AuthError::InvalidToken("empty subject".into()));
        }

        Ok(claims.into())
    }
}

/// Accepts any non-empty token and uses it as the uid. Local development only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevTokenVerifier;

#[async_trait]
impl TokenVerifier for DevTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AuthError> {
        let uid = token.trim();
        if uid.is_empty() {
            return Err(AuthError::InvalidToken("empty token".into()));
        }
        Ok(Principal::new(uid, None))
    }
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::unauthorized("No token provided"))?;

        match state.verifier.verify(bearer.token()).await {
            Ok(principal) => Ok(AuthUser(principal)),
            Err(AuthError::InvalidToken(reason)) => {
                warn!("Token rejected: {}", reason);
                Err(ApiError::forbidden("Invalid token"))
            }
            // Our side failed, not the caller's token
            Err(e) => Err(ApiError::internal(format!("token verification failed: {}", e))),
        }
    }
}
