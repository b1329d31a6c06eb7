//! Firestore REST API client.
//!
//! Thin wrapper over the v1 REST surface with:
//! - Cached service account tokens, refreshed once on ACCESS_TOKEN_EXPIRED
//! - Retry with backoff on 429/5xx and network failures
//! - A tracing span and request metrics per operation
//! - Emulator support via `FIRESTORE_EMULATOR_HOST`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info_span, Instrument};

use crate::error::{FirestoreError, FirestoreResult};
use crate::metrics::record_request;
use crate::retry::{with_retry, RetryConfig};
use crate::token_cache::{TokenCache, TokenSource};
use crate::types::{
    BatchWriteRequest, BatchWriteResponse, Document, RunQueryRequest, RunQueryResponse,
    StructuredQuery, Value, Write,
};

/// Maximum writes Firestore accepts in one batchWrite call.
pub const MAX_BATCH_WRITES: usize = 500;

const PRODUCTION_API_ROOT: &str = "https://firestore.googleapis.com";

/// Token the emulator accepts for admin access.
const EMULATOR_TOKEN: &str = "owner";

/// Longest document ID Firestore accepts, in bytes.
const MAX_DOCUMENT_ID_LEN: usize = 1500;

/// Whether `id` can be addressed as a single document ID.
///
/// Only `[A-Za-z0-9_-]` is accepted, which also rules out the reserved
/// `__name__` form and anything that would change the request path or query.
pub fn is_valid_document_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_DOCUMENT_ID_LEN
        && !(id.len() >= 4 && id.starts_with("__") && id.ends_with("__"))
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Firestore client configuration.
#[derive(Debug, Clone)]
pub struct FirestoreConfig {
    /// GCP project ID
    pub project_id: String,
    /// Database ID (usually "(default)")
    pub database_id: String,
    /// Request timeout
    pub timeout: Duration,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Retry configuration
    pub retry: RetryConfig,
    /// `host:port` of a local emulator, if any
    pub emulator_host: Option<String>,
}

impl FirestoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> FirestoreResult<Self> {
        let project_id = std::env::var("GCP_PROJECT_ID")
            .or_else(|_| std::env::var("FIREBASE_PROJECT_ID"))
            .map_err(|_| {
                FirestoreError::auth_error(
                    "GCP_PROJECT_ID or FIREBASE_PROJECT_ID must be set to access Firestore",
                )
            })?;

        if project_id.is_empty() {
            return Err(FirestoreError::auth_error(
                "GCP_PROJECT_ID or FIREBASE_PROJECT_ID cannot be empty",
            ));
        }

        let timeout_secs: u64 = std::env::var("FIRESTORE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let connect_timeout_secs: u64 = std::env::var("FIRESTORE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Ok(Self {
            project_id,
            database_id: std::env::var("FIRESTORE_DATABASE_ID")
                .unwrap_or_else(|_| "(default)".to_string()),
            timeout: Duration::from_secs(timeout_secs),
            connect_timeout: Duration::from_secs(connect_timeout_secs),
            retry: RetryConfig::from_env(),
            emulator_host: std::env::var("FIRESTORE_EMULATOR_HOST")
                .ok()
                .filter(|h| !h.is_empty()),
        })
    }

    /// Config for a project with default timeouts and retries.
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            database_id: "(default)".to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            emulator_host: None,
        }
    }
}

/// Firestore REST API client.
#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    config: FirestoreConfig,
    base_url: String,
    auth: TokenSource,
}

impl FirestoreClient {
    /// Create a new Firestore client.
    pub async fn new(config: FirestoreConfig) -> FirestoreResult<Self> {
        match config.emulator_host.clone() {
            Some(host) => {
                debug!(host = %host, "Using Firestore emulator");
                let root = format!("http://{}", host);
                Self::with_api_root(config, &root, TokenSource::Static(EMULATOR_TOKEN.to_string()))
            }
            None => {
                let provider = Self::create_auth_provider().await?;
                let auth = TokenSource::Provider(Arc::new(TokenCache::new(provider)));
                Self::with_api_root(config, PRODUCTION_API_ROOT, auth)
            }
        }
    }

    /// Create a client against an explicit API root (scheme + host).
    pub fn with_api_root(
        config: FirestoreConfig,
        api_root: &str,
        auth: TokenSource,
    ) -> FirestoreResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("annai-firestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FirestoreError::Network)?;

        let base_url = format!(
            "{}/v1/projects/{}/databases/{}/documents",
            api_root.trim_end_matches('/'),
            config.project_id,
            config.database_id
        );

        Ok(Self {
            http,
            config,
            base_url,
            auth,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> FirestoreResult<Self> {
        let config = FirestoreConfig::from_env()?;
        Self::new(config).await
    }

    /// Service account file when GOOGLE_APPLICATION_CREDENTIALS is set,
    /// otherwise application default credentials.
    async fn create_auth_provider() -> FirestoreResult<Arc<dyn TokenProvider>> {
        let service_account = CustomServiceAccount::from_env().map_err(|e| {
            FirestoreError::auth_error(format!("Failed to load service account: {}", e))
        })?;

        match service_account {
            Some(sa) => Ok(Arc::new(sa)),
            None => gcp_auth::provider().await.map_err(|e| {
                FirestoreError::auth_error(format!("No Google credentials available: {}", e))
            }),
        }
    }

    fn is_access_token_expired(body: &str) -> bool {
        body.contains("ACCESS_TOKEN_EXPIRED") || body.contains("\"UNAUTHENTICATED\"")
    }

    fn document_path(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        )
    }

    /// Full resource name used by batch writes.
    pub fn full_document_name(&self, collection: &str, doc_id: &str) -> String {
        format!(
            "projects/{}/databases/{}/documents/{}/{}",
            self.config.project_id, self.config.database_id, collection, doc_id
        )
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Get a document. A missing document is `Ok(None)`.
    pub async fn get_document(
        &self,
        collection: &str,
        doc_id: &str,
    ) -> FirestoreResult<Option<Document>> {
        if !is_valid_document_id(doc_id) {
            debug!(collection, doc_id, "Rejected malformed document ID");
            return Ok(None);
        }
        let url = self.document_path(collection, doc_id);

        let result = self
            .send("get_document", collection, Some(doc_id), |token| {
                self.http.get(&url).bearer_auth(token)
            })
            .await;

        match result {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(FirestoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Create a document with a caller-chosen ID.
    pub async fn create_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
    ) -> FirestoreResult<Document> {
        if !is_valid_document_id(doc_id) {
            return Err(FirestoreError::request_failed(format!(
                "Invalid document ID for {}",
                collection
            )));
        }
        let url = format!(
            "{}/{}?documentId={}",
            self.base_url,
            collection,
            urlencoding::encode(doc_id)
        );
        let body = Document::new(fields);

        let response = self
            .send("create_document", collection, Some(doc_id), |token| {
                self.http.post(&url).bearer_auth(token).json(&body)
            })
            .await?;

        Ok(response.json().await?)
    }

    /// Patch the fields named in `update_mask`.
    ///
    /// With `must_exist`, a missing document is `NotFound` instead of being
    /// created.
    pub async fn update_document(
        &self,
        collection: &str,
        doc_id: &str,
        fields: HashMap<String, Value>,
        update_mask: Option<Vec<String>>,
        must_exist: bool,
    ) -> FirestoreResult<Document> {
        if !is_valid_document_id(doc_id) {
            return Err(FirestoreError::not_found(format!("{}/{}", collection, doc_id)));
        }
        let mut params: Vec<String> = update_mask
            .unwrap_or_default()
            .iter()
            .map(|f| format!("updateMask.fieldPaths={}", urlencoding::encode(f)))
            .collect();
        if must_exist {
            params.push("currentDocument.exists=true".to_string());
        }

        let mut url = self.document_path(collection, doc_id);
        if !params.is_empty() {
            url = format!("{}?{}", url, params.join("&"));
        }
        let body = Document::new(fields);

        let response = self
            .send("update_document", collection, Some(doc_id), |token| {
                self.http.patch(&url).bearer_auth(token).json(&body)
            })
            .await?;

        Ok(response.json().await?)
    }

    /// Apply up to [`MAX_BATCH_WRITES`] writes in one call.
    pub async fn batch_write(&self, writes: Vec<Write>) -> FirestoreResult<BatchWriteResponse> {
        if writes.is_empty() {
            return Ok(BatchWriteResponse::empty());
        }
        if writes.len() > MAX_BATCH_WRITES {
            return Err(FirestoreError::request_failed(format!(
                "Batch write exceeds {} document limit",
                MAX_BATCH_WRITES
            )));
        }

        let url = format!("{}:batchWrite", self.base_url);
        let request = BatchWriteRequest { writes };

        let response = self
            .send("batch_write", "batch", None, |token| {
                self.http.post(&url).bearer_auth(token).json(&request)
            })
            .await?;

        let batch_response: BatchWriteResponse = response.json().await?;
        batch_response.check_for_errors()?;
        Ok(batch_response)
    }

    /// Run a structured query against top-level collections.
    pub async fn run_query(&self, query: StructuredQuery) -> FirestoreResult<Vec<Document>> {
        let url = format!("{}:runQuery", self.base_url);
        let collection = query
            .from
            .first()
            .map(|c| c.collection_id.clone())
            .unwrap_or_default();
        let request = RunQueryRequest {
            structured_query: query,
        };

        let response = self
            .send("run_query", &collection, None, |token| {
                self.http.post(&url).bearer_auth(token).json(&request)
            })
            .await?;

        let body = response.text().await?;
        let responses: Vec<RunQueryResponse> = serde_json::from_str(&body).map_err(|e| {
            FirestoreError::invalid_response(format!(
                "Failed to parse runQuery response: {} (body prefix: {})",
                e,
                body.chars().take(200).collect::<String>()
            ))
        })?;

        Ok(responses.into_iter().filter_map(|r| r.document).collect())
    }

    /// Cheap read to confirm credentials and reachability.
    pub async fn check_connectivity(&self, collection: &str) -> FirestoreResult<()> {
        let url = format!("{}/{}?pageSize=1", self.base_url, collection);

        self.send("check_connectivity", collection, None, |token| {
            self.http.get(&url).bearer_auth(token)
        })
        .await?;
        Ok(())
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Send a request with retry, tracing and metrics.
    ///
    /// Only 2xx responses come back as `Ok`; everything else is classified
    /// into a [`FirestoreError`].
    async fn send<F>(
        &self,
        operation: &str,
        collection: &str,
        doc_id: Option<&str>,
        build: F,
    ) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let span = match doc_id {
            Some(id) => {
                info_span!("firestore_request", operation = %operation, collection = %collection, doc_id = %id)
            }
            None => info_span!("firestore_request", operation = %operation, collection = %collection),
        };

        let build = &build;
        let start = Instant::now();
        let result = with_retry(&self.config.retry, operation, move || self.send_once(build))
            .instrument(span)
            .await;

        let status = match &result {
            Ok(response) => response.status().as_u16(),
            Err(e) => e.http_status().unwrap_or(500),
        };
        record_request(operation, status, start.elapsed().as_millis() as f64);

        result
    }

    async fn send_once<F>(&self, build: &F) -> FirestoreResult<Response>
    where
        F: Fn(&str) -> RequestBuilder,
    {
        let token = self.auth.token().await?;
        let mut response = build(&token).send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            if !Self::is_access_token_expired(&body) {
                return Err(FirestoreError::auth_error(body));
            }
            debug!("Firestore access token expired, refreshing");
            self.auth.invalidate().await;
            let token = self.auth.token().await?;
            response = build(&token).send().await?;
        }

        Self::check_status(response).await
    }

    async fn check_status(response: Response) -> FirestoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let url = response.url().path().to_string();
        let body = response.text().await.unwrap_or_default();

        Err(match (status, retry_after_secs) {
            (StatusCode::TOO_MANY_REQUESTS, Some(secs)) => {
                FirestoreError::RateLimited(secs.saturating_mul(1000))
            }
            _ => FirestoreError::from_http_status(
                status.as_u16(),
                format!("{} failed: {}", url, body),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_requires_project_id() {
        std::env::remove_var("GCP_PROJECT_ID");
        std::env::remove_var("FIREBASE_PROJECT_ID");
        assert!(FirestoreConfig::from_env().is_err());
    }

    #[test]
    #[serial]
    fn test_config_from_env_reads_emulator_host() {
        std::env::set_var("GCP_PROJECT_ID", "test-project");
        std::env::set_var("FIRESTORE_EMULATOR_HOST", "localhost:8080");
        std::env::remove_var("FIRESTORE_CONNECT_TIMEOUT_SECS");

        let config = FirestoreConfig::from_env().unwrap();
        assert_eq!(config.project_id, "test-project");
        assert_eq!(config.emulator_host.as_deref(), Some("localhost:8080"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));

        std::env::remove_var("FIRESTORE_EMULATOR_HOST");
        std::env::remove_var("GCP_PROJECT_ID");
    }

    #[test]
    fn test_full_document_name() {
        let client = FirestoreClient::with_api_root(
            FirestoreConfig::for_project("p1"),
            "http://localhost:1",
            TokenSource::Static("owner".into()),
        )
        .unwrap();
        assert_eq!(
            client.full_document_name("mcqs", "abc"),
            "projects/p1/databases/(default)/documents/mcqs/abc"
        );
    }

    #[test]
    fn test_document_id_validation() {
        assert!(is_valid_document_id("3f1c2a9e-7b64-4d1e-9a0b-2c5d8e7f6a10"));
        assert!(is_valid_document_id("m1"));
        assert!(is_valid_document_id("under_score"));

        assert!(!is_valid_document_id(""));
        assert!(!is_valid_document_id("."));
        assert!(!is_valid_document_id(".."));
        assert!(!is_valid_document_id("x/../../mcqs/m1"));
        assert!(!is_valid_document_id("abc?pageSize=1"));
        assert!(!is_valid_document_id("a#b"));
        assert!(!is_valid_document_id("__name__"));
        assert!(!is_valid_document_id(&"a".repeat(1501)));
    }
}
