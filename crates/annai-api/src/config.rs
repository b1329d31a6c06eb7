//! API configuration.

use std::num::NonZeroUsize;
use std::str::FromStr;

use thiserror::Error;

use annai_models::SegmentWindow;

/// A configuration value that could not be used.
#[derive(Debug, Error)]
#[error("invalid {name}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub reason: String,
}

impl ConfigError {
    fn new(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            reason: reason.into(),
        }
    }
}

/// Where videos and questions are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    #[default]
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::new(
                "STORE_BACKEND",
                format!("'{}', expected firestore or memory", other),
            )),
        }
    }
}

/// How bearer tokens are verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Firebase ID tokens checked against Google's JWKS.
    #[default]
    Firebase,
    /// Any non-empty token is accepted and used as the uid.
    InsecureDev,
}

impl FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "firebase" => Ok(Self::Firebase),
            "insecure-dev" | "dev" => Ok(Self::InsecureDev),
            other => Err(ConfigError::new(
                "AUTH_MODE",
                format!("'{}', expected firebase or insecure-dev", other),
            )),
        }
    }
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Rate limit requests per second, per client IP
    pub rate_limit_rps: u32,
    /// Max request body size, uploads included
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// Serve `/metrics`
    pub metrics_enabled: bool,
    pub store_backend: StoreBackend,
    pub auth_mode: AuthMode,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 1024 * 1024 * 1024, // 1GB
            environment: "development".to_string(),
            metrics_enabled: true,
            store_backend: StoreBackend::default(),
            auth_mode: AuthMode::default(),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            host: std::env::var("API_HOST").unwrap_or(defaults.host),
            port: env_parse("API_PORT")?.unwrap_or(defaults.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS")?.unwrap_or(defaults.rate_limit_rps),
            max_body_size: env_parse("MAX_BODY_SIZE")?.unwrap_or(defaults.max_body_size),
            environment: std::env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            metrics_enabled: std::env::var("METRICS_ENABLED")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.metrics_enabled),
            store_backend: env_parse("STORE_BACKEND")?.unwrap_or_default(),
            auth_mode: env_parse("AUTH_MODE")?.unwrap_or_default(),
        };

        if config.is_production() && config.auth_mode == AuthMode::InsecureDev {
            return Err(ConfigError::new(
                "AUTH_MODE",
                "insecure-dev is not allowed when ENVIRONMENT=production",
            ));
        }

        Ok(config)
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

/// What to do with a segment whose generated payload is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Store nothing for the segment.
    #[default]
    Skip,
    /// Store the failure placeholder, same as a transport failure.
    Sentinel,
}

impl FromStr for MalformedPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "skip" => Ok(Self::Skip),
            "sentinel" => Ok(Self::Sentinel),
            other => Err(ConfigError::new(
                "MCQ_MALFORMED_POLICY",
                format!("'{}', expected skip or sentinel", other),
            )),
        }
    }
}

/// Upload pipeline tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Words per transcript segment
    pub segment_window: SegmentWindow,
    /// Generation calls in flight per upload
    pub generation_concurrency: NonZeroUsize,
    pub malformed_policy: MalformedPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segment_window: SegmentWindow::default(),
            generation_concurrency: NonZeroUsize::MIN,
            malformed_policy: MalformedPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Read `SEGMENT_WORDS`, `MCQ_GENERATION_CONCURRENCY` and `MCQ_MALFORMED_POLICY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let segment_window = match env_parse::<usize>("SEGMENT_WORDS")? {
            None => SegmentWindow::default(),
            Some(words) => SegmentWindow::new(words)
                .ok_or_else(|| ConfigError::new("SEGMENT_WORDS", "must be at least 1"))?,
        };

        let generation_concurrency = match env_parse::<usize>("MCQ_GENERATION_CONCURRENCY")? {
            None => NonZeroUsize::MIN,
            Some(n) => NonZeroUsize::new(n).ok_or_else(|| {
                ConfigError::new("MCQ_GENERATION_CONCURRENCY", "must be at least 1")
            })?,
        };

        Ok(Self {
            segment_window,
            generation_concurrency,
            malformed_policy: env_parse("MCQ_MALFORMED_POLICY")?.unwrap_or_default(),
        })
    }
}

fn env_parse<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Err(_) => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::new(name, format!("'{}': {}", raw, e))),
    }
}
