//! Runtime configuration
//!
//! Thresholds are tuned per deployment, so they are read once at startup,
//! validated, and injected into the classifier and controller.

use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.7;
pub const DEFAULT_MED_THRESHOLD: f64 = 0.5;
/// Score assigned to a retrieved turn the backend sent without a score
pub const DEFAULT_FALLBACK_SIMILARITY: f64 = 0.5;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid similarity thresholds: need 0 <= med ({med}) < high ({high}) <= 1")]
    InvalidThresholds { high: f64, med: f64 },
    #[error("fallback similarity {0} is outside [0, 1]")]
    InvalidFallback(f64),
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Tier boundaries for relevance classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevanceConfig {
    high_threshold: f64,
    med_threshold: f64,
    fallback_similarity: f64,
}

impl RelevanceConfig {
    pub fn new(high_threshold: f64, med_threshold: f64) -> Result<Self, ConfigError> {
        let valid = high_threshold.is_finite()
            && med_threshold.is_finite()
            && med_threshold >= 0.0
            && med_threshold < high_threshold
            && high_threshold <= 1.0;
        if !valid {
            return Err(ConfigError::InvalidThresholds {
                high: high_threshold,
                med: med_threshold,
            });
        }
        Ok(Self {
            high_threshold,
            med_threshold,
            fallback_similarity: DEFAULT_FALLBACK_SIMILARITY,
        })
    }

    pub fn with_fallback_similarity(mut self, similarity: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&similarity) {
            return Err(ConfigError::InvalidFallback(similarity));
        }
        self.fallback_similarity = similarity;
        Ok(self)
    }

    pub fn high_threshold(&self) -> f64 {
        self.high_threshold
    }

    pub fn med_threshold(&self) -> f64 {
        self.med_threshold
    }

    pub fn fallback_similarity(&self) -> f64 {
        self.fallback_similarity
    }
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            high_threshold: DEFAULT_HIGH_THRESHOLD,
            med_threshold: DEFAULT_MED_THRESHOLD,
            fallback_similarity: DEFAULT_FALLBACK_SIMILARITY,
        }
    }
}

/// Connection settings for the retrieval backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Timeout for the non-streaming endpoints
    pub request_timeout: Duration,
    /// Longest gap allowed between two stream fragments
    pub stream_idle_timeout: Duration,
    /// Hard deadline for a whole streamed reply
    pub stream_timeout: Duration,
    /// Sent when a session is created; ignored by the backend for existing sessions
    pub system_instructions: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(120),
            stream_timeout: Duration::from_secs(600),
            system_instructions: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub relevance: RelevanceConfig,
    pub client: ClientConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let high = parse_var(&lookup, "SIMILARITY_HIGH_THRESHOLD")?.unwrap_or(DEFAULT_HIGH_THRESHOLD);
        let med = parse_var(&lookup, "SIMILARITY_MED_THRESHOLD")?.unwrap_or(DEFAULT_MED_THRESHOLD);
        let fallback =
            parse_var(&lookup, "SIMILARITY_FALLBACK")?.unwrap_or(DEFAULT_FALLBACK_SIMILARITY);
        let relevance = RelevanceConfig::new(high, med)?.with_fallback_similarity(fallback)?;

        let defaults = ClientConfig::default();
        let client = ClientConfig {
            base_url: lookup("CONTEXT_MANAGER_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            request_timeout: parse_var(&lookup, "CONTEXT_MANAGER_REQUEST_TIMEOUT_SECS")?
                .map_or(defaults.request_timeout, Duration::from_secs),
            stream_idle_timeout: parse_var(&lookup, "CONTEXT_MANAGER_STREAM_IDLE_TIMEOUT_SECS")?
                .map_or(defaults.stream_idle_timeout, Duration::from_secs),
            stream_timeout: parse_var(&lookup, "CONTEXT_MANAGER_STREAM_TIMEOUT_SECS")?
                .map_or(defaults.stream_timeout, Duration::from_secs),
            system_instructions: lookup("CONTEXT_MANAGER_SYSTEM_INSTRUCTIONS")
                .filter(|s| !s.trim().is_empty()),
        };

        Ok(Self { relevance, client })
    }
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
