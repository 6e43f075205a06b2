//! # Pipeline Configuration Module
//!
//! This module defines configuration structures for the extraction pipeline,
//! including recovery settings, image limits and the AI oracle endpoint.
//! Every struct has a `Default`; [`PipelineConfig::from_env`] overlays
//! environment variables (after `dotenv`) on top of the defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

// Constants for pipeline configuration
pub const DEFAULT_MAX_IMAGES: usize = 4;
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024; // 5MB per attachment
pub const MIN_IMAGE_BYTES: usize = 8; // enough to sniff a header
pub const DEFAULT_ORACLE_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_ORACLE_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Recovery configuration for external calls
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryConfig {
    /// Maximum number of oracle retry attempts after the first call
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Deadline for the whole AI extraction step in seconds
    pub oracle_timeout_secs: u64,
    /// Deadline for downloading all attachments in seconds
    pub image_timeout_secs: u64,
    /// Deadline for the record store write in seconds
    pub persistence_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            oracle_timeout_secs: 45,
            image_timeout_secs: 20,
            persistence_timeout_secs: 10,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60, // 1 minute
        }
    }
}

/// Limits applied to image attachments before they reach the oracle
#[derive(Debug, Clone, PartialEq)]
pub struct ImageLimits {
    /// Largest accepted attachment in bytes
    pub max_bytes: u64,
    /// Smallest payload worth sniffing
    pub min_bytes: usize,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: MAX_IMAGE_BYTES,
            min_bytes: MIN_IMAGE_BYTES,
        }
    }
}

/// Where and how to call the AI extraction service
#[derive(Debug, Clone, PartialEq)]
pub struct OracleConfig {
    /// Chat completions endpoint
    pub api_url: String,
    /// API key; the oracle is disabled when absent
    pub api_key: Option<String>,
    pub model: String,
    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_ORACLE_URL.to_string(),
            api_key: None,
            model: DEFAULT_ORACLE_MODEL.to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Configuration structure for the extraction pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Maximum number of attachments forwarded to the oracle
    pub max_images: usize,
    pub image_limits: ImageLimits,
    pub recovery: RecoveryConfig,
    /// Operator-supplied canonical locations, matched before the alias table
    pub known_locations: Vec<String>,
    /// Alias table JSON; the built-in table is used when unset
    pub location_aliases_path: Option<PathBuf>,
    pub oracle: OracleConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_IMAGES,
            image_limits: ImageLimits::default(),
            recovery: RecoveryConfig::default(),
            known_locations: Vec::new(),
            location_aliases_path: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Build a configuration from environment variables.
    ///
    /// Recognized variables: `OPENAI_API_KEY`, `ORACLE_API_URL`,
    /// `ORACLE_MODEL`, `ORACLE_TIMEOUT_SECS`, `IMAGE_TIMEOUT_SECS`,
    /// `PERSISTENCE_TIMEOUT_SECS`, `MAX_IMAGES`, `MAX_IMAGE_BYTES`,
    /// `KNOWN_LOCATIONS` (comma-separated) and `LOCATION_ALIASES_PATH`.
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(key) = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty()) {
            config.oracle.api_key = Some(key);
        }
        if let Some(url) = lookup("ORACLE_API_URL") {
            config.oracle.api_url = url;
        }
        if let Some(model) = lookup("ORACLE_MODEL") {
            config.oracle.model = model;
        }
        if let Some(secs) = parse_var(&lookup, "ORACLE_TIMEOUT_SECS")? {
            config.recovery.oracle_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "IMAGE_TIMEOUT_SECS")? {
            config.recovery.image_timeout_secs = secs;
        }
        if let Some(secs) = parse_var(&lookup, "PERSISTENCE_TIMEOUT_SECS")? {
            config.recovery.persistence_timeout_secs = secs;
        }
        if let Some(max) = parse_var(&lookup, "MAX_IMAGES")? {
            config.max_images = max;
        }
        if let Some(bytes) = parse_var(&lookup, "MAX_IMAGE_BYTES")? {
            config.image_limits.max_bytes = bytes;
        }
        if let Some(known) = lookup("KNOWN_LOCATIONS") {
            config.known_locations = known
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(path) = lookup("LOCATION_ALIASES_PATH").filter(|p| !p.trim().is_empty()) {
            config.location_aliases_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| raw.trim().parse::<T>().with_context(|| format!("Invalid value for {key}: '{raw}'")))
        .transpose()
}
