//! # Extraction Pipeline
//!
//! Turns one inbound message into a [`NormalizedRecord`]:
//!
//! 1. AI extraction (text plus a few images) under a deadline
//! 2. checklist extraction
//! 3. fallback line parsing
//! 4. reconciliation
//! 5. pickup location: AI proposal if it canonicalizes, else the text
//! 6. drop-off location: AI proposal if it canonicalizes, else the text
//! 7. direction and per-site sections
//! 8. weight estimation
//!
//! Every external failure degrades the record instead of aborting it; the
//! only hard error is a message with neither text nor attachments.
//!
//! A line ends up either as an item or in `unparsed_lines`, never both.
//!
//! Registries are built once and shared read-only, so one `Pipeline` can
//! serve many messages concurrently.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::checklist::extract_checklist;
use crate::circuit_breaker::{calculate_retry_delay, CircuitBreaker};
use crate::db::{RecordMeta, RecordStore};
use crate::fallback_parser::parse_fallback_lines;
use crate::images::{fetch_images, Attachment};
use crate::item_model::{NormalizedRecord, ParsedItem};
use crate::location::{
    detect_direction, extract_dropoff_location, parse_sections, LocationAliasTable, LocationResolver,
};
use crate::oracle::{ExtractionOracle, OpenAiOracle, OracleImage, OracleRequest, OracleResponse};
use crate::pipeline_config::PipelineConfig;
use crate::pipeline_errors::PipelineError;
use crate::quantity_lexer::parse_text;
use crate::reconcile::{oracle_items_to_parsed, reconcile};
use crate::summary::format_summary;
use crate::text_processing::{normalize_text, strip_leading_bullet};
use crate::unit_registry::{UnitKind, UnitRegistry};
use crate::weight_estimator::{categorize_item, estimate_weight_lbs};

/// Per-message processing stages, traced as the message moves through them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    AiRequested,
    AiSucceeded,
    /// Not terminal: processing continues with an empty AI item list
    AiFailed,
    DeterministicParsed,
    Merged,
    Filtered,
    LocationResolved,
    WeightEstimated,
    Complete,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Received => "received",
            PipelineStage::AiRequested => "ai_requested",
            PipelineStage::AiSucceeded => "ai_succeeded",
            PipelineStage::AiFailed => "ai_failed",
            PipelineStage::DeterministicParsed => "deterministic_parsed",
            PipelineStage::Merged => "merged",
            PipelineStage::Filtered => "filtered",
            PipelineStage::LocationResolved => "location_resolved",
            PipelineStage::WeightEstimated => "weight_estimated",
            PipelineStage::Complete => "complete",
        };
        write!(f, "{name}")
    }
}

fn enter(stage: PipelineStage) {
    debug!(stage = %stage, "Pipeline stage");
}

/// An inbound chat message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Chat timestamp, unique per channel
    pub ts: Option<String>,
    pub channel: Option<String>,
    pub user: Option<String>,
    pub text: String,
    #[serde(default)]
    pub files: Vec<Attachment>,
    pub posted_at: Option<DateTime<Utc>>,
}

impl MessageEvent {
    pub fn from_text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    fn meta(&self) -> RecordMeta {
        RecordMeta {
            source_ts: self.ts.clone(),
            channel: self.channel.clone(),
            user_id: self.user.clone(),
            rescued_at: self.posted_at,
        }
    }
}

/// Result of [`Pipeline::process_message`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    pub record: NormalizedRecord,
    /// Store identifier, when the record was saved
    pub record_id: Option<String>,
    /// Why saving failed; the record is still returned so the save can be retried
    pub persistence_error: Option<String>,
    pub summary: String,
}

pub struct Pipeline {
    registry: Arc<UnitRegistry>,
    locations: Arc<LocationResolver>,
    oracle: Option<Arc<dyn ExtractionOracle>>,
    store: Option<Arc<dyn RecordStore>>,
    config: PipelineConfig,
    breaker: CircuitBreaker,
    http: Client,
    file_token: Option<String>,
}

impl Pipeline {
    /// A pipeline with no oracle and no store; add them with the `with_*` builders
    pub fn new(
        registry: Arc<UnitRegistry>,
        locations: Arc<LocationResolver>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let breaker = CircuitBreaker::new(config.recovery.clone());
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.recovery.image_timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::Image(format!("failed to build attachment HTTP client: {e}")))?;
        Ok(Self {
            registry,
            locations,
            oracle: None,
            store: None,
            config,
            breaker,
            http,
            file_token: None,
        })
    }

    /// Build registries and the oracle from configuration
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let table = match &config.location_aliases_path {
            Some(path) => LocationAliasTable::from_path(path)?,
            None => LocationAliasTable::builtin().context("Built-in location aliases are invalid")?,
        };
        let locations = LocationResolver::new(&config.known_locations, &table);

        let oracle = match config.oracle.api_key {
            Some(_) => Some(OpenAiOracle::new(&config.oracle).context("Failed to configure oracle")?),
            None => {
                info!("No oracle API key configured; running deterministic parsers only");
                None
            }
        };

        let mut pipeline = Self::new(Arc::new(UnitRegistry::standard()), Arc::new(locations), config)
            .context("Failed to build pipeline")?;
        if let Some(oracle) = oracle {
            pipeline = pipeline.with_oracle(Arc::new(oracle));
        }
        Ok(pipeline)
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn ExtractionOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Bearer token used to download attachments
    pub fn with_file_token(mut self, token: &str) -> Self {
        self.file_token = Some(token.to_string());
        self
    }

    pub fn registry(&self) -> &UnitRegistry {
        &self.registry
    }

    pub fn store(&self) -> Option<&Arc<dyn RecordStore>> {
        self.store.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract a record from pasted text without saving anything
    pub async fn preview_from_text(&self, text: &str) -> NormalizedRecord {
        enter(PipelineStage::Received);
        self.extract(text, Vec::new(), Vec::new()).await
    }

    /// Extract, save and summarize one message
    pub async fn process_message(&self, event: &MessageEvent) -> Result<ProcessOutcome, PipelineError> {
        if event.text.trim().is_empty() && event.files.is_empty() {
            return Err(PipelineError::Validation(
                "message has no text and no attachments".to_string(),
            ));
        }
        enter(PipelineStage::Received);
        info!(
            ts = event.ts.as_deref().unwrap_or(""),
            files = event.files.len(),
            "Processing message"
        );

        let (images, image_errors) = self.load_images(&event.files).await;
        let record = self.extract(&event.text, images, image_errors).await;

        let (record_id, persistence_error) = match self.persist(&record, &event.meta()).await {
            Some(Ok(id)) => (Some(id), None),
            Some(Err(e)) => {
                warn!(error = %e, "Failed to save record");
                (None, Some(e.to_string()))
            }
            None => (None, None),
        };

        let summary = format_summary(&record);
        Ok(ProcessOutcome {
            record,
            record_id,
            persistence_error,
            summary,
        })
    }

    async fn load_images(&self, files: &[Attachment]) -> (Vec<OracleImage>, Vec<String>) {
        if files.is_empty() {
            return (Vec::new(), Vec::new());
        }
        let deadline = Instant::now() + Duration::from_secs(self.config.recovery.image_timeout_secs);
        let fetch = fetch_images(
            &self.http,
            files,
            self.file_token.as_deref(),
            self.config.max_images,
            &self.config.image_limits,
        );
        match timeout_at(deadline, fetch).await {
            Ok(result) => result,
            Err(_) => {
                let error = PipelineError::Timeout(format!(
                    "image downloads exceeded {}s",
                    self.config.recovery.image_timeout_secs
                ));
                warn!(error = %error, "Image downloads timed out");
                (Vec::new(), vec![error.to_string()])
            }
        }
    }

    async fn persist(&self, record: &NormalizedRecord, meta: &RecordMeta) -> Option<Result<String, PipelineError>> {
        let store = self.store.as_ref()?;
        let deadline = Instant::now() + Duration::from_secs(self.config.recovery.persistence_timeout_secs);
        let result = match timeout_at(deadline, store.save(record, meta)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(format!(
                "record store exceeded {}s",
                self.config.recovery.persistence_timeout_secs
            ))),
        };
        Some(result)
    }

    async fn extract(&self, text: &str, images: Vec<OracleImage>, image_errors: Vec<String>) -> NormalizedRecord {
        let (ai, oracle_error) = match self.request_ai(text, images).await {
            Some(Ok(response)) => {
                enter(PipelineStage::AiSucceeded);
                (Some(response), None)
            }
            Some(Err(e)) => {
                enter(PipelineStage::AiFailed);
                warn!(error = %e, "AI extraction failed; continuing with deterministic parsers");
                (None, Some(e.to_string()))
            }
            None => (None, None),
        };

        let mut record = self.assemble(text, ai.as_ref());
        record.oracle_error = oracle_error;
        record.image_errors = image_errors;
        record
    }

    async fn request_ai(&self, text: &str, images: Vec<OracleImage>) -> Option<Result<OracleResponse, PipelineError>> {
        let oracle = self.oracle.as_ref()?;
        enter(PipelineStage::AiRequested);
        let request = OracleRequest {
            text: text.to_string(),
            images,
        };
        let deadline = Instant::now() + Duration::from_secs(self.config.recovery.oracle_timeout_secs);
        Some(self.call_oracle(oracle.as_ref(), &request, deadline).await)
    }

    /// Call the oracle with retries, all within one deadline
    async fn call_oracle(
        &self,
        oracle: &dyn ExtractionOracle,
        request: &OracleRequest,
        deadline: Instant,
    ) -> Result<OracleResponse, PipelineError> {
        let recovery = &self.config.recovery;
        let mut attempt = 0;
        loop {
            if self.breaker.is_open() {
                return Err(PipelineError::CircuitOpen(format!(
                    "{} suspended after {} consecutive failures",
                    oracle.name(),
                    self.breaker.failure_count()
                )));
            }

            let error = match timeout_at(deadline, oracle.extract(request)).await {
                Ok(Ok(response)) => {
                    self.breaker.record_success();
                    debug!(oracle = oracle.name(), items = response.items.len(), "Oracle responded");
                    return Ok(response);
                }
                Ok(Err(e)) => e,
                Err(_) => PipelineError::Timeout(format!(
                    "{} exceeded {}s",
                    oracle.name(),
                    recovery.oracle_timeout_secs
                )),
            };
            self.breaker.record_failure();

            if !error.is_transient() || attempt >= recovery.max_retries {
                return Err(error);
            }
            let delay = calculate_retry_delay(recovery, attempt);
            if Instant::now() + delay >= deadline {
                return Err(error);
            }
            warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "Retrying oracle");
            sleep(delay).await;
            attempt += 1;
        }
    }

    /// Deterministic part of the pipeline: parse, merge, resolve, weigh
    pub fn assemble(&self, raw_text: &str, ai: Option<&OracleResponse>) -> NormalizedRecord {
        let text = normalize_text(raw_text);
        let registry = self.registry.as_ref();

        let ai_items = ai
            .map(|response| oracle_items_to_parsed(&response.items, registry))
            .unwrap_or_default();
        let checklist = extract_checklist(&text, registry);
        let fallback = parse_fallback_lines(&text, registry);
        let item_lines: HashSet<String> = checklist
            .iter()
            .chain(fallback.iter())
            .map(|item| item.raw_text.clone())
            .collect();
        let (_, mut unparsed_lines) = parse_text(&text, registry);
        unparsed_lines.retain(|line| !item_lines.contains(strip_leading_bullet(line)));
        enter(PipelineStage::DeterministicParsed);

        let items = reconcile(checklist, ai_items, fallback);
        enter(PipelineStage::Merged);
        enter(PipelineStage::Filtered);

        let mut record = NormalizedRecord::new(raw_text);
        record.location = ai
            .and_then(|response| response.location.as_deref())
            .map(|proposed| self.locations.canonicalize(proposed))
            .filter(|canonical| !canonical.is_empty())
            .unwrap_or_else(|| self.locations.resolve_text(&text));
        record.drop_off_location = ai
            .and_then(|response| response.drop_off_location.as_deref())
            .map(|proposed| self.locations.canonicalize(proposed))
            .filter(|canonical| !canonical.is_empty())
            .or_else(|| extract_dropoff_location(&text).map(|candidate| self.locations.canonicalize(&candidate)))
            .unwrap_or_default();
        record.direction = detect_direction(&text, &record.location, &record.drop_off_location);
        record.sections = parse_sections(&text, registry)
            .into_iter()
            .map(|mut section| {
                let canonical = self.locations.canonicalize(&section.location);
                if !canonical.is_empty() {
                    section.location = canonical;
                }
                section.items = section.items.into_iter().map(with_weight_estimate).collect();
                section
            })
            .collect();
        enter(PipelineStage::LocationResolved);

        record.items = items.into_iter().map(with_weight_estimate).collect();
        record.unparsed_lines = unparsed_lines;
        enter(PipelineStage::WeightEstimated);

        info!(
            location = %record.location,
            direction = %record.direction,
            items = record.parsed_count(),
            unparsed = record.unparsed_count(),
            estimated_lbs = record.estimated_total_lbs(),
            "Record assembled"
        );
        enter(PipelineStage::Complete);
        record
    }
}

/// Fill in subcategory and estimated pounds for one item.
///
/// Weights are already pounds once canonical and pass through unrounded.
fn with_weight_estimate(mut item: ParsedItem) -> ParsedItem {
    if item.subcategory.is_none() {
        item.subcategory = categorize_item(&item.name).map(str::to_string);
    }
    if item.estimated_weight_lbs.is_none() {
        item.estimated_weight_lbs = match item.unit_kind {
            UnitKind::Weight => item.canonical_quantity.filter(|lbs| lbs.is_finite() && *lbs > 0.0),
            _ => estimate_weight_lbs(
                &item.name,
                item.quantity,
                Some(item.unit.as_deref().unwrap_or(&item.canonical_unit)),
            ),
        };
    }
    item
}
