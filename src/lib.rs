//! # Rescue Intake
//!
//! Turns free-form food-rescue messages (text plus optional photos) into
//! structured records: items with canonical quantities, a pickup location
//! and estimated pounds rescued.

pub mod backfill;
pub mod checklist;
pub mod circuit_breaker;
pub mod db;
pub mod fallback_parser;
pub mod images;
pub mod item_model;
pub mod location;
pub mod measurement_patterns;
pub mod oracle;
pub mod pipeline;
pub mod pipeline_config;
pub mod pipeline_errors;
pub mod quantity_lexer;
pub mod reconcile;
pub mod summary;
pub mod text_processing;
pub mod unit_registry;
pub mod weight_estimator;
