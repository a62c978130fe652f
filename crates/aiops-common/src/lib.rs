//! Common types and utilities for the AIOps incident engine
//!
//! Shared across every engine crate: the error taxonomy, the incident data
//! model, typed configuration, retry with backoff, fingerprint hashing, and
//! metric emission.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod metric_names;
pub mod retry;
pub mod types;

pub use config::{BlockedWindow, CollaboratorsConfig, CommsConfig, Config, ConfigMode, EngineConfig, RemediationConfig, RiskConfig, ServerConfig};
pub use error::{Error, Result};
pub use fingerprint::fingerprint;
pub use retry::{retry, RetryPolicy};
pub use types::{
    generate_correlation_id, BlastRadius, Classification, EventClassification, Incident,
    IncidentContext, ResourceType, WorkflowState,
};
