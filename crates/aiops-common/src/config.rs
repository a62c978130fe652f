//! Configuration for the AIOps incident engine
//!
//! Typed configuration records with defaults for every option. Loaded from a
//! TOML file; unknown keys are rejected in strict mode and ignored in
//! permissive mode.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub risk: RiskConfig,
    pub remediation: RemediationConfig,
    pub comms: CommsConfig,
    pub collaborators: CollaboratorsConfig,
    pub server: ServerConfig,
}

/// Workflow engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory backing the durable incident store
    pub incident_table: PathBuf,
    /// Cooldown window in minutes for the suppression gate
    pub cooldown_minutes: u64,
    /// Triage confidence below this value (strict less-than) blocks recovery
    pub confidence_threshold: f64,
    /// Per-incident deadline in seconds
    pub deadline_seconds: u64,
    /// Region hosting the central reasoning layer
    pub central_region: String,
    /// Maximum similar incidents loaded for historical context
    pub similar_incident_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            incident_table: PathBuf::from("./data/incidents"),
            cooldown_minutes: 5,
            confidence_threshold: 0.8,
            deadline_seconds: 900,
            central_region: "us-east-1".to_string(),
            similar_incident_limit: 5,
        }
    }
}

/// A blocked change window. `day_of_week` uses 0 = Monday; `end_hour` is
/// inclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockedWindow {
    pub day_of_week: u32,
    pub start_hour: u32,
    pub end_hour: u32,
}

/// Risk agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub blocked_windows: Vec<BlockedWindow>,
    /// Resource types whose changes skip the approval gate entirely
    pub auto_approve_resource_types: Vec<String>,
    /// Critical incidents per hour before the error budget is exhausted
    pub error_budget_limit: u32,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            // Friday 16:00-23:00 UTC
            blocked_windows: vec![BlockedWindow {
                day_of_week: 4,
                start_hour: 16,
                end_hour: 23,
            }],
            auto_approve_resource_types: vec![
                "compute".to_string(),
                "relational-db".to_string(),
                "function".to_string(),
            ],
            error_budget_limit: 5,
        }
    }
}

/// Remediation agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Image-build project invoked for infrastructure restoration
    pub codebuild_project: String,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            codebuild_project: "aiops-recovery-apply".to_string(),
        }
    }
}

/// Communications agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    pub default_email: String,
    pub sender_email: String,
    pub escalation_emails: Vec<String>,
    pub sns_topic_arn: Option<String>,
}

impl Default for CommsConfig {
    fn default() -> Self {
        Self {
            default_email: "oncall@example.com".to_string(),
            sender_email: "noreply@aiops.example.com".to_string(),
            escalation_emails: Vec::new(),
            sns_topic_arn: None,
        }
    }
}

/// Endpoints and timeouts for external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsConfig {
    pub llm_endpoint: String,
    pub llm_api_key: Option<String>,
    pub observability_endpoint: String,
    pub policy_endpoint: String,
    pub build_endpoint: String,
    pub command_endpoint: String,
    pub function_endpoint: String,
    pub email_endpoint: String,
    pub broadcast_endpoint: String,
    /// Default timeout for read-only collaborator calls
    pub read_timeout_seconds: u64,
    /// Default timeout for mutating collaborator calls
    pub mutation_timeout_seconds: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            llm_endpoint: "http://localhost:9100".to_string(),
            llm_api_key: None,
            observability_endpoint: "http://localhost:9101".to_string(),
            policy_endpoint: "http://localhost:9107".to_string(),
            build_endpoint: "http://localhost:9102".to_string(),
            command_endpoint: "http://localhost:9103".to_string(),
            function_endpoint: "http://localhost:9104".to_string(),
            email_endpoint: "http://localhost:9105".to_string(),
            broadcast_endpoint: "http://localhost:9106".to_string(),
            read_timeout_seconds: 30,
            mutation_timeout_seconds: 300,
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Unknown-key handling when parsing configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigMode {
    /// Unknown keys are an error
    Strict,
    /// Unknown keys are ignored
    Permissive,
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "engine",
    "risk",
    "remediation",
    "comms",
    "collaborators",
    "server",
];

const SECTION_KEYS: &[(&str, &[&str])] = &[
    (
        "engine",
        &[
            "incident_table",
            "cooldown_minutes",
            "confidence_threshold",
            "deadline_seconds",
            "central_region",
            "similar_incident_limit",
        ],
    ),
    (
        "risk",
        &[
            "blocked_windows",
            "auto_approve_resource_types",
            "error_budget_limit",
        ],
    ),
    ("remediation", &["codebuild_project"]),
    (
        "comms",
        &[
            "default_email",
            "sender_email",
            "escalation_emails",
            "sns_topic_arn",
        ],
    ),
    (
        "collaborators",
        &[
            "llm_endpoint",
            "llm_api_key",
            "observability_endpoint",
            "policy_endpoint",
            "build_endpoint",
            "command_endpoint",
            "function_endpoint",
            "email_endpoint",
            "broadcast_endpoint",
            "read_timeout_seconds",
            "mutation_timeout_seconds",
        ],
    ),
    ("server", &["bind_address", "port"]),
];

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str, mode: ConfigMode) -> Result<Self> {
        let value: toml::Value = toml::from_str(text)
            .map_err(|e| Error::Configuration(format!("Invalid TOML: {e}")))?;

        if mode == ConfigMode::Strict {
            validate_keys(&value)?;
        }

        value
            .try_into()
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {e}")))
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file is absent
    pub fn load(path: &Path, mode: ConfigMode) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("Cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text, mode)
    }
}

fn validate_keys(value: &toml::Value) -> Result<()> {
    let table = value
        .as_table()
        .ok_or_else(|| Error::Configuration("Configuration root must be a table".to_string()))?;

    for (key, section) in table {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            return Err(Error::Configuration(format!(
                "Unknown configuration section: {key}"
            )));
        }
        let allowed = SECTION_KEYS
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, keys)| *keys)
            .unwrap_or(&[]);
        if let Some(section_table) = section.as_table() {
            for section_key in section_table.keys() {
                if !allowed.contains(&section_key.as_str()) {
                    return Err(Error::Configuration(format!(
                        "Unknown key {key}.{section_key}"
                    )));
                }
            }
        }
    }
    Ok(())
}
