//! Durable incident store backed by sled
//!
//! Trees:
//! - `incidents`: correlation_id -> JSON record
//! - `resource_index`: `{resource_key}\0{timestamp}\0{id}` -> id
//! - `type_index`: `{resource_type}\0{timestamp}\0{id}` -> id
//! - `fingerprint_index`: `{fingerprint}\0{timestamp}\0{id}` -> id
//! - `patterns`: `{log_group}#{pattern}` -> JSON baseline
//!
//! Index keys embed a fixed-width RFC 3339 timestamp so a reverse prefix scan
//! yields newest-first ordering.

use crate::patterns::PatternBaseline;
use crate::{apply_update, decode_incident, index_timestamp, IncidentStore};
use aiops_common::{Error, EventClassification, Incident, Result, ResourceType, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// Sled-backed incident store
pub struct SledIncidentStore {
    incidents: sled::Tree,
    resource_index: sled::Tree,
    type_index: sled::Tree,
    fingerprint_index: sled::Tree,
    patterns: sled::Tree,
    _db: sled::Db,
}

impl SledIncidentStore {
    /// Open (or create) the store at the given directory
    pub fn open(path: &Path) -> Result<Self> {
        info!(path = %path.display(), "opening incident store");
        let db = sled::open(path).map_err(store_err)?;
        Ok(Self {
            incidents: db.open_tree("incidents").map_err(store_err)?,
            resource_index: db.open_tree("resource_index").map_err(store_err)?,
            type_index: db.open_tree("type_index").map_err(store_err)?,
            fingerprint_index: db.open_tree("fingerprint_index").map_err(store_err)?,
            patterns: db.open_tree("patterns").map_err(store_err)?,
            _db: db,
        })
    }

    fn index_key(partition: &str, ts: &DateTime<Utc>, id: &str) -> Vec<u8> {
        format!("{partition}\0{}\0{id}", index_timestamp(ts)).into_bytes()
    }

    fn load(&self, correlation_id: &str) -> Result<Option<Value>> {
        let bytes = self.incidents.get(correlation_id).map_err(store_err)?;
        bytes
            .map(|b| serde_json::from_slice(&b).map_err(Error::from))
            .transpose()
    }

    fn write_record(&self, correlation_id: &str, record: &Value) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.incidents
            .insert(correlation_id, bytes)
            .map_err(store_err)?;
        Ok(())
    }

    /// Keep the fingerprint index in sync after triage stamps the record
    fn index_fingerprint(&self, record: &Value) -> Result<()> {
        let (Some(fingerprint), Some(id)) = (
            record.get("fingerprint").and_then(Value::as_str),
            record.get("correlation_id").and_then(Value::as_str),
        ) else {
            return Ok(());
        };
        let ts = record
            .get("incident_timestamp")
            .and_then(Value::as_str)
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        self.fingerprint_index
            .insert(Self::index_key(fingerprint, &ts, id), id.as_bytes())
            .map_err(store_err)?;
        Ok(())
    }

    /// Reverse prefix scan over an index tree, loading matching incidents
    /// newest first until `limit` or until records fall at or before `since`
    fn scan_index(
        &self,
        tree: &sled::Tree,
        partition: &str,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        let prefix = format!("{partition}\0");
        let mut results = Vec::new();

        for entry in tree.scan_prefix(prefix.as_bytes()).rev() {
            let (_, id_bytes) = entry.map_err(store_err)?;
            let id = String::from_utf8_lossy(&id_bytes).to_string();
            let Some(record) = self.load(&id)? else {
                continue;
            };
            let incident = decode_incident(record)?;
            if let Some(since) = since {
                // Keys descend; everything past the first stale record is older
                if incident.incident_timestamp <= since {
                    break;
                }
            }
            results.push(incident);
            if results.len() >= limit {
                break;
            }
        }
        Ok(results)
    }
}

#[async_trait]
impl IncidentStore for SledIncidentStore {
    async fn put(&self, incident: &Incident) -> Result<()> {
        let record = serde_json::to_value(incident)?;
        self.write_record(&incident.correlation_id, &record)?;

        let ts = &incident.incident_timestamp;
        let id = &incident.correlation_id;
        self.resource_index
            .insert(Self::index_key(&incident.resource_key, ts, id), id.as_bytes())
            .map_err(store_err)?;
        self.type_index
            .insert(
                Self::index_key(incident.resource_type.as_str(), ts, id),
                id.as_bytes(),
            )
            .map_err(store_err)?;
        self.index_fingerprint(&record)?;

        debug!(correlation_id = %id, "incident stored");
        Ok(())
    }

    async fn get(&self, correlation_id: &str) -> Result<Option<Incident>> {
        self.load(correlation_id)?.map(decode_incident).transpose()
    }

    async fn update_state(
        &self,
        correlation_id: &str,
        state: WorkflowState,
        data: Option<Map<String, Value>>,
    ) -> Result<()> {
        let mut record = self
            .load(correlation_id)?
            .ok_or_else(|| Error::Store(format!("unknown incident: {correlation_id}")))?;
        apply_update(&mut record, Some(state), data.as_ref())?;
        self.write_record(correlation_id, &record)?;
        self.index_fingerprint(&record)?;
        Ok(())
    }

    async fn merge(&self, correlation_id: &str, data: Map<String, Value>) -> Result<()> {
        let mut record = self
            .load(correlation_id)?
            .ok_or_else(|| Error::Store(format!("unknown incident: {correlation_id}")))?;
        apply_update(&mut record, None, Some(&data))?;
        self.write_record(correlation_id, &record)?;
        self.index_fingerprint(&record)?;
        Ok(())
    }

    async fn query_recent_by_resource(
        &self,
        resource_key: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.scan_index(&self.resource_index, resource_key, Some(since), limit)
    }

    async fn query_by_resource_type(
        &self,
        resource_type: ResourceType,
        classification: Option<EventClassification>,
        state: WorkflowState,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        // The type index orders candidates; state/classification are filtered
        // on the loaded records
        let candidates =
            self.scan_index(&self.type_index, resource_type.as_str(), None, usize::MAX)?;
        Ok(candidates
            .into_iter()
            .filter(|incident| {
                incident.workflow_state == state
                    && classification
                        .map(|c| incident.event_classification == Some(c))
                        .unwrap_or(true)
            })
            .take(limit)
            .collect())
    }

    async fn scan_by_fingerprint(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Incident>> {
        self.scan_index(&self.fingerprint_index, fingerprint, Some(since), limit)
    }

    async fn get_pattern(&self, key: &str) -> Result<Option<PatternBaseline>> {
        let bytes = self.patterns.get(key).map_err(store_err)?;
        bytes
            .map(|b| serde_json::from_slice(&b).map_err(Error::from))
            .transpose()
    }

    async fn upsert_pattern(&self, key: &str, count: f64) -> Result<PatternBaseline> {
        let now = Utc::now();
        let updated = match self.get_pattern(key).await? {
            Some(existing) => existing.update(count, now),
            None => PatternBaseline::new(count, now),
        };
        self.patterns
            .insert(key, serde_json::to_vec(&updated)?)
            .map_err(store_err)?;
        Ok(updated)
    }
}

fn store_err(e: sled::Error) -> Error {
    Error::Store(e.to_string())
}
