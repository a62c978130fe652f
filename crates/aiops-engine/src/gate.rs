//! Duplicate-suppression gate and historical context loading

use aiops_agents::SimilarIncident;
use aiops_common::{EventClassification, IncidentContext, Result, WorkflowState};
use aiops_store::IncidentStore;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

/// Prior states that keep a resource in cooldown: an active or successful
/// recovery suppresses new incidents for the same resource
const ACTIVE_STATES: &[WorkflowState] = &[
    WorkflowState::Executing,
    WorkflowState::Verifying,
    WorkflowState::Completed,
];

/// Check the cooldown window for this resource.
///
/// Returns the correlation id of the prior incident that suppresses this one,
/// if any. The gate is authoritative: downstream agents never re-enter
/// cooldown.
pub async fn check_cooldown(
    store: &Arc<dyn IncidentStore>,
    ctx: &IncidentContext,
    cooldown_minutes: u64,
) -> Result<Option<String>> {
    let since = Utc::now() - Duration::minutes(cooldown_minutes as i64);
    let recent = store
        .query_recent_by_resource(&ctx.resource_key(), since, 5)
        .await?;

    let suppressor = recent
        .iter()
        .filter(|incident| incident.correlation_id != ctx.correlation_id)
        .find(|incident| ACTIVE_STATES.contains(&incident.workflow_state))
        .map(|incident| incident.correlation_id.clone());

    if let Some(prior) = &suppressor {
        debug!(
            resource = %ctx.resource_key(),
            prior_incident = %prior,
            "resource is in cooldown"
        );
    }
    Ok(suppressor)
}

/// Load up to `limit` completed incidents of the same resource type for
/// historical context
pub async fn fetch_similar_incidents(
    store: &Arc<dyn IncidentStore>,
    ctx: &IncidentContext,
    limit: usize,
) -> Result<Vec<SimilarIncident>> {
    let incidents = store
        .query_by_resource_type(
            ctx.resource_type,
            Some(EventClassification::Failure),
            WorkflowState::Completed,
            limit,
        )
        .await?;

    Ok(incidents
        .into_iter()
        .map(|incident| SimilarIncident {
            correlation_id: incident.correlation_id,
            timestamp: incident.incident_timestamp,
            classification: incident.classification.map(|c| c.as_str().to_string()),
            resolved: true,
        })
        .collect())
}
