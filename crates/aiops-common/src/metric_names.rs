//! Metric emission helpers
//!
//! All components publish through the `metrics` facade; the gateway binary
//! installs a Prometheus recorder that renders these at `/metrics`.

use metrics::{counter, gauge, histogram};

/// Triage: classification counts, severity, noise, duplicates
pub fn publish_triage(classification: &str, severity: u8, noise_score: f64, is_duplicate: bool) {
    counter!(
        "aiops_triage_incident_classification_total",
        "classification" => classification.to_string()
    )
    .increment(1);
    gauge!("aiops_triage_severity_score").set(severity as f64);
    gauge!("aiops_triage_noise_score").set(noise_score);
    counter!("aiops_triage_duplicate_incidents_total").increment(u64::from(is_duplicate));
}

/// Telemetry: anomalies and derived health
pub fn publish_telemetry(anomalies: usize, health_score: f64) {
    counter!("aiops_telemetry_anomalies_detected_total").increment(anomalies as u64);
    gauge!("aiops_telemetry_health_score").set(health_score);
}

/// Risk: score, approval gating, compliance
pub fn publish_risk(risk_score: f64, approval_required: bool, policy_compliant: bool) {
    gauge!("aiops_risk_score").set(risk_score);
    counter!("aiops_risk_approval_required_total").increment(u64::from(approval_required));
    counter!("aiops_risk_policy_compliance_total").increment(u64::from(policy_compliant));
}

/// Remediation: attempt outcomes and step counts
pub fn publish_remediation(status: &str, steps_executed: usize) {
    counter!(
        "aiops_remediation_attempts_total",
        "status" => status.to_string()
    )
    .increment(1);
    counter!("aiops_remediation_steps_executed_total").increment(steps_executed as u64);
}

/// Communications: notification delivery
pub fn publish_communications(sent: usize, failed: usize) {
    counter!("aiops_communications_notifications_sent_total").increment(sent as u64);
    counter!("aiops_communications_notifications_failed_total").increment(failed as u64);
}

/// Engine: per-incident count and recovery duration
pub fn publish_engine(resource_type: &str, classification: &str, duration_seconds: f64, success: bool) {
    counter!(
        "aiops_engine_incident_count_total",
        "resource_type" => resource_type.to_string(),
        "classification" => classification.to_string()
    )
    .increment(1);
    histogram!(
        "aiops_engine_recovery_duration_seconds",
        "resource_type" => resource_type.to_string(),
        "success" => success.to_string()
    )
    .record(duration_seconds);
}
