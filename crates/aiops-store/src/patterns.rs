//! Log-pattern baselines for the proactive analyzer
//!
//! Baselines are keyed `log_group#pattern` and updated with an exponential
//! moving average. The standard deviation is derived, never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// EMA smoothing factor for baseline updates
pub const EMA_ALPHA: f64 = 0.3;

/// Minimum observations before a baseline is trusted for anomaly checks
const MIN_OCCURRENCES: u64 = 10;

/// Z-score above which a pattern count is anomalous
const Z_THRESHOLD: f64 = 2.0;

/// Historical baseline for one log pattern
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternBaseline {
    pub avg_count: f64,
    pub last_seen: DateTime<Utc>,
    pub occurrence_count: u64,
}

impl PatternBaseline {
    /// First observation of a pattern
    pub fn new(count: f64, now: DateTime<Utc>) -> Self {
        Self {
            avg_count: count,
            last_seen: now,
            occurrence_count: 1,
        }
    }

    /// Fold a new observation into the baseline (EMA, alpha = 0.3)
    pub fn update(&self, count: f64, now: DateTime<Utc>) -> Self {
        Self {
            avg_count: EMA_ALPHA * count + (1.0 - EMA_ALPHA) * self.avg_count,
            last_seen: now,
            occurrence_count: self.occurrence_count + 1,
        }
    }

    /// Derived standard deviation; half the average when no better estimate
    /// exists
    pub fn std_dev(&self) -> f64 {
        self.avg_count * 0.5
    }

    /// Z-score of a current count against this baseline
    pub fn z_score(&self, count: f64) -> f64 {
        let std = self.std_dev();
        if std <= f64::EPSILON {
            return if count > 0.0 { f64::INFINITY } else { 0.0 };
        }
        (count - self.avg_count) / std
    }

    /// Whether a current count is anomalous against this baseline.
    ///
    /// Untrusted baselines (too few observations) never flag.
    pub fn is_anomalous(&self, count: f64) -> bool {
        if self.occurrence_count < MIN_OCCURRENCES {
            return false;
        }
        self.z_score(count) > Z_THRESHOLD
    }
}
