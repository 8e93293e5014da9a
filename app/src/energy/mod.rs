mod measurement;
mod reconcile;
mod reconciler;
mod source;

use std::fmt::Display;

use serde::Deserialize;

use crate::core::time::{DateTime, DateTimeRange, Duration};

pub use reconciler::EnergyReconciler;
pub use source::EnergySource;

/// Energy consumed by one room in one sampling interval.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyMeasurement {
    pub timestamp: DateTime,
    pub room_id: String,
    pub energy_wh: f64,
}

/// Measurements of one home for one fetch window.
#[derive(Debug, Clone)]
pub struct EnergyBatch {
    pub home_id: String,
    pub window: DateTimeRange,
    pub measurements: Vec<EnergyMeasurement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyCategory {
    Heating,
    HotWater,
}

impl Display for EnergyCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnergyCategory::Heating => write!(f, "heating"),
            EnergyCategory::HotWater => write!(f, "hot_water"),
        }
    }
}

pub fn statistic_id(prefix: &str, category: EnergyCategory, home_id: &str, room_id: &str) -> String {
    format!("{}:energy_{}_{}_{}", prefix, category, home_id, room_id)
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnergyConfig {
    #[serde(default = "default_lookback")]
    pub lookback: Duration,
    #[serde(default = "default_query_margin")]
    pub query_margin: Duration,
    #[serde(default = "default_drift_tolerance")]
    pub drift_tolerance_wh: f64,
    #[serde(default = "default_statistic_prefix")]
    pub statistic_prefix: String,
}

fn default_lookback() -> Duration {
    Duration::hours(12)
}

fn default_query_margin() -> Duration {
    Duration::hours(24)
}

fn default_drift_tolerance() -> f64 {
    1.0
}

fn default_statistic_prefix() -> String {
    "muller_intuis".to_owned()
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            lookback: default_lookback(),
            query_margin: default_query_margin(),
            drift_tolerance_wh: default_drift_tolerance(),
            statistic_prefix: default_statistic_prefix(),
        }
    }
}
