//! Result document written for every solve, intermediate or final.
//!
//! External visualisers poll this file while the search runs, so its shape
//! is stable: integer fields (intervals, volumes, minutes) are exact, float
//! fields carry the post-hoc level-dependent reconstruction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quality of the emitted schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    /// Proven cost-optimal.
    Optimal,
    /// Best schedule found within the deadline.
    Feasible,
    /// Best-so-far snapshot persisted while the search is still running.
    Intermediate,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Optimal => "optimal",
            Self::Feasible => "feasible",
            Self::Intermediate => "intermediate",
        }
    }
}

/// One 15-minute row of the schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInterval {
    pub interval: usize,
    pub date: DateTime<Utc>,
    /// Dotted ids of the pumps running this interval.
    pub active_pumps: Vec<String>,
    pub water_level_start_m: f64,
    pub water_level_end_m: f64,
    pub volume_start_m3: i64,
    pub volume_end_m3: i64,
    /// Model-level inflow for the interval [m³].
    pub inflow_m3: i64,
    /// Realised outflow at the actual start level [m³].
    pub outflow_m3: f64,
    pub electricity_price_cents_per_kwh: f64,
    /// Electricity cost of the interval at the actual start level [€].
    pub interval_cost_eur: f64,
}

/// The full result document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDocument {
    pub status: ScheduleStatus,
    /// Electricity cost only; search-steering penalties are not billed.
    pub total_cost_eur: f64,
    pub initial_water_level_m: f64,
    pub initial_volume_m3: i64,
    /// Historical plus planned runtime per pump [min], keyed by dotted id.
    pub pump_total_minutes: BTreeMap<String, i64>,
    pub schedule: Vec<ScheduleInterval>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ScheduleStatus::Intermediate).unwrap(),
            "\"intermediate\""
        );
        assert_eq!(ScheduleStatus::Optimal.as_str(), "optimal");
    }

    #[test]
    fn test_document_round_trip() {
        let doc = ScheduleDocument {
            status: ScheduleStatus::Feasible,
            total_cost_eur: 123.45,
            initial_water_level_m: 4.0,
            initial_volume_m3: 32750,
            pump_total_minutes: BTreeMap::from([("1.1".to_string(), 660)]),
            schedule: vec![ScheduleInterval {
                interval: 0,
                date: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
                active_pumps: vec!["1.1".to_string()],
                water_level_start_m: 4.0,
                water_level_end_m: 3.99,
                volume_start_m3: 32750,
                volume_end_m3: 32721,
                inflow_m3: 500,
                outflow_m3: 529.65,
                electricity_price_cents_per_kwh: 8.0,
                interval_cost_eur: 3.825,
            }],
        };
        let json = serde_json::to_string_pretty(&doc).unwrap();
        let back: ScheduleDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, ScheduleStatus::Feasible);
        assert_eq!(back.schedule.len(), 1);
        assert_eq!(back.schedule[0].volume_end_m3, 32721);
        assert_eq!(back.pump_total_minutes["1.1"], 660);
    }
}
