//! Input document parsing and validation.
//!
//! One JSON document drives a whole run: the initial tunnel state, the
//! merged inflow/price forecast, per-pump initial statuses and optional
//! operational directives. Parsing is lenient about extras (absent pumps
//! default to off/unlocked); validation is strict about shape and domain.
//!
//! `electricityPrice` is read as cents/kWh and divided by 100 before any
//! cost arithmetic. A variant field `electricityPriceHigh` is accepted but
//! not used by the scheduler.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::pump::{
    FLEET, FLEET_SIZE, PumpId, PumpState, fleet_index, locked_intervals_from_minutes,
};
use crate::tunnel::{TunnelError, volume_from_level};

/// Intervals per hour of horizon.
pub const INTERVALS_PER_HOUR: usize = 4;

/// Everything that can be wrong about an input document.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse input document: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(
        "input holds {available} forecast records after offset {offset}, horizon needs {needed}"
    )]
    ShortItems {
        available: usize,
        needed: usize,
        offset: usize,
    },
    #[error("forecast records are not strictly 15 minutes apart at record {index}")]
    ItemSpacing { index: usize },
    #[error("negative water inflow {value} m³ at record {index}")]
    NegativeInflow { index: usize, value: f64 },
    #[error("initial water level out of range: {0}")]
    InitialLevel(#[from] TunnelError),
    #[error("negative deadline underThresholdWithinMinutes = {0}")]
    NegativeDeadline(i64),
    #[error("pump {pump}: negative lock duration {minutes} min")]
    NegativeLock { pump: PumpId, minutes: i64 },
    #[error("pump {pump}: negative historical runtime {minutes} min")]
    NegativeRuntime { pump: PumpId, minutes: i64 },
    #[error("unknown pump id {0:?} in forcedSchedules")]
    UnknownForcedPump(String),
}

/// Initial status of one pump as it appears in the input document.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpStatusRecord {
    #[serde(default)]
    pub on: bool,
    /// Minutes the initial state must be held.
    #[serde(default)]
    pub locked: i64,
    /// Cumulative historical runtime in minutes.
    #[serde(default)]
    pub total_minutes: i64,
}

/// One 15-minute forecast record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastItem {
    pub date: DateTime<Utc>,
    /// Expected inflow over the interval [m³/15 min].
    pub water_inflow: f64,
    /// Day-ahead price [cents/kWh].
    pub electricity_price: f64,
    /// High-tariff variant of the price feed; parsed but not scheduled on.
    #[serde(default)]
    pub electricity_price_high: Option<f64>,
}

/// The raw input document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastDocument {
    /// Tunnel water level at the start of the horizon [m].
    pub initial_water_level: f64,
    /// Optional deadline for the first low-level visit [min].
    #[serde(default)]
    pub under_threshold_within_minutes: Option<i64>,
    pub items: Vec<ForecastItem>,
    #[serde(rename = "pump1-1", default)]
    pub pump1_1: Option<PumpStatusRecord>,
    #[serde(rename = "pump1-2", default)]
    pub pump1_2: Option<PumpStatusRecord>,
    #[serde(rename = "pump1-3", default)]
    pub pump1_3: Option<PumpStatusRecord>,
    #[serde(rename = "pump1-4", default)]
    pub pump1_4: Option<PumpStatusRecord>,
    #[serde(rename = "pump2-1", default)]
    pub pump2_1: Option<PumpStatusRecord>,
    #[serde(rename = "pump2-2", default)]
    pub pump2_2: Option<PumpStatusRecord>,
    #[serde(rename = "pump2-3", default)]
    pub pump2_3: Option<PumpStatusRecord>,
    #[serde(rename = "pump2-4", default)]
    pub pump2_4: Option<PumpStatusRecord>,
    /// Intervals on which a pump is pinned running, keyed by dotted pump id.
    /// `true` pins the pump on; `false` leaves the interval free.
    #[serde(default)]
    pub forced_schedules: Option<BTreeMap<String, Vec<bool>>>,
}

impl ForecastDocument {
    fn pump_record(&self, id: PumpId) -> Option<&PumpStatusRecord> {
        match (id.hall, id.index) {
            (1, 1) => self.pump1_1.as_ref(),
            (1, 2) => self.pump1_2.as_ref(),
            (1, 3) => self.pump1_3.as_ref(),
            (1, 4) => self.pump1_4.as_ref(),
            (2, 1) => self.pump2_1.as_ref(),
            (2, 2) => self.pump2_2.as_ref(),
            (2, 3) => self.pump2_3.as_ref(),
            (2, 4) => self.pump2_4.as_ref(),
            _ => None,
        }
    }
}

/// Validated, trimmed input: immutable for the rest of the run.
#[derive(Debug, Clone)]
pub struct PlanInput {
    pub horizon_hours: u32,
    /// Number of 15-minute intervals, `4 * horizon_hours`.
    pub num_intervals: usize,
    pub initial_level_m: f64,
    pub initial_volume_m3: f64,
    pub under_threshold_within_minutes: Option<i64>,
    /// Interval start times, strictly increasing by 15 minutes.
    pub dates: Vec<DateTime<Utc>>,
    /// Inflow per interval [m³/15 min].
    pub inflow_m3: Vec<f64>,
    /// Price per interval [cents/kWh] as delivered by the feed.
    pub price_cents: Vec<f64>,
    /// Price per interval [€/kWh], `price_cents / 100`.
    pub price_eur: Vec<f64>,
    /// Initial state per fleet position (see [`FLEET`]).
    pub pumps: [PumpState; FLEET_SIZE],
    /// Pinned-on schedule per fleet position, trimmed to the horizon.
    pub forced_on: [Vec<bool>; FLEET_SIZE],
}

impl PlanInput {
    /// Load and validate a plan input from a JSON file.
    ///
    /// `items_offset` skips that many forecast records before the horizon
    /// window; it exists to replay documents whose records start before the
    /// intended planning origin.
    pub fn load(
        path: &Path,
        horizon_hours: u32,
        items_offset: usize,
    ) -> Result<Self, InputError> {
        let text = std::fs::read_to_string(path).map_err(|source| InputError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let doc: ForecastDocument = serde_json::from_str(&text)?;
        Self::from_document(doc, horizon_hours, items_offset)
    }

    /// Validate a parsed document and trim it to the horizon.
    pub fn from_document(
        doc: ForecastDocument,
        horizon_hours: u32,
        items_offset: usize,
    ) -> Result<Self, InputError> {
        let num_intervals = horizon_hours as usize * INTERVALS_PER_HOUR;

        let initial_volume_m3 = volume_from_level(doc.initial_water_level)?;

        if let Some(deadline) = doc.under_threshold_within_minutes {
            if deadline < 0 {
                return Err(InputError::NegativeDeadline(deadline));
            }
        }

        let available = doc.items.len().saturating_sub(items_offset);
        if available < num_intervals {
            return Err(InputError::ShortItems {
                available,
                needed: num_intervals,
                offset: items_offset,
            });
        }
        let items = &doc.items[items_offset..items_offset + num_intervals];

        let mut dates = Vec::with_capacity(num_intervals);
        let mut inflow_m3 = Vec::with_capacity(num_intervals);
        let mut price_cents = Vec::with_capacity(num_intervals);
        for (index, item) in items.iter().enumerate() {
            if item.water_inflow < 0.0 {
                return Err(InputError::NegativeInflow {
                    index: items_offset + index,
                    value: item.water_inflow,
                });
            }
            if let Some(prev) = dates.last() {
                if item.date - *prev != Duration::minutes(15) {
                    return Err(InputError::ItemSpacing {
                        index: items_offset + index,
                    });
                }
            }
            dates.push(item.date);
            inflow_m3.push(item.water_inflow);
            price_cents.push(item.electricity_price);
        }
        let price_eur: Vec<f64> = price_cents.iter().map(|c| c / 100.0).collect();

        let mut pumps = [PumpState::default(); FLEET_SIZE];
        for (slot, (id, _)) in pumps.iter_mut().zip(FLEET.iter()) {
            if let Some(record) = doc.pump_record(*id) {
                if record.locked < 0 {
                    return Err(InputError::NegativeLock {
                        pump: *id,
                        minutes: record.locked,
                    });
                }
                if record.total_minutes < 0 {
                    return Err(InputError::NegativeRuntime {
                        pump: *id,
                        minutes: record.total_minutes,
                    });
                }
                *slot = PumpState {
                    on: record.on,
                    locked_intervals: locked_intervals_from_minutes(record.locked),
                    total_minutes: record.total_minutes,
                };
            }
        }

        let mut forced_on: [Vec<bool>; FLEET_SIZE] = Default::default();
        if let Some(schedules) = &doc.forced_schedules {
            for (key, pinned) in schedules {
                let id = PumpId::parse(key)
                    .ok_or_else(|| InputError::UnknownForcedPump(key.clone()))?;
                let p = fleet_index(id).ok_or_else(|| InputError::UnknownForcedPump(key.clone()))?;
                let mut trimmed = pinned.clone();
                trimmed.truncate(num_intervals);
                forced_on[p] = trimmed;
            }
        }

        Ok(Self {
            horizon_hours,
            num_intervals,
            initial_level_m: doc.initial_water_level,
            initial_volume_m3,
            under_threshold_within_minutes: doc.under_threshold_within_minutes,
            dates,
            inflow_m3,
            price_cents,
            price_eur,
            pumps,
            forced_on,
        })
    }

    /// Deadline for the first low-level visit, as a volume index bound
    /// (inclusive), clamped to the horizon.
    pub fn deadline_intervals(&self) -> Option<usize> {
        self.under_threshold_within_minutes
            .map(|minutes| ((minutes / 15) as usize).min(self.num_intervals))
    }
}
