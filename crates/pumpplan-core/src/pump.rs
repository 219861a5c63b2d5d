//! Pump fleet catalog.
//!
//! Eight drainage pumps in two halls empty the tunnel. Two performance
//! classes exist; both are characterised by linear power/flow curves over the
//! static lift `30 − h`, with `h` the tunnel water level.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of pumps in the fleet.
pub const FLEET_SIZE: usize = 8;

/// Minutes per scheduling interval.
pub const INTERVAL_MINUTES: i64 = 15;

/// Performance class of a drainage pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PumpClass {
    Small,
    Big,
}

/// Operating point of a pump at a given water level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpRating {
    pub power_kw: f64,
    pub flow_m3h: f64,
}

impl PumpClass {
    /// Rating at water level `h` [m above the tunnel floor].
    pub fn rating(self, h: f64) -> PumpRating {
        let lift = 30.0 - h;
        match self {
            Self::Small => PumpRating {
                power_kw: -(15.0 / 8.0) * lift + 240.0,
                flow_m3h: (-(83.0 / 4.0) * lift + 1128.0) * 3.6,
            },
            Self::Big => PumpRating {
                power_kw: -(43.0 / 15.0) * lift + 4269.0 / 10.0,
                flow_m3h: (-(110.0 / 3.0) * lift + 2080.0) * 3.6,
            },
        }
    }
}

impl fmt::Display for PumpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Big => write!(f, "big"),
        }
    }
}

/// Stable pump identifier: hall number and index within the hall.
///
/// Rendered as `"1.1"`..`"2.4"`; the input document keys the same pump as
/// `"pump1-1"`..`"pump2-4"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PumpId {
    pub hall: u8,
    pub index: u8,
}

impl PumpId {
    pub const fn new(hall: u8, index: u8) -> Self {
        Self { hall, index }
    }

    /// Key of this pump in the input document (`"pump1-1"`).
    pub fn json_key(&self) -> String {
        format!("pump{}-{}", self.hall, self.index)
    }

    /// Parse the dotted form (`"1.1"`); `None` for anything outside the
    /// fixed fleet.
    pub fn parse(s: &str) -> Option<Self> {
        let (hall, index) = s.split_once('.')?;
        let hall: u8 = hall.parse().ok()?;
        let index: u8 = index.parse().ok()?;
        let id = Self::new(hall, index);
        FLEET.iter().any(|(fleet_id, _)| *fleet_id == id).then_some(id)
    }
}

impl fmt::Display for PumpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.hall, self.index)
    }
}

/// The fixed fleet: two halls of four, one small pump per hall.
pub const FLEET: [(PumpId, PumpClass); FLEET_SIZE] = [
    (PumpId::new(1, 1), PumpClass::Small),
    (PumpId::new(1, 2), PumpClass::Big),
    (PumpId::new(1, 3), PumpClass::Big),
    (PumpId::new(1, 4), PumpClass::Big),
    (PumpId::new(2, 1), PumpClass::Small),
    (PumpId::new(2, 2), PumpClass::Big),
    (PumpId::new(2, 3), PumpClass::Big),
    (PumpId::new(2, 4), PumpClass::Big),
];

/// Position of `id` in [`FLEET`].
pub fn fleet_index(id: PumpId) -> Option<usize> {
    FLEET.iter().position(|(fleet_id, _)| *fleet_id == id)
}

/// Initial state of one pump, taken from the input document.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PumpState {
    /// Running at the start of the horizon.
    pub on: bool,
    /// Number of leading intervals during which the initial state is held.
    pub locked_intervals: usize,
    /// Cumulative historical runtime [min], the load-balancing reference.
    pub total_minutes: i64,
}

impl PumpState {
    /// Historical runtime expressed in whole intervals (nearest).
    pub fn initial_intervals(&self) -> i64 {
        (self.total_minutes as f64 / INTERVAL_MINUTES as f64).round() as i64
    }
}

/// Convert a lock duration in minutes to intervals, rounding up.
pub fn locked_intervals_from_minutes(minutes: i64) -> usize {
    ((minutes + INTERVAL_MINUTES - 1) / INTERVAL_MINUTES).max(0) as usize
}
