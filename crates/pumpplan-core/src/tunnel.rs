//! Storage tunnel geometry.
//!
//! The tunnel cross-section changes along the height, so the stored volume is
//! a piecewise closed form of the water level. The inverse (level from
//! volume) has no closed form and is resolved by bisection; it is only used
//! for presentation, never inside the constraint model.

use thiserror::Error;

/// Top of the geometric design range [m].
pub const MAX_LEVEL_M: f64 = 14.1;
/// Upper bound of the normal operating window [m].
pub const MAX_OPERATING_LEVEL_M: f64 = 8.0;
/// Level below which the tunnel counts as emptied [m].
pub const LOW_LEVEL_M: f64 = 0.5;
/// Dead storage below the first geometry break [m³].
pub const DEAD_STORAGE_M3: f64 = 350.0;
/// Stored volume at the top of the operating window [m³], `V(8.0)`.
pub const MAX_OPERATING_VOLUME_M3: f64 = 133_725.0;
/// Stored volume at the low-level target [m³], `V(0.5)`.
pub const LOW_LEVEL_VOLUME_M3: f64 = 375.0;

/// Segment breaks of the piecewise volume curve [m].
const BREAK_FLAT_M: f64 = 0.4;
const BREAK_PARABOLIC_M: f64 = 6.0;
const BREAK_LINEAR_M: f64 = 8.7;

/// Bisection tolerance of the numeric inverse [m].
const INVERSE_TOLERANCE_M: f64 = 1e-3;

/// Water level outside the tunnel's design range.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum TunnelError {
    #[error("water level {0} m is below the tunnel floor")]
    LevelBelowFloor(f64),
    #[error("water level {0} m exceeds the design range ({MAX_LEVEL_M} m)")]
    LevelAboveRange(f64),
}

/// Closed-form segment evaluation. Callers guarantee `0 <= h <= 14.1`.
fn volume_unchecked(h: f64) -> f64 {
    if h <= BREAK_FLAT_M {
        DEAD_STORAGE_M3
    } else if h <= BREAK_PARABOLIC_M {
        ((1000.0 * (h - 0.4).powi(2)) / 2.0) * 5.0 + 350.0
    } else if h <= BREAK_LINEAR_M {
        5500.0 * (h - 5.9) * 5.0 + 75975.0
    } else {
        (5.5 * 5500.0 / 2.0 - (5.5 - (h - 8.6)).powi(2) * 1000.0 / 2.0) * 5.0 + 150225.0
    }
}

/// Stored volume [m³] at water level `h` [m above the tunnel floor].
pub fn volume_from_level(h: f64) -> Result<f64, TunnelError> {
    if h < 0.0 {
        return Err(TunnelError::LevelBelowFloor(h));
    }
    if h > MAX_LEVEL_M {
        return Err(TunnelError::LevelAboveRange(h));
    }
    Ok(volume_unchecked(h))
}

/// Water level [m] holding `volume` [m³], found by bisection over the full
/// design range. Anything at or below the dead storage maps to the floor.
pub fn level_from_volume(volume: f64) -> f64 {
    if volume <= DEAD_STORAGE_M3 {
        return 0.0;
    }
    let mut low = 0.0_f64;
    let mut high = MAX_LEVEL_M;
    while high - low > INVERSE_TOLERANCE_M {
        let mid = (low + high) / 2.0;
        if volume_unchecked(mid) < volume {
            low = mid;
        } else {
            high = mid;
        }
    }
    (low + high) / 2.0
}
