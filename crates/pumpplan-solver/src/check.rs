//! Candidate-schedule verification.
//!
//! The engine's valuations are never trusted blindly: every incumbent is
//! re-derived from its on/off grid (volume trajectory, switch counts,
//! objective) and checked against the full constraint set. The same checker
//! vets the search hint and backs the property assertions of the test suite.

use std::fmt;

use pumpplan_core::pump::{FLEET, FLEET_SIZE, PumpClass};

use crate::model::{DWELL_INTERVALS, MAX_FLOW_PER_INTERVAL_M3, PumpModel};

/// Constraint families, the unit of infeasibility diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintFamily {
    VolumeBounds,
    MinimumPumps,
    MaxFlow,
    Dwell,
    InitialLock,
    ForcedSchedule,
    LowLevelWindow,
    DeadlineVisit,
}

impl fmt::Display for ConstraintFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::VolumeBounds => "volume bounds",
            Self::MinimumPumps => "minimum running pumps",
            Self::MaxFlow => "maximum combined outflow",
            Self::Dwell => "minimum on/off dwell",
            Self::InitialLock => "initial state lock",
            Self::ForcedSchedule => "forced schedule",
            Self::LowLevelWindow => "daily low-level visit",
            Self::DeadlineVisit => "deadline low-level visit",
        };
        write!(f, "{name}")
    }
}

/// A concrete violation found in a candidate schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleViolation {
    pub family: ConstraintFamily,
    /// Interval (or volume index) at which the violation was detected.
    pub interval: usize,
    /// Offending fleet position, where one pump is at fault.
    pub pump: Option<usize>,
}

impl fmt::Display for ScheduleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pump {
            Some(p) => write!(
                f,
                "{} violated at interval {} (pump {})",
                self.family, self.interval, FLEET[p].0
            ),
            None => write!(f, "{} violated at interval {}", self.family, self.interval),
        }
    }
}

/// A verified schedule with its derived quantities.
#[derive(Debug, Clone)]
pub struct CheckedSchedule {
    /// On/off grid, flat-indexed `p * n + t`.
    pub on: Vec<bool>,
    /// Volume trajectory under the model flow, length `n + 1`.
    pub volume: Vec<i64>,
    /// Planned running intervals per pump.
    pub run_intervals: [i64; FLEET_SIZE],
    /// State changes per pump, counted against the initial state.
    pub switch_count: [u32; FLEET_SIZE],
    /// Scaled search objective (electricity + switching + balancing).
    pub objective: i64,
}

/// Verify `on` (flat `p * n + t`) against every model constraint and derive
/// the volume trajectory and objective. Returns the first violation found.
pub fn check_schedule(
    model: &PumpModel,
    on: &[bool],
) -> Result<CheckedSchedule, ScheduleViolation> {
    let n = model.n;
    debug_assert_eq!(on.len(), FLEET_SIZE * n);

    // Initial locks and operational pins.
    for p in 0..FLEET_SIZE {
        for t in 0..n {
            if let Some(state) = model.locked_state(p, t) {
                if on[p * n + t] != state {
                    return Err(ScheduleViolation {
                        family: ConstraintFamily::InitialLock,
                        interval: t,
                        pump: Some(p),
                    });
                }
            }
            if model.forced_on(p, t) && !on[p * n + t] {
                return Err(ScheduleViolation {
                    family: ConstraintFamily::ForcedSchedule,
                    interval: t,
                    pump: Some(p),
                });
            }
        }
    }

    // Per-interval fleet constraints.
    for t in 0..n {
        let mut running = 0;
        let mut worst_case_flow = 0;
        for p in 0..FLEET_SIZE {
            if on[p * n + t] {
                running += 1;
                worst_case_flow += model.q_max[p];
            }
        }
        if running == 0 {
            return Err(ScheduleViolation {
                family: ConstraintFamily::MinimumPumps,
                interval: t,
                pump: None,
            });
        }
        if worst_case_flow > MAX_FLOW_PER_INTERVAL_M3 {
            return Err(ScheduleViolation {
                family: ConstraintFamily::MaxFlow,
                interval: t,
                pump: None,
            });
        }
    }

    // Dwell: each state change holds for the following 7 intervals.
    for p in 0..FLEET_SIZE {
        let mut prev = model.initial_on(p);
        for t in 0..n {
            let state = on[p * n + t];
            if state != prev {
                for d in 1..DWELL_INTERVALS {
                    if t + d >= n {
                        break;
                    }
                    if on[p * n + t + d] != state {
                        return Err(ScheduleViolation {
                            family: ConstraintFamily::Dwell,
                            interval: t,
                            pump: Some(p),
                        });
                    }
                }
            }
            prev = state;
        }
    }

    // Volume trajectory under the model flow, with bounds.
    let mut volume = Vec::with_capacity(n + 1);
    volume.push(model.initial_volume);
    for t in 0..n {
        let outflow: i64 = (0..FLEET_SIZE)
            .filter(|p| on[p * n + t])
            .map(|p| model.q_model[p])
            .sum();
        volume.push(volume[t] + model.inflow[t] - outflow);
    }
    for (t, v) in volume.iter().enumerate() {
        if *v < model.min_volume || *v > model.max_volume {
            return Err(ScheduleViolation {
                family: ConstraintFamily::VolumeBounds,
                interval: t,
                pump: None,
            });
        }
    }

    // Low-level visits.
    if let Some(bound) = model.deadline_bound {
        if !volume[..=bound].iter().any(|v| *v <= model.low_volume) {
            return Err(ScheduleViolation {
                family: ConstraintFamily::DeadlineVisit,
                interval: bound,
                pump: None,
            });
        }
    }
    for window in &model.dry_windows {
        if !volume[window.start..window.end]
            .iter()
            .any(|v| *v <= model.low_volume)
        {
            return Err(ScheduleViolation {
                family: ConstraintFamily::LowLevelWindow,
                interval: window.start,
                pump: None,
            });
        }
    }

    // Derived quantities and the scaled objective.
    let mut run_intervals = [0_i64; FLEET_SIZE];
    let mut switch_count = [0_u32; FLEET_SIZE];
    let mut objective = 0_i64;
    for p in 0..FLEET_SIZE {
        let mut prev = model.initial_on(p);
        for t in 0..n {
            let state = on[p * n + t];
            if state {
                run_intervals[p] += 1;
                objective += model.energy_cost[p * n + t];
            }
            if state != prev {
                switch_count[p] += 1;
                objective += model.switch_cost;
            }
            prev = state;
        }
    }
    for class in [PumpClass::Small, PumpClass::Big] {
        let adjusted: Vec<i64> = FLEET
            .iter()
            .enumerate()
            .filter(|(_, (_, c))| *c == class)
            .map(|(p, _)| model.initial_intervals[p] + run_intervals[p])
            .collect();
        if let Some(min) = adjusted.iter().min() {
            let excess: i64 = adjusted.iter().map(|a| a - min).sum();
            objective += model.balance_cost * excess;
        }
    }

    Ok(CheckedSchedule {
        on: on.to_vec(),
        volume,
        run_intervals,
        switch_count,
        objective,
    })
}
