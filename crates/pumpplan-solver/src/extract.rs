//! Solution extraction: from a verified valuation to the result document.
//!
//! The constraint model runs on mid-range pump performance; here every
//! interval is re-evaluated at the actual solved water level, so the
//! reported flows and costs are the level-dependent ones. The billed total
//! is electricity only: the switching and balancing penalties steer the
//! search but are never charged.

use std::collections::BTreeMap;

use pumpplan_core::pump::{FLEET, INTERVAL_MINUTES};
use pumpplan_core::{ScheduleDocument, ScheduleInterval, ScheduleStatus, level_from_volume};

use crate::check::CheckedSchedule;
use crate::model::{INTERVAL_HOURS, PumpModel};

/// Build the result document for a verified schedule.
pub fn build_document(
    model: &PumpModel,
    schedule: &CheckedSchedule,
    status: ScheduleStatus,
) -> ScheduleDocument {
    let n = model.n;
    let mut rows = Vec::with_capacity(n);
    let mut total_cost_eur = 0.0;

    for t in 0..n {
        let volume_start = schedule.volume[t];
        let volume_end = schedule.volume[t + 1];
        let level_start = level_from_volume(volume_start as f64);
        let level_end = level_from_volume(volume_end as f64);

        let mut active_pumps = Vec::new();
        let mut outflow_m3 = 0.0;
        let mut interval_cost_eur = 0.0;
        for (p, (id, class)) in FLEET.iter().enumerate() {
            if schedule.on[p * n + t] {
                let rating = class.rating(level_start);
                active_pumps.push(id.to_string());
                outflow_m3 += rating.flow_m3h * INTERVAL_HOURS;
                interval_cost_eur += rating.power_kw * INTERVAL_HOURS * model.input.price_eur[t];
            }
        }
        total_cost_eur += interval_cost_eur;

        rows.push(ScheduleInterval {
            interval: t,
            date: model.input.dates[t],
            active_pumps,
            water_level_start_m: level_start,
            water_level_end_m: level_end,
            volume_start_m3: volume_start,
            volume_end_m3: volume_end,
            inflow_m3: model.inflow[t],
            outflow_m3,
            electricity_price_cents_per_kwh: model.input.price_cents[t],
            interval_cost_eur,
        });
    }

    let mut pump_total_minutes = BTreeMap::new();
    for (p, (id, _)) in FLEET.iter().enumerate() {
        let planned_minutes = schedule.run_intervals[p] * INTERVAL_MINUTES;
        pump_total_minutes.insert(
            id.to_string(),
            model.input.pumps[p].total_minutes + planned_minutes,
        );
    }

    ScheduleDocument {
        status,
        total_cost_eur,
        initial_water_level_m: model.input.initial_level_m,
        initial_volume_m3: model.initial_volume,
        pump_total_minutes,
        schedule: rows,
    }
}
