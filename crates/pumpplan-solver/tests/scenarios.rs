//! End-to-end scenarios for the scheduling engine.
//!
//! Each scenario drives the full pipeline (input → model → search →
//! document) and holds every emitted schedule against the universal
//! invariants. Horizons are kept as short as each scenario permits so the
//! suite solves quickly.
//!
//! Two of the classic operator scenarios are stated here in their feasible
//! form: with at least one pump always running and the 350 m³ floor in
//! force, a literally idle (zero-inflow) day and a 3 h emptying order from
//! 7 m are provably unsatisfiable, and the suite asserts exactly that.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use pumpplan_core::pump::{FLEET, FLEET_SIZE, PumpClass, PumpId, fleet_index};
use pumpplan_core::{
    ForecastDocument, ForecastItem, PlanInput, PumpStatusRecord, ScheduleDocument,
};
use pumpplan_solver::{
    ModelConfig, PumpModel, SearchConfig, SolveError, Solved, build_document, solve,
};

const DWELL: usize = 8;
const MAX_FLOW: i64 = 4000;

fn forecast(
    hours: u32,
    level: f64,
    inflow: impl Fn(usize) -> f64,
    price_cents: impl Fn(usize) -> f64,
) -> ForecastDocument {
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    ForecastDocument {
        initial_water_level: level,
        under_threshold_within_minutes: None,
        items: (0..hours as usize * 4)
            .map(|i| ForecastItem {
                date: start + ChronoDuration::minutes(15 * i as i64),
                water_inflow: inflow(i),
                electricity_price: price_cents(i),
                electricity_price_high: None,
            })
            .collect(),
        pump1_1: None,
        pump1_2: None,
        pump1_3: None,
        pump1_4: None,
        pump2_1: None,
        pump2_2: None,
        pump2_3: None,
        pump2_4: None,
        forced_schedules: None,
    }
}

fn model_from(doc: ForecastDocument, hours: u32, config: ModelConfig) -> PumpModel {
    let input = PlanInput::from_document(doc, hours, 0).unwrap();
    PumpModel::new(input, config)
}

fn run(model: &PumpModel, deadline_secs: u64) -> Result<Solved, SolveError> {
    let config = SearchConfig {
        deadline: Duration::from_secs(deadline_secs),
        ..SearchConfig::default()
    };
    solve(model, &config, None)
}

fn run_document(model: &PumpModel, deadline_secs: u64) -> (Solved, ScheduleDocument) {
    let solved = run(model, deadline_secs).expect("scenario should be feasible");
    let doc = build_document(model, &solved.schedule, pumpplan_core::ScheduleStatus::Feasible);
    assert_document_invariants(model, &doc);
    (solved, doc)
}

/// Rebuild the on/off grid of a document (flat `p * n + t`).
fn grid_of(doc: &ScheduleDocument, n: usize) -> Vec<bool> {
    let mut grid = vec![false; FLEET_SIZE * n];
    for (t, row) in doc.schedule.iter().enumerate() {
        for id in &row.active_pumps {
            let p = fleet_index(PumpId::parse(id).expect("valid pump id")).unwrap();
            grid[p * n + t] = true;
        }
    }
    grid
}

/// The universal invariants every emitted schedule must satisfy.
fn assert_document_invariants(model: &PumpModel, doc: &ScheduleDocument) {
    let n = model.n;
    assert_eq!(doc.schedule.len(), n, "schedule length");

    // dates strictly increase by 15 minutes
    for pair in doc.schedule.windows(2) {
        assert_eq!(pair[1].date - pair[0].date, ChronoDuration::minutes(15));
    }

    let grid = grid_of(doc, n);

    // volume recurrence under model flow, continuity, and bounds
    for (t, row) in doc.schedule.iter().enumerate() {
        let outflow: i64 = (0..FLEET_SIZE)
            .filter(|p| grid[p * n + t])
            .map(|p| model.q_model[p])
            .sum();
        assert_eq!(
            row.volume_end_m3,
            row.volume_start_m3 + row.inflow_m3 - outflow,
            "volume recurrence at t={t}"
        );
        if t + 1 < n {
            assert_eq!(row.volume_end_m3, doc.schedule[t + 1].volume_start_m3);
        }
        for v in [row.volume_start_m3, row.volume_end_m3] {
            assert!(
                (model.min_volume..=model.max_volume).contains(&v),
                "volume {v} out of bounds at t={t}"
            );
        }

        // at least one pump, worst-case flow cap
        assert!(!row.active_pumps.is_empty(), "no pump running at t={t}");
        let worst_case: i64 = (0..FLEET_SIZE)
            .filter(|p| grid[p * n + t])
            .map(|p| model.q_max[p])
            .sum();
        assert!(worst_case <= MAX_FLOW, "flow cap exceeded at t={t}");
    }

    // initial locks
    for p in 0..FLEET_SIZE {
        let state = model.input.pumps[p];
        for t in 0..state.locked_intervals.min(n) {
            assert_eq!(grid[p * n + t], state.on, "lock violated for pump {p} at t={t}");
        }
    }

    // dwell: no state change is followed by another within 8 intervals
    for p in 0..FLEET_SIZE {
        let mut prev = model.input.pumps[p].on;
        let mut last_change: Option<usize> = None;
        for t in 0..n {
            let state = grid[p * n + t];
            if state != prev {
                if let Some(previous) = last_change {
                    assert!(
                        t - previous >= DWELL,
                        "pump {p} changed at {previous} and again at {t}"
                    );
                }
                last_change = Some(t);
            }
            prev = state;
        }
    }

    // low-level visits per qualifying window and deadline
    let mut volume = Vec::with_capacity(n + 1);
    volume.push(doc.schedule[0].volume_start_m3);
    for row in &doc.schedule {
        volume.push(row.volume_end_m3);
    }
    for window in &model.dry_windows {
        assert!(
            volume[window.start..window.end]
                .iter()
                .any(|v| *v <= model.low_volume),
            "no low-level visit in window starting at {}",
            window.start
        );
    }
    if let Some(bound) = model.deadline_bound {
        assert!(
            volume[..=bound].iter().any(|v| *v <= model.low_volume),
            "no low-level visit before the deadline"
        );
    }

    // billed cost: level-dependent electricity only, consistent with rows
    assert!(doc.total_cost_eur >= 0.0);
    let mut recomputed_total = 0.0;
    for (t, row) in doc.schedule.iter().enumerate() {
        let level = pumpplan_core::level_from_volume(row.volume_start_m3 as f64);
        let mut cost = 0.0;
        for (p, (_, class)) in FLEET.iter().enumerate() {
            if grid[p * n + t] {
                cost += class.rating(level).power_kw * 0.25 * model.input.price_eur[t];
            }
        }
        assert!(
            (cost - row.interval_cost_eur).abs() <= 1e-6 * cost.abs().max(1.0),
            "interval cost mismatch at t={t}"
        );
        recomputed_total += cost;
    }
    assert!(
        (recomputed_total - doc.total_cost_eur).abs()
            <= 1e-6 * recomputed_total.abs().max(1.0),
        "total cost mismatch"
    );

    // runtime accounting
    for (p, (id, _)) in FLEET.iter().enumerate() {
        let planned = (0..n).filter(|t| grid[p * n + t]).count() as i64 * 15;
        assert_eq!(
            doc.pump_total_minutes[&id.to_string()],
            model.input.pumps[p].total_minutes + planned,
            "runtime accounting for pump {id}"
        );
    }
}

#[test]
fn quiet_day_hovers_at_low_level() {
    // Tunnel already emptied, inflow matching one small pump: the fleet
    // idles on small pumps and the daily low-level requirement is met
    // throughout.
    let model = model_from(forecast(24, 0.5, |_| 529.0, |_| 5.0), 24, ModelConfig::default());
    assert_eq!(model.dry_windows.len(), 1);
    let (solved, doc) = run_document(&model, 60);
    assert!(solved.incumbents >= 1);

    let n = model.n;
    let grid = grid_of(&doc, n);

    // some pump runs at least one full dwell block
    let has_dwell_block = (0..FLEET_SIZE).any(|p| {
        (0..=n - DWELL).any(|t0| (t0..t0 + DWELL).all(|t| grid[p * n + t]))
    });
    assert!(has_dwell_block);

    // a quiet day costs roughly one small pump at 5 c/kWh:
    // 185 kW · 0.25 h · 0.05 €/kWh · 96 intervals ≈ €222
    assert!(
        doc.total_cost_eur > 210.0 && doc.total_cost_eur < 235.0,
        "cost {}",
        doc.total_cost_eur
    );
}

#[test]
fn zero_inflow_cannot_hold_the_floor() {
    // With at least one pump always running, a fully dry day drains the
    // tunnel through the 350 m³ floor long before the horizon ends.
    let model = model_from(forecast(24, 4.0, |_| 0.0, |_| 5.0), 24, ModelConfig::default());
    assert!(matches!(run(&model, 60), Err(SolveError::Infeasible)));
}

#[test]
fn inflow_above_pumping_capacity_is_infeasible() {
    // 4000 m³ per interval exceeds what any cap-respecting pump set can
    // move, so a tunnel starting at the ceiling must overflow.
    let model = model_from(forecast(2, 8.0, |_| 4000.0, |_| 5.0), 2, ModelConfig::default());
    assert!(matches!(run(&model, 60), Err(SolveError::Infeasible)));
}

#[test]
fn heavy_inflow_respects_flow_cap() {
    // 3000 m³ per interval is movable, but only by combinations whose
    // worst-case flow stays under the cap; the oracle checks every row.
    let model = model_from(forecast(6, 7.0, |_| 3000.0, |_| 5.0), 6, ModelConfig::default());
    let (_, doc) = run_document(&model, 60);
    // no single pump keeps up with this inflow on average
    assert!(doc.schedule.iter().any(|row| row.active_pumps.len() >= 2));
}

#[test]
fn locked_pump_holds_its_initial_state() {
    let mut doc = forecast(6, 4.0, |_| 529.0, |_| 5.0);
    doc.pump1_2 = Some(PumpStatusRecord { on: true, locked: 30, total_minutes: 0 });
    let model = model_from(doc, 6, ModelConfig::default());
    let (_, result) = run_document(&model, 30);

    // 30 min rounds up to two pinned intervals
    for t in 0..2 {
        assert!(
            result.schedule[t].active_pumps.contains(&"1.2".to_string()),
            "pump 1.2 not running in locked interval {t}"
        );
    }
}

#[test]
fn price_step_shifts_pumping_into_cheap_hours() {
    // 12 h cheap, 12 h expensive, and a 32 000 m³ backlog that must be
    // drained some time during the day (low-level window): the drain work
    // lands in the cheap half, the expensive half idles on a single pump.
    let model = model_from(
        forecast(24, 4.0, |_| 1000.0, |t| if t < 48 { 2.0 } else { 30.0 }),
        24,
        ModelConfig::default(),
    );
    let (_, doc) = run_document(&model, 120);

    let n = model.n;
    let grid = grid_of(&doc, n);
    let active_in = |range: std::ops::Range<usize>| -> usize {
        range
            .map(|t| (0..FLEET_SIZE).filter(|p| grid[p * n + t]).count())
            .sum()
    };
    let cheap = active_in(0..48);
    let expensive = active_in(48..96);
    assert!(
        cheap > expensive,
        "expected pumping concentrated in cheap hours ({cheap} vs {expensive})"
    );

    // the switch penalty keeps the plan calm
    let total_switches: u32 = {
        let mut count = 0;
        for p in 0..FLEET_SIZE {
            let mut prev = model.input.pumps[p].on;
            for t in 0..n {
                if grid[p * n + t] != prev {
                    count += 1;
                }
                prev = grid[p * n + t];
            }
        }
        count
    };
    assert!(total_switches <= 3 * FLEET_SIZE as u32, "switches {total_switches}");
}

#[test]
fn emptying_deadline_is_met() {
    // Order: empty within 3 h. Starting at 2 m with inflow matching one
    // small pump there is a dwell-respecting drain down to the target.
    let mut doc = forecast(6, 2.0, |_| 529.0, |_| 5.0);
    doc.under_threshold_within_minutes = Some(180);
    doc.pump1_1 = Some(PumpStatusRecord { on: true, locked: 0, total_minutes: 0 });
    doc.pump1_2 = Some(PumpStatusRecord { on: true, locked: 0, total_minutes: 0 });
    let model = model_from(doc, 6, ModelConfig::default());
    assert_eq!(model.deadline_bound, Some(12));
    let (_, result) = run_document(&model, 60);

    let min_early = result.schedule[..12]
        .iter()
        .flat_map(|row| [row.volume_start_m3, row.volume_end_m3])
        .min()
        .unwrap();
    assert!(min_early <= model.low_volume, "min volume {min_early}");
}

#[test]
fn emptying_deadline_from_high_level_is_infeasible() {
    // From 7 m (≈106 000 m³) no cap-respecting fleet can reach the
    // low-level target within 12 intervals.
    let mut doc = forecast(6, 7.0, |_| 500.0, |_| 5.0);
    doc.under_threshold_within_minutes = Some(180);
    let model = model_from(doc, 6, ModelConfig::default());
    assert!(matches!(run(&model, 60), Err(SolveError::Infeasible)));
}

#[test]
fn historic_runtime_shifts_work_to_fresh_pumps() {
    // Two identical heavy days, except that pump 1.2 starts the second one
    // with 100 h on the clock: its planned runtime must drop.
    let config = ModelConfig {
        switch_penalty_eur: 0.10,
        load_balancing_weight_eur_h: 0.20,
    };
    let heavy = || forecast(24, 4.0, |_| 2800.0, |_| 5.0);

    let fresh_model = model_from(heavy(), 24, config.clone());
    assert!(fresh_model.dry_windows.is_empty(), "rainy day skips the visit rule");
    let (_, fresh_doc) = run_document(&fresh_model, 90);
    let fresh_planned = fresh_doc.pump_total_minutes["1.2"];

    let mut worn = heavy();
    worn.pump1_2 = Some(PumpStatusRecord { on: false, locked: 0, total_minutes: 6000 });
    let worn_model = model_from(worn, 24, config);
    let (_, worn_doc) = run_document(&worn_model, 90);
    let worn_planned = worn_doc.pump_total_minutes["1.2"] - 6000;

    assert!(
        worn_planned < fresh_planned,
        "worn pump planned {worn_planned} min, fresh planned {fresh_planned} min"
    );
}

#[test]
fn forced_schedule_keeps_pump_running() {
    let mut doc = forecast(6, 4.0, |_| 529.0, |_| 5.0);
    let mut pinned = vec![false; 16];
    for slot in pinned.iter_mut().skip(8) {
        *slot = true;
    }
    doc.forced_schedules = Some(BTreeMap::from([("2.2".to_string(), pinned)]));
    let model = model_from(doc, 6, ModelConfig::default());
    let (_, result) = run_document(&model, 30);

    for t in 8..16 {
        assert!(
            result.schedule[t].active_pumps.contains(&"2.2".to_string()),
            "pump 2.2 not running in pinned interval {t}"
        );
    }
}

#[test]
fn big_pumps_beat_small_pumps_on_efficiency() {
    // sanity anchor for the class split used throughout the scenarios
    for h in [0.5, 4.0, 8.0] {
        let small = PumpClass::Small.rating(h);
        let big = PumpClass::Big.rating(h);
        assert!(big.power_kw / big.flow_m3h < small.power_kw / small.flow_m3h);
    }
}
