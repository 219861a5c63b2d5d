//! Command-line orchestrator: load the forecast document, build the
//! constraint model, run the anytime search, write the schedule document.
//!
//! Exit code 0 means an optimal or feasible schedule was written; any input,
//! domain, infeasibility or I/O problem exits 1 with a diagnostic.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use itertools::Itertools;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pumpplan_core::pump::FLEET;
use pumpplan_core::{PlanInput, ScheduleStatus, level_from_volume};
use pumpplan_solver::{
    DEFAULT_EMIT_INTERVAL, Emitter, ModelConfig, PumpModel, SearchConfig, SolveStatus,
    build_document, solve, write_document,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Least-cost pump schedule for the storage tunnel", long_about = None)]
struct Cli {
    /// Path to the forecast/price/initial-state JSON document
    input: PathBuf,

    /// Optimization horizon in hours
    #[arg(long, default_value_t = 48, value_parser = clap::value_parser!(u32).range(1..=168))]
    horizon_hours: u32,

    /// Penalty per pump state change in € (steers the search, never billed)
    #[arg(long, default_value_t = 0.10)]
    switch_penalty: f64,

    /// Load-balancing weight in € per hour of within-class runtime excess
    #[arg(long, default_value_t = 0.01667)]
    load_balancing_weight: f64,

    /// Solver wall-clock budget in seconds
    #[arg(long, default_value_t = 120, value_parser = clap::value_parser!(u64).range(1..=600))]
    deadline_seconds: u64,

    /// Solver worker threads
    #[arg(long, default_value_t = 8)]
    threads: u32,

    /// Skip this many forecast records before the horizon window
    #[arg(long, default_value_t = 0)]
    items_offset: usize,

    /// Result document path
    #[arg(long, default_value = "optimization_result.json")]
    output: PathBuf,

    /// Set the logging level
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the flag when set.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    tracing::info!(
        input = %cli.input.display(),
        horizon_hours = cli.horizon_hours,
        items_offset = cli.items_offset,
        "loading forecast document"
    );
    let input = PlanInput::load(&cli.input, cli.horizon_hours, cli.items_offset)
        .with_context(|| format!("failed to load {}", cli.input.display()))?;

    tracing::info!(
        intervals = input.num_intervals,
        initial_level_m = input.initial_level_m,
        initial_volume_m3 = input.initial_volume_m3,
        "forecast loaded"
    );
    for (state, (id, class)) in input.pumps.iter().zip(FLEET.iter()) {
        if state.on || state.locked_intervals > 0 || state.total_minutes > 0 {
            tracing::info!(
                pump = %id,
                class = %class,
                on = state.on,
                locked_intervals = state.locked_intervals,
                total_minutes = state.total_minutes,
                "initial pump state"
            );
        }
    }

    let model = PumpModel::new(
        input,
        ModelConfig {
            switch_penalty_eur: cli.switch_penalty,
            load_balancing_weight_eur_h: cli.load_balancing_weight,
        },
    );
    tracing::info!(
        switch_penalty_eur = cli.switch_penalty,
        load_balancing_weight_eur_h = cli.load_balancing_weight,
        dry_windows = model.dry_windows.len(),
        deadline_visit = ?model.deadline_bound,
        "model built"
    );

    let search = SearchConfig {
        deadline: Duration::from_secs(cli.deadline_seconds),
        threads: cli.threads,
        emit_interval: DEFAULT_EMIT_INTERVAL,
    };
    let mut emitter = Emitter::new(cli.output.clone(), DEFAULT_EMIT_INTERVAL);
    let solved = solve(&model, &search, Some(&mut emitter)).context("optimization failed")?;

    let status = match solved.status {
        SolveStatus::Optimal => ScheduleStatus::Optimal,
        SolveStatus::Feasible => ScheduleStatus::Feasible,
    };
    let doc = build_document(&model, &solved.schedule, status);
    write_document(&cli.output, &doc)
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    log_summary(&model, &solved, &doc);
    tracing::info!(
        status = status.as_str(),
        output = %cli.output.display(),
        "schedule written"
    );
    Ok(())
}

/// End-of-run statistics: costs, final tunnel state, per-pump usage.
fn log_summary(
    model: &PumpModel,
    solved: &pumpplan_solver::Solved,
    doc: &pumpplan_core::ScheduleDocument,
) {
    tracing::info!(
        "total electricity cost €{:.2} (search objective with penalties €{:.2}, {} rounds, {} incumbents)",
        doc.total_cost_eur,
        solved.schedule.objective as f64 / 1000.0,
        solved.rounds,
        solved.incumbents,
    );

    if let Some(final_volume) = solved.schedule.volume.last() {
        tracing::info!(
            "tunnel at end of horizon: {:.2} m ({} m³), started at {:.2} m ({} m³)",
            level_from_volume(*final_volume as f64),
            final_volume,
            model.input.initial_level_m,
            model.initial_volume,
        );
    }

    let horizon_hours = model.input.horizon_hours as f64;
    for (p, (id, _)) in FLEET.iter().enumerate() {
        let hours_on = solved.schedule.run_intervals[p] as f64 * 0.25;
        let total_minutes =
            model.input.pumps[p].total_minutes + solved.schedule.run_intervals[p] * 15;
        tracing::info!(
            "pump {id}: {hours_on:.2} h on ({:.1}%), {} state changes, total {:.2} h",
            100.0 * hours_on / horizon_hours,
            solved.schedule.switch_count[p],
            total_minutes as f64 / 60.0,
        );
    }

    for row in &doc.schedule {
        tracing::debug!(
            "t={:3}: pumps={:<20} level {:.2}m→{:.2}m in={} out={:.0} price={:.1}c cost=€{:.2}",
            row.interval,
            row.active_pumps.iter().join(","),
            row.water_level_start_m,
            row.water_level_end_m,
            row.inflow_m3,
            row.outflow_m3,
            row.electricity_price_cents_per_kwh,
            row.interval_cost_eur,
        );
    }
}
