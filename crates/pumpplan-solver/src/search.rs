//! Search driver: anytime optimisation under a wall-clock deadline.
//!
//! The engine is invoked in wall-clock slices of the emission interval.
//! Every validated incumbent tightens an integer objective cutoff
//! (`objective ≤ best − 1`) for the next slice, so each round either finds a
//! strictly better schedule, proves the incumbent optimal (the cutoff makes
//! the problem infeasible), or runs out of its slice and is retried. The
//! deadline bounds the whole loop; the best validated incumbent survives it.

use std::time::{Duration, Instant};

use highs::{HighsModelStatus, Sense};
use thiserror::Error;
use tracing::{debug, info};

use pumpplan_core::pump::{FLEET, FLEET_SIZE};

use crate::check::{CheckedSchedule, ConstraintFamily, ScheduleViolation, check_schedule};
use crate::emit::{DEFAULT_EMIT_INTERVAL, Emitter};
use crate::model::{ModelColumns, PumpModel};

/// Engine configuration for one run.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Wall-clock budget for the whole search.
    pub deadline: Duration,
    /// Engine worker threads.
    pub threads: u32,
    /// Floor between two intermediate emissions; also the slice length.
    pub emit_interval: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(120),
            threads: 8,
            emit_interval: DEFAULT_EMIT_INTERVAL,
        }
    }
}

/// Terminal quality of a successful search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven: no strictly cheaper schedule exists.
    Optimal,
    /// Deadline reached with a valid incumbent in hand.
    Feasible,
}

/// A successful search with its best schedule.
#[derive(Debug)]
pub struct Solved {
    pub status: SolveStatus,
    pub schedule: CheckedSchedule,
    /// Engine invocations performed.
    pub rounds: u32,
    /// Validated improving incumbents seen (including a hint seed).
    pub incumbents: u32,
}

/// Why the search produced no schedule.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("no schedule satisfies all constraints")]
    Infeasible,
    #[error("no schedule satisfies all constraints: {0} cannot hold")]
    InfeasibleConstraint(ConstraintFamily),
    #[error("solver deadline elapsed before any feasible schedule was found")]
    NoIncumbent,
    #[error("engine accepted a schedule the verifier rejects: {0}")]
    InvalidIncumbent(ScheduleViolation),
    #[error("engine returned unexpected status {0:?}")]
    Engine(HighsModelStatus),
}

/// Run the anytime search. Improving incumbents are pushed through
/// `emitter` (throttled) when one is supplied.
pub fn solve(
    model: &PumpModel,
    config: &SearchConfig,
    mut emitter: Option<&mut Emitter>,
) -> Result<Solved, SolveError> {
    let started = Instant::now();

    precheck(model)?;

    let mut incumbents = 0_u32;
    let mut best: Option<CheckedSchedule> = match check_schedule(model, &model.hint_grid()) {
        Ok(seed) => {
            info!(objective = seed.objective, "hint schedule is feasible, seeding incumbent");
            incumbents += 1;
            Some(seed)
        }
        Err(violation) => {
            debug!(%violation, "hint schedule rejected");
            None
        }
    };
    if let (Some(em), Some(seed)) = (emitter.as_deref_mut(), best.as_ref()) {
        em.maybe_emit(model, seed);
    }

    let mut rounds = 0_u32;
    // Every round restarts the branch-and-bound, so barren rounds double the
    // next slice: short slices keep emissions flowing early, long ones let a
    // hard proof run to the deadline.
    let mut slice_scale = 0_u32;
    loop {
        let elapsed = started.elapsed();
        if elapsed >= config.deadline {
            break;
        }
        let slice = (config.deadline - elapsed)
            .min(config.emit_interval * (1_u32 << slice_scale.min(16)));
        rounds += 1;

        let cutoff = best.as_ref().map(|b| b.objective - 1);
        let (problem, columns) = model.build_problem(cutoff);
        let mut engine = problem.optimise(Sense::Minimise);
        engine.set_option("threads", config.threads as i32);
        engine.set_option("parallel", "on");
        engine.set_option("presolve", "on");
        engine.set_option("time_limit", slice.as_secs_f64());
        // bias the branch-and-bound towards producing incumbents early
        engine.set_option("mip_heuristic_effort", 0.2);
        engine.set_option("output_flag", tracing::enabled!(tracing::Level::DEBUG));

        let solved = engine.solve();
        match solved.status() {
            HighsModelStatus::Optimal => {
                let grid = round_on_grid(model, &columns, solved.get_solution().columns());
                let checked =
                    check_schedule(model, &grid).map_err(SolveError::InvalidIncumbent)?;
                incumbents += 1;
                debug!(
                    objective = checked.objective,
                    rounds, "engine proved optimality"
                );
                if let Some(em) = emitter.as_deref_mut() {
                    em.maybe_emit(model, &checked);
                }
                // optimal under a strict-improvement cutoff is a global optimum
                return Ok(Solved {
                    status: SolveStatus::Optimal,
                    schedule: checked,
                    rounds,
                    incumbents,
                });
            }
            HighsModelStatus::Infeasible | HighsModelStatus::UnboundedOrInfeasible => {
                return match best {
                    // nothing beats the incumbent: the cutoff emptied the space
                    Some(schedule) => Ok(Solved {
                        status: SolveStatus::Optimal,
                        schedule,
                        rounds,
                        incumbents,
                    }),
                    None => Err(SolveError::Infeasible),
                };
            }
            HighsModelStatus::ReachedTimeLimit => {
                // the engine may hold a partial or stale buffer here, so the
                // incumbent only counts once the verifier re-derives it
                let solution = solved.get_solution();
                let grid = round_on_grid(model, &columns, solution.columns());
                let mut improved = false;
                if let Ok(checked) = check_schedule(model, &grid) {
                    improved = best.as_ref().is_none_or(|b| checked.objective < b.objective);
                    if improved {
                        debug!(
                            objective = checked.objective,
                            rounds, "improving incumbent at slice boundary"
                        );
                        incumbents += 1;
                        if let Some(em) = emitter.as_deref_mut() {
                            em.maybe_emit(model, &checked);
                        }
                        best = Some(checked);
                    }
                }
                // keep the best-so-far snapshot on disk even across barren
                // slices; the throttle deduplicates
                if let (Some(em), Some(b)) = (emitter.as_deref_mut(), best.as_ref()) {
                    em.maybe_emit(model, b);
                }
                slice_scale = if improved { 0 } else { slice_scale + 1 };
            }
            status => return Err(SolveError::Engine(status)),
        }
    }

    match best {
        Some(schedule) => Ok(Solved {
            status: SolveStatus::Feasible,
            schedule,
            rounds,
            incumbents,
        }),
        None => Err(SolveError::NoIncumbent),
    }
}

/// Cheap structural checks that let infeasibility diagnostics name the
/// offending constraint family before the engine ever runs.
fn precheck(model: &PumpModel) -> Result<(), SolveError> {
    if model.initial_volume < model.min_volume || model.initial_volume > model.max_volume {
        return Err(SolveError::InfeasibleConstraint(
            ConstraintFamily::VolumeBounds,
        ));
    }
    for p in 0..FLEET_SIZE {
        for t in 0..model.n {
            if model.locked_state(p, t) == Some(false) && model.forced_on(p, t) {
                debug!(pump = %FLEET[p].0, interval = t, "lock contradicts forced schedule");
                return Err(SolveError::InfeasibleConstraint(
                    ConstraintFamily::ForcedSchedule,
                ));
            }
        }
    }
    Ok(())
}

/// Round the engine's on-columns back to a boolean grid.
fn round_on_grid(model: &PumpModel, columns: &ModelColumns, values: &[f64]) -> Vec<bool> {
    let n = model.n;
    let mut grid = vec![false; FLEET_SIZE * n];
    for p in 0..FLEET_SIZE {
        for t in 0..n {
            grid[p * n + t] = values
                .get(columns.on_index(p, t))
                .copied()
                .unwrap_or(0.0)
                > 0.5;
        }
    }
    grid
}
