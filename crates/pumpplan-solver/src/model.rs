//! Integer constraint model of the pump-scheduling problem.
//!
//! All quantities entering the engine are integers: volumes stay in whole
//! m³, monetary terms are scaled by 1000 (≈0.1 cent resolution). The
//! level-dependent pump performance is deliberately frozen at the mid-range
//! level inside the model (encoding the true nonlinearity would blow up the
//! search) and every reported cost is re-evaluated with the actual level
//! after the solve.

use highs::{Col, RowProblem};
use itertools::Itertools;

use pumpplan_core::pump::{FLEET, FLEET_SIZE, PumpClass};
use pumpplan_core::tunnel::{
    DEAD_STORAGE_M3, LOW_LEVEL_VOLUME_M3, MAX_OPERATING_LEVEL_M, MAX_OPERATING_VOLUME_M3,
};
use pumpplan_core::PlanInput;

/// Length of one interval [h].
pub const INTERVAL_HOURS: f64 = 0.25;
/// Intervals per 24 h low-level window.
pub const INTERVALS_PER_DAY: usize = 96;
/// Minimum consecutive intervals a pump holds a new state (2 h).
pub const DWELL_INTERVALS: usize = 8;
/// Combined outflow cap per interval [m³] (16 000 m³/h).
pub const MAX_FLOW_PER_INTERVAL_M3: i64 = 4000;
/// A 24 h window with at most this much inflow [m³] must see the tunnel
/// emptied once.
pub const DRY_DAY_INFLOW_M3: f64 = 144_000.0;
/// Monetary scaling inside the model.
pub const MONEY_SCALE: f64 = 1000.0;
/// Level at which model-side pump performance is frozen [m]: the midpoint
/// of the operating window.
pub const MODEL_LEVEL_M: f64 = 4.0;
/// Price under which the search hint switches non-anchor pumps on [€/kWh].
const HINT_CHEAP_PRICE_EUR: f64 = 0.05;

/// Objective weights (search-steering only; never billed).
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Penalty per pump state change [€].
    pub switch_penalty_eur: f64,
    /// Penalty per hour of runtime excess over the least-used pump of the
    /// same class [€/h]. The default makes 6 h of excess cost one switch.
    pub load_balancing_weight_eur_h: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            switch_penalty_eur: 0.10,
            load_balancing_weight_eur_h: 0.01667,
        }
    }
}

/// A qualifying 24 h low-level window over volume indices `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DryWindow {
    pub start: usize,
    pub end: usize,
}

/// The immutable model data for one run: scaled coefficient tables plus the
/// validated input. Constructed once, then used to stamp out engine problems
/// (one per search round) and to verify candidate schedules.
#[derive(Debug, Clone)]
pub struct PumpModel {
    pub input: PlanInput,
    pub config: ModelConfig,
    /// Number of intervals; volume indices run `0..=n`.
    pub n: usize,
    /// `⌊V(h_init)⌋` [m³].
    pub initial_volume: i64,
    /// `⌊V(0)⌋` [m³].
    pub min_volume: i64,
    /// `⌊V(8)⌋` [m³], the operating ceiling.
    pub max_volume: i64,
    /// Top of the volume variable domain, `⌊1.5·V(8)⌋` [m³].
    pub volume_cap: i64,
    /// `⌊V(0.5)⌋` [m³], the low-level target.
    pub low_volume: i64,
    /// Model outflow per pump per on-interval [m³], at the mid-range level.
    pub q_model: [i64; FLEET_SIZE],
    /// Worst-case outflow per pump per interval [m³], at the ceiling level.
    pub q_max: [i64; FLEET_SIZE],
    /// Model power draw per pump [kW], at the mid-range level.
    pub power_model_kw: [f64; FLEET_SIZE],
    /// Scaled electricity cost of running pump `p` in interval `t`,
    /// flat-indexed `p * n + t`.
    pub energy_cost: Vec<i64>,
    /// Scaled penalty per state change.
    pub switch_cost: i64,
    /// Scaled penalty per interval of within-class runtime excess.
    pub balance_cost: i64,
    /// Integer inflow per interval [m³].
    pub inflow: Vec<i64>,
    /// Historical runtime per pump in whole intervals.
    pub initial_intervals: [i64; FLEET_SIZE],
    /// Inclusive volume-index bound for the deadline low-level visit.
    pub deadline_bound: Option<usize>,
    /// Qualifying 24 h windows requiring a low-level visit.
    pub dry_windows: Vec<DryWindow>,
}

/// Handles of the decision columns of one stamped-out problem, in insertion
/// order so that valuations can be read back positionally.
pub struct ModelColumns {
    n: usize,
    pub on: Vec<Col>,
    pub switch: Vec<Col>,
    pub volume: Vec<Col>,
}

impl ModelColumns {
    /// Flat index of `on[p][t]` in the engine's column array.
    pub fn on_index(&self, p: usize, t: usize) -> usize {
        p * self.n + t
    }

    /// Flat index of `V[t]` in the engine's column array.
    pub fn volume_index(&self, t: usize) -> usize {
        2 * FLEET_SIZE * self.n + t
    }
}

impl PumpModel {
    pub fn new(input: PlanInput, config: ModelConfig) -> Self {
        let n = input.num_intervals;

        let min_volume = DEAD_STORAGE_M3 as i64;
        let max_volume = MAX_OPERATING_VOLUME_M3 as i64;
        let volume_cap = (MAX_OPERATING_VOLUME_M3 * 1.5) as i64;
        let low_volume = LOW_LEVEL_VOLUME_M3 as i64;

        let mut q_model = [0_i64; FLEET_SIZE];
        let mut q_max = [0_i64; FLEET_SIZE];
        let mut power_model_kw = [0.0_f64; FLEET_SIZE];
        for (p, (_, class)) in FLEET.iter().enumerate() {
            let mid = class.rating(MODEL_LEVEL_M);
            let worst = class.rating(MAX_OPERATING_LEVEL_M);
            q_model[p] = (mid.flow_m3h * INTERVAL_HOURS) as i64;
            q_max[p] = (worst.flow_m3h * INTERVAL_HOURS) as i64;
            power_model_kw[p] = mid.power_kw;
        }

        let mut energy_cost = Vec::with_capacity(FLEET_SIZE * n);
        for p in 0..FLEET_SIZE {
            for t in 0..n {
                let cost =
                    (power_model_kw[p] * INTERVAL_HOURS * input.price_eur[t] * MONEY_SCALE).floor();
                energy_cost.push(cost as i64);
            }
        }

        let switch_cost = (config.switch_penalty_eur * MONEY_SCALE).floor() as i64;
        let balance_cost =
            (INTERVAL_HOURS * config.load_balancing_weight_eur_h * MONEY_SCALE).floor() as i64;

        let inflow: Vec<i64> = input.inflow_m3.iter().map(|f| *f as i64).collect();

        let mut initial_intervals = [0_i64; FLEET_SIZE];
        for (slot, state) in initial_intervals.iter_mut().zip(input.pumps.iter()) {
            *slot = state.initial_intervals();
        }

        let deadline_bound = input.deadline_intervals();

        // Horizons under 24 h carry no per-window requirement at all.
        let mut dry_windows = Vec::new();
        for k in 0..(input.horizon_hours as usize / 24) {
            let start = k * INTERVALS_PER_DAY;
            let end = (k + 1) * INTERVALS_PER_DAY;
            let window_inflow: f64 = input.inflow_m3[start..end.min(n)].iter().sum();
            if window_inflow <= DRY_DAY_INFLOW_M3 {
                dry_windows.push(DryWindow { start, end });
            }
        }

        let initial_volume = input.initial_volume_m3 as i64;

        Self {
            input,
            config,
            n,
            initial_volume,
            min_volume,
            max_volume,
            volume_cap,
            low_volume,
            q_model,
            q_max,
            power_model_kw,
            energy_cost,
            switch_cost,
            balance_cost,
            inflow,
            initial_intervals,
            deadline_bound,
            dry_windows,
        }
    }

    /// Initial-state pin for `(p, t)`: `Some(state)` inside the locked
    /// prefix, `None` once the pump is free.
    pub fn locked_state(&self, p: usize, t: usize) -> Option<bool> {
        let state = &self.input.pumps[p];
        (t < state.locked_intervals).then_some(state.on)
    }

    /// Whether the input pins pump `p` running in interval `t`.
    pub fn forced_on(&self, p: usize, t: usize) -> bool {
        self.input.forced_on[p].get(t).copied().unwrap_or(false)
    }

    /// Initial on/off state of pump `p` (the value of `on[p, -1]`).
    pub fn initial_on(&self, p: usize) -> bool {
        self.input.pumps[p].on
    }

    /// Fleet positions belonging to `class`.
    fn class_members(class: PumpClass) -> Vec<usize> {
        FLEET.iter().positions(|(_, c)| *c == class).collect()
    }

    /// Stamp out the engine problem, optionally with an integer objective
    /// cutoff row `objective ≤ cutoff` from an earlier incumbent.
    pub fn build_problem(&self, cutoff: Option<i64>) -> (RowProblem, ModelColumns) {
        let n = self.n;
        let mut pb = RowProblem::default();

        // Decision columns, in the fixed order the extraction relies on:
        // on[p][t], switch[p][t], V[t], then auxiliaries.
        let mut on = Vec::with_capacity(FLEET_SIZE * n);
        for p in 0..FLEET_SIZE {
            for t in 0..n {
                let (lb, ub) = match self.locked_state(p, t) {
                    Some(true) => (1.0, 1.0),
                    Some(false) => (0.0, 0.0),
                    None => (0.0, 1.0),
                };
                on.push(pb.add_integer_column(self.energy_cost[p * n + t] as f64, lb..=ub));
            }
        }

        let mut switch = Vec::with_capacity(FLEET_SIZE * n);
        for _ in 0..FLEET_SIZE * n {
            switch.push(pb.add_integer_column(self.switch_cost as f64, 0.0..=1.0));
        }

        let mut volume = Vec::with_capacity(n + 1);
        for _ in 0..=n {
            volume.push(
                pb.add_integer_column(0.0, self.min_volume as f64..=self.volume_cap as f64),
            );
        }

        // Within-class load balancing: a free "class minimum" column plus a
        // penalised excess column per pump. The equality rows below force
        // excess[p] = historical[p] + Σ_t on[p][t] − runMin, and the
        // nonnegative excess bound caps runMin at the true class minimum.
        let mut excess = Vec::with_capacity(FLEET_SIZE);
        let mut run_min_of = [None::<Col>; FLEET_SIZE];
        for class in [PumpClass::Small, PumpClass::Big] {
            let members = Self::class_members(class);
            let min_init = members.iter().map(|p| self.initial_intervals[*p]).min().unwrap_or(0);
            let max_init = members.iter().map(|p| self.initial_intervals[*p]).max().unwrap_or(0);
            let run_min = pb.add_integer_column(
                0.0,
                min_init as f64..=(max_init + n as i64) as f64,
            );
            for p in members {
                run_min_of[p] = Some(run_min);
            }
        }
        for p in 0..FLEET_SIZE {
            let max_excess = {
                let (_, class) = FLEET[p];
                let members = Self::class_members(class);
                let min_init = members.iter().map(|q| self.initial_intervals[*q]).min().unwrap_or(0);
                let max_init = members.iter().map(|q| self.initial_intervals[*q]).max().unwrap_or(0);
                (max_init - min_init) + n as i64
            };
            excess.push(pb.add_integer_column(self.balance_cost as f64, 0.0..=max_excess as f64));
        }

        // V[0] equals the initial stored volume.
        pb.add_row(
            self.initial_volume as f64..=self.initial_volume as f64,
            [(volume[0], 1.0)],
        );

        // Operating ceiling; the floor is the column lower bound.
        for t in 0..=n {
            pb.add_row(..=self.max_volume as f64, [(volume[t], 1.0)]);
        }

        // Volume recurrence: V[t+1] − V[t] + Σ_p q[p]·on[p][t] = inflow[t].
        for t in 0..n {
            let mut terms = Vec::with_capacity(FLEET_SIZE + 2);
            terms.push((volume[t + 1], 1.0));
            terms.push((volume[t], -1.0));
            for p in 0..FLEET_SIZE {
                terms.push((on[p * n + t], self.q_model[p] as f64));
            }
            pb.add_row(self.inflow[t] as f64..=self.inflow[t] as f64, terms);
        }

        for t in 0..n {
            // Worst-case combined outflow cap.
            let cap_terms: Vec<(Col, f64)> = (0..FLEET_SIZE)
                .map(|p| (on[p * n + t], self.q_max[p] as f64))
                .collect();
            pb.add_row(..=MAX_FLOW_PER_INTERVAL_M3 as f64, cap_terms);

            // At least one pump keeps running.
            let any_terms: Vec<(Col, f64)> =
                (0..FLEET_SIZE).map(|p| (on[p * n + t], 1.0)).collect();
            pb.add_row(1.0.., any_terms);
        }

        // Operational pins from the input.
        for p in 0..FLEET_SIZE {
            for t in 0..n {
                if self.forced_on(p, t) {
                    pb.add_row(1.0..=1.0, [(on[p * n + t], 1.0)]);
                }
            }
        }

        // Dwell: a state entered at t is held for the next 7 intervals
        // (within the horizon). At t = 0 the previous state is a constant.
        for p in 0..FLEET_SIZE {
            let init = if self.initial_on(p) { 1.0 } else { 0.0 };
            for t in 0..n {
                for d in 1..DWELL_INTERVALS {
                    if t + d >= n {
                        break;
                    }
                    let on_t = on[p * n + t];
                    let on_td = on[p * n + t + d];
                    if t == 0 {
                        // on[0] − init ≤ on[d]  and  init − on[0] + on[d] ≤ 1
                        pb.add_row(..=init, [(on_t, 1.0), (on_td, -1.0)]);
                        pb.add_row(..=1.0 - init, [(on_t, -1.0), (on_td, 1.0)]);
                    } else {
                        let on_tm1 = on[p * n + t - 1];
                        pb.add_row(..=0.0, [(on_t, 1.0), (on_tm1, -1.0), (on_td, -1.0)]);
                        pb.add_row(..=1.0, [(on_tm1, 1.0), (on_t, -1.0), (on_td, 1.0)]);
                    }
                }
            }
        }

        // switch[p][t] ≥ |on[p][t] − on[p][t−1]|.
        for p in 0..FLEET_SIZE {
            let init = if self.initial_on(p) { 1.0 } else { 0.0 };
            for t in 0..n {
                let sw = switch[p * n + t];
                let on_t = on[p * n + t];
                if t == 0 {
                    pb.add_row((-init).., [(sw, 1.0), (on_t, -1.0)]);
                    pb.add_row(init.., [(sw, 1.0), (on_t, 1.0)]);
                } else {
                    let on_tm1 = on[p * n + t - 1];
                    pb.add_row(0.0.., [(sw, 1.0), (on_t, -1.0), (on_tm1, 1.0)]);
                    pb.add_row(0.0.., [(sw, 1.0), (on_t, 1.0), (on_tm1, -1.0)]);
                }
            }
        }

        // excess[p] − Σ_t on[p][t] + runMin_class = historical[p].
        for p in 0..FLEET_SIZE {
            let mut terms = Vec::with_capacity(n + 2);
            terms.push((excess[p], 1.0));
            if let Some(run_min) = run_min_of[p] {
                terms.push((run_min, 1.0));
            }
            for t in 0..n {
                terms.push((on[p * n + t], -1.0));
            }
            let rhs = self.initial_intervals[p] as f64;
            pb.add_row(rhs..=rhs, terms);
        }

        // Low-level visits: one fresh indicator group per requirement.
        if let Some(bound) = self.deadline_bound {
            self.add_low_level_group(&mut pb, &volume, 0, bound + 1);
        }
        for window in &self.dry_windows {
            self.add_low_level_group(&mut pb, &volume, window.start, window.end);
        }

        // Incumbent cutoff: the full objective, strictly improved.
        if let Some(bound) = cutoff {
            let mut terms = Vec::with_capacity(2 * FLEET_SIZE * self.n + FLEET_SIZE);
            for p in 0..FLEET_SIZE {
                for t in 0..n {
                    let cost = self.energy_cost[p * n + t];
                    if cost != 0 {
                        terms.push((on[p * n + t], cost as f64));
                    }
                    terms.push((switch[p * n + t], self.switch_cost as f64));
                }
                terms.push((excess[p], self.balance_cost as f64));
            }
            pb.add_row(..=bound as f64, terms);
        }

        (pb, ModelColumns { n, on, switch, volume })
    }

    /// Reified low-level indicators over volume indices `start..end` with
    /// `Σ is_low ≥ 1`. `is_low[t] = 1` forces `V[t] ≤ ⌊V(0.5)⌋` through a
    /// big-M row; the reverse direction is not needed for a visit count.
    fn add_low_level_group(
        &self,
        pb: &mut RowProblem,
        volume: &[Col],
        start: usize,
        end: usize,
    ) {
        let big_m = (self.volume_cap - self.low_volume) as f64;
        let mut indicators = Vec::with_capacity(end - start);
        for t in start..end.min(volume.len()) {
            let is_low = pb.add_integer_column(0.0, 0.0..=1.0);
            pb.add_row(
                ..=self.volume_cap as f64,
                [(volume[t], 1.0), (is_low, big_m)],
            );
            indicators.push((is_low, 1.0));
        }
        if !indicators.is_empty() {
            pb.add_row(1.0.., indicators);
        }
    }

    /// Greedy warm-start schedule: hold locked states, keep the anchor pump
    /// running, add the rest only in cheap intervals. Returned as a flat
    /// `p * n + t` on-grid for the feasibility checker to vet.
    pub fn hint_grid(&self) -> Vec<bool> {
        let n = self.n;
        let mut grid = vec![false; FLEET_SIZE * n];
        for p in 0..FLEET_SIZE {
            for t in 0..n {
                grid[p * n + t] = match self.locked_state(p, t) {
                    Some(state) => state,
                    None => p == 0 || self.input.price_eur[t] < HINT_CHEAP_PRICE_EUR,
                };
            }
        }
        grid
    }
}
