//! Anytime persistence of the best-so-far schedule.
//!
//! External visualisers poll the result file while the search runs, so a
//! half-written document must never be observable: every write goes to a
//! temporary file in the same directory and is moved over the target in one
//! rename. Emission failures are logged and swallowed; a slow or broken
//! disk must not abort the search.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use pumpplan_core::{ScheduleDocument, ScheduleStatus};

use crate::check::CheckedSchedule;
use crate::extract::build_document;
use crate::model::PumpModel;

/// Default floor between two emissions.
pub const DEFAULT_EMIT_INTERVAL: Duration = Duration::from_secs(5);

/// Write `doc` to `path` atomically (temp file + rename).
pub fn write_document(path: &Path, doc: &ScheduleDocument) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(doc)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Throttled sink for improving incumbents.
///
/// Emission takes `&mut self`: the file replace is a critical section and
/// exclusivity is enforced by the borrow. The throttle clock starts at
/// construction, so even the first incumbent waits out one full interval.
pub struct Emitter {
    path: PathBuf,
    min_interval: Duration,
    last_emit: Instant,
    emitted: u32,
}

impl Emitter {
    pub fn new(path: PathBuf, min_interval: Duration) -> Self {
        Self {
            path,
            min_interval,
            last_emit: Instant::now(),
            emitted: 0,
        }
    }

    /// Number of snapshots written so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    /// Persist `schedule` as an intermediate snapshot unless the previous
    /// emission was less than the throttle interval ago.
    pub fn maybe_emit(&mut self, model: &PumpModel, schedule: &CheckedSchedule) {
        if self.last_emit.elapsed() < self.min_interval {
            return;
        }
        self.last_emit = Instant::now();
        let doc = build_document(model, schedule, ScheduleStatus::Intermediate);
        match write_document(&self.path, &doc) {
            Ok(()) => {
                self.emitted += 1;
                debug!(
                    path = %self.path.display(),
                    objective = schedule.objective,
                    "intermediate schedule persisted"
                );
            }
            Err(error) => {
                warn!(
                    path = %self.path.display(),
                    %error,
                    "failed to persist intermediate schedule, search continues"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::check_schedule;
    use crate::model::{ModelConfig, PumpModel};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use pumpplan_core::pump::FLEET_SIZE;
    use pumpplan_core::{ForecastDocument, ForecastItem, PlanInput};

    fn model() -> PumpModel {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let doc = ForecastDocument {
            initial_water_level: 4.0,
            under_threshold_within_minutes: None,
            items: (0..8)
                .map(|i| ForecastItem {
                    date: start + ChronoDuration::minutes(15 * i as i64),
                    water_inflow: 529.0,
                    electricity_price: 5.0,
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
        };
        let input = PlanInput::from_document(doc, 2, 0).unwrap();
        PumpModel::new(input, ModelConfig::default())
    }

    fn anchor_schedule(model: &PumpModel) -> crate::check::CheckedSchedule {
        let mut grid = vec![false; FLEET_SIZE * model.n];
        for t in 0..model.n {
            grid[t] = true;
        }
        check_schedule(model, &grid).unwrap()
    }

    #[test]
    fn test_throttle_blocks_immediate_emission() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimization_result.json");
        let model = model();
        let schedule = anchor_schedule(&model);

        let mut emitter = Emitter::new(path.clone(), Duration::from_secs(60));
        emitter.maybe_emit(&model, &schedule);
        assert_eq!(emitter.emitted(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_emits_after_interval_and_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimization_result.json");
        let model = model();
        let schedule = anchor_schedule(&model);

        let mut emitter = Emitter::new(path.clone(), Duration::ZERO);
        emitter.maybe_emit(&model, &schedule);
        assert_eq!(emitter.emitted(), 1);

        let text = fs::read_to_string(&path).unwrap();
        let doc: ScheduleDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(doc.status, ScheduleStatus::Intermediate);
        assert_eq!(doc.schedule.len(), model.n);
        // the temp file never lingers
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_write_document_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let model = model();
        let schedule = anchor_schedule(&model);
        let doc = build_document(&model, &schedule, ScheduleStatus::Optimal);

        write_document(&path, &doc).unwrap();
        let back: ScheduleDocument =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.status, ScheduleStatus::Optimal);
        assert_eq!(back.initial_volume_m3, doc.initial_volume_m3);
    }
}
