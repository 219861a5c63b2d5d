pub mod check;
pub mod emit;
pub mod extract;
pub mod model;
pub mod search;

pub use check::{CheckedSchedule, ConstraintFamily, ScheduleViolation, check_schedule};
pub use emit::{DEFAULT_EMIT_INTERVAL, Emitter, write_document};
pub use extract::build_document;
pub use model::{DryWindow, ModelConfig, PumpModel};
pub use search::{SearchConfig, SolveError, SolveStatus, Solved, solve};
