pub mod input;
pub mod pump;
pub mod schedule;
pub mod tunnel;

pub use input::{
    ForecastDocument, ForecastItem, INTERVALS_PER_HOUR, InputError, PlanInput, PumpStatusRecord,
};
pub use pump::{
    FLEET, FLEET_SIZE, INTERVAL_MINUTES, PumpClass, PumpId, PumpRating, PumpState, fleet_index,
    locked_intervals_from_minutes,
};
pub use schedule::{ScheduleDocument, ScheduleInterval, ScheduleStatus};
pub use tunnel::{
    DEAD_STORAGE_M3, LOW_LEVEL_M, LOW_LEVEL_VOLUME_M3, MAX_LEVEL_M, MAX_OPERATING_LEVEL_M,
    MAX_OPERATING_VOLUME_M3, TunnelError, level_from_volume, volume_from_level,
};
