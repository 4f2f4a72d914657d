//! Common test utilities shared across integration tests.

use chrono::{DateTime, TimeZone, Utc};
use recron::{JobTemplate, ScheduleSpec};

/// Fixed base instant used across scenarios.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// A minimal opaque template.
pub fn template() -> JobTemplate {
    JobTemplate::new(serde_json::json!({"command": "true"}))
}

/// A spec with the given schedule and default everything else.
pub fn spec(schedule: &str) -> ScheduleSpec {
    ScheduleSpec::new(schedule, template())
}
