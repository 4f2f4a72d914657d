//! Schedule resource data model.
//!
//! A resource pairs a desired [`ScheduleSpec`] with the observed
//! [`ScheduleStatus`] the engine evolves across reconciliation passes. The
//! spec is immutable within a pass; the status round-trips through the
//! caller between passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::schedule::{Schedule, ScheduleError};
use super::types::{JobRef, JobTemplate};

/// Completed jobs retained per resource when no explicit limit is set.
pub const DEFAULT_SUCCESSFUL_HISTORY_LIMIT: u32 = 3;

/// Failed jobs retained per resource when no explicit limit is set.
pub const DEFAULT_FAILED_HISTORY_LIMIT: u32 = 1;

/// Errors in a resource's declared configuration.
#[derive(Debug, Error)]
pub enum SpecError {
    /// Invalid schedule expression or timezone.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    /// Concurrency policy string not one of the known values.
    #[error("unrecognized concurrency policy: {0:?}")]
    UnknownPolicy(String),
}

/// Rule governing whether a new scheduled run may start while a previous
/// run is still active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    /// Runs may overlap freely.
    #[default]
    Allow,
    /// Skip the new run if a previous run is still active.
    Forbid,
    /// Cancel the active run and replace it with the new one.
    Replace,
}

impl FromStr for ConcurrencyPolicy {
    type Err = SpecError;

    /// Parse a policy string. The empty string means "unset" and defaults
    /// to `Allow`; any other unknown value is an error, never a silent
    /// fallback.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "Allow" => Ok(ConcurrencyPolicy::Allow),
            "Forbid" => Ok(ConcurrencyPolicy::Forbid),
            "Replace" => Ok(ConcurrencyPolicy::Replace),
            other => Err(SpecError::UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConcurrencyPolicy::Allow => "Allow",
            ConcurrencyPolicy::Forbid => "Forbid",
            ConcurrencyPolicy::Replace => "Replace",
        };
        write!(f, "{}", s)
    }
}

/// Desired state of a schedule resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// Cron-format schedule expression.
    pub schedule: String,
    /// IANA timezone for the schedule. Defaults to UTC.
    pub timezone: Option<String>,
    /// Maximum allowed staleness, in seconds, of a missed fire-time before
    /// it is abandoned rather than launched late. Absent means no deadline.
    pub starting_deadline_seconds: Option<u64>,
    /// Behavior when a fire-time comes due while previous runs are active.
    pub concurrency_policy: ConcurrencyPolicy,
    /// When true, no new launches are computed; status reporting and
    /// history pruning continue.
    pub suspend: bool,
    /// Opaque payload handed to the executor on launch.
    pub job_template: JobTemplate,
    /// Completed-successfully jobs to retain. Explicit 0 retains none;
    /// absent uses [`DEFAULT_SUCCESSFUL_HISTORY_LIMIT`].
    pub successful_jobs_history_limit: Option<u32>,
    /// Failed jobs to retain. Explicit 0 retains none; absent uses
    /// [`DEFAULT_FAILED_HISTORY_LIMIT`].
    pub failed_jobs_history_limit: Option<u32>,
}

impl ScheduleSpec {
    /// Create a spec with the given schedule and job template.
    pub fn new(schedule: impl Into<String>, job_template: JobTemplate) -> Self {
        Self {
            schedule: schedule.into(),
            timezone: None,
            starting_deadline_seconds: None,
            concurrency_policy: ConcurrencyPolicy::default(),
            suspend: false,
            job_template,
            successful_jobs_history_limit: None,
            failed_jobs_history_limit: None,
        }
    }

    /// Set the timezone.
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Set the starting deadline in seconds.
    pub fn with_starting_deadline_seconds(mut self, seconds: u64) -> Self {
        self.starting_deadline_seconds = Some(seconds);
        self
    }

    /// Set the concurrency policy.
    pub fn with_concurrency_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.concurrency_policy = policy;
        self
    }

    /// Set whether launches are suspended.
    pub fn with_suspend(mut self, suspend: bool) -> Self {
        self.suspend = suspend;
        self
    }

    /// Set the successful-jobs history limit.
    pub fn with_successful_jobs_history_limit(mut self, limit: u32) -> Self {
        self.successful_jobs_history_limit = Some(limit);
        self
    }

    /// Set the failed-jobs history limit.
    pub fn with_failed_jobs_history_limit(mut self, limit: u32) -> Self {
        self.failed_jobs_history_limit = Some(limit);
        self
    }

    /// Parse the declared schedule expression.
    pub fn parse_schedule(&self) -> Result<Schedule, ScheduleError> {
        match &self.timezone {
            Some(tz) => Schedule::with_timezone(&self.schedule, tz),
            None => Schedule::new(&self.schedule),
        }
    }

    /// Validate the declared configuration.
    pub fn validate(&self) -> Result<(), SpecError> {
        self.parse_schedule()?;
        Ok(())
    }

    /// Effective successful-jobs retention count.
    pub fn successful_history_limit(&self) -> u32 {
        self.successful_jobs_history_limit
            .unwrap_or(DEFAULT_SUCCESSFUL_HISTORY_LIMIT)
    }

    /// Effective failed-jobs retention count.
    pub fn failed_history_limit(&self) -> u32 {
        self.failed_jobs_history_limit
            .unwrap_or(DEFAULT_FAILED_HISTORY_LIMIT)
    }
}

/// Observed state of a schedule resource.
///
/// Created empty on first reconciliation and evolved strictly through the
/// engine's output across passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    /// Jobs currently believed running, in insertion order. The order
    /// carries no semantic weight.
    pub active: Vec<JobRef>,
    /// The most recent fire-time for which a launch was attempted.
    /// Monotonically non-decreasing once set.
    pub last_schedule_time: Option<DateTime<Utc>>,
}

impl ScheduleStatus {
    /// Create an empty status.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the given job is believed running.
    pub fn is_active(&self, job: &JobRef) -> bool {
        self.active.contains(job)
    }
}
