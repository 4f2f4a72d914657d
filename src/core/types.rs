//! Core identifier types for the reconciliation engine.
//!
//! These types provide type-safe identifiers for schedule resources and the
//! jobs launched on their behalf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a schedule resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceId(String);

/// Reference to a job launched for a schedule resource.
///
/// Job identity is deterministic: a scheduled launch is named
/// `{resource}-{unix seconds of the fire-time}`, so retrying a launch for
/// the same fire-time resolves to the same job rather than a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobRef(String);

impl ResourceId {
    /// Create a new ResourceId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl JobRef {
    /// Create a JobRef from an existing name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The deterministic name of the job for a given fire-time.
    pub fn scheduled(resource: &ResourceId, fire_time: DateTime<Utc>) -> Self {
        Self(format!("{}-{}", resource.as_str(), fire_time.timestamp()))
    }

    /// Get the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for JobRef {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal or running state of a job, as reported by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// Job is still executing.
    Running,
    /// Job finished successfully.
    Succeeded,
    /// Job finished with an error.
    Failed,
}

impl JobOutcome {
    /// Whether the job has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobOutcome::Succeeded | JobOutcome::Failed)
    }
}

/// One entry of the executor's job listing for a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedJob {
    /// Reference to the job.
    pub job: JobRef,
    /// Current outcome.
    pub outcome: JobOutcome,
    /// When the job finished, if it has.
    pub finished_at: Option<DateTime<Utc>>,
}

impl ObservedJob {
    /// Create an observation for a running job.
    pub fn running(job: impl Into<JobRef>) -> Self {
        Self {
            job: job.into(),
            outcome: JobOutcome::Running,
            finished_at: None,
        }
    }

    /// Create an observation for a finished job.
    pub fn finished(
        job: impl Into<JobRef>,
        outcome: JobOutcome,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job: job.into(),
            outcome,
            finished_at: Some(finished_at),
        }
    }
}

/// Opaque job payload forwarded verbatim to the executor.
///
/// The engine never inspects the contents; each executor backend decides
/// what shape it expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobTemplate(serde_json::Value);

impl JobTemplate {
    /// Wrap a serde value as a template.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Get the underlying value.
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for JobTemplate {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}
