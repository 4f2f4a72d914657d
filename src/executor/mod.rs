//! Job execution abstraction.
//!
//! The engine decides launches, cancellations, and deletions; a
//! [`JobExecutor`] carries them out. This module provides the trait plus a
//! local process-spawning backend.

mod process;

pub use process::{CommandTemplate, ProcessExecutor};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::types::{JobRef, JobTemplate, ObservedJob, ResourceId};

/// Errors that can occur during executor operations.
///
/// Executor errors are transient from the engine's point of view: the
/// requested operation is considered not-yet-done and is retried on a later
/// pass.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Launching the job failed.
    #[error("launch failed for {job}: {reason}")]
    LaunchFailed {
        /// The job that could not be launched.
        job: JobRef,
        /// Backend-specific detail.
        reason: String,
    },

    /// Cancelling the job failed.
    #[error("cancel failed for {job}: {reason}")]
    CancelFailed {
        /// The job that could not be cancelled.
        job: JobRef,
        /// Backend-specific detail.
        reason: String,
    },

    /// Deleting the job record failed.
    #[error("delete failed for {job}: {reason}")]
    DeleteFailed {
        /// The job that could not be deleted.
        job: JobRef,
        /// Backend-specific detail.
        reason: String,
    },

    /// The referenced job is unknown to the executor.
    #[error("job not found: {0}")]
    JobNotFound(JobRef),

    /// The opaque template is not in the shape this backend expects.
    #[error("invalid job template: {0}")]
    InvalidTemplate(String),

    /// Generic executor error.
    #[error("executor error: {0}")]
    Other(String),
}

/// Backend that runs jobs on behalf of schedule resources.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Launch a job under the given identity.
    ///
    /// Launching is idempotent per job name: if a job with this name
    /// already exists for the resource, the call succeeds without starting
    /// a second one. This is what makes fire-time-keyed launch retries
    /// safe.
    async fn launch(
        &self,
        resource: &ResourceId,
        job: &JobRef,
        template: &JobTemplate,
    ) -> Result<(), ExecutorError>;

    /// Cancel a running job.
    async fn cancel(&self, resource: &ResourceId, job: &JobRef) -> Result<(), ExecutorError>;

    /// List every job known for a resource, with its current outcome.
    async fn list_jobs(&self, resource: &ResourceId) -> Result<Vec<ObservedJob>, ExecutorError>;

    /// Delete a job's record.
    async fn delete(&self, resource: &ResourceId, job: &JobRef) -> Result<(), ExecutorError>;
}
