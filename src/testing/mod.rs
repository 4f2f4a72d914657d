//! Testing utilities for users of the recron library.
//!
//! This module provides helpers for testing reconciliation:
//!
//! - [`MockExecutor`]: a scriptable executor that records every request
//!   and lets tests pre-seed observed jobs and inject failures
//! - [`crate::core::clock::FixedClock`] (re-exported from the core) pairs
//!   with it for deterministic time

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::core::types::{JobOutcome, JobRef, JobTemplate, ObservedJob, ResourceId};
use crate::executor::{ExecutorError, JobExecutor};

/// A scriptable in-memory executor.
///
/// Records every launch/cancel/delete request for assertions. Observed
/// jobs can be pre-seeded, and each operation can be made to fail on
/// demand to exercise error paths.
///
/// # Example
///
/// ```ignore
/// let executor = MockExecutor::new();
/// let id = ResourceId::new("report");
/// executor.seed_running(&id, "report-1").await;
///
/// // ... reconcile ...
///
/// assert_eq!(executor.launched().await.len(), 1);
/// ```
pub struct MockExecutor {
    jobs: RwLock<HashMap<ResourceId, Vec<ObservedJob>>>,
    launched: RwLock<Vec<(ResourceId, JobRef, JobTemplate)>>,
    cancelled: RwLock<Vec<(ResourceId, JobRef)>>,
    deleted: RwLock<Vec<(ResourceId, JobRef)>>,
    fail_launch: AtomicBool,
    fail_cancel: AtomicBool,
    fail_delete: AtomicBool,
    fail_list: AtomicBool,
}

impl MockExecutor {
    /// Create a new mock with no jobs and no failures configured.
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            launched: RwLock::new(Vec::new()),
            cancelled: RwLock::new(Vec::new()),
            deleted: RwLock::new(Vec::new()),
            fail_launch: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_list: AtomicBool::new(false),
        }
    }

    /// Pre-seed a running job into the observed listing.
    pub async fn seed_running(&self, resource: &ResourceId, job: impl Into<JobRef>) {
        self.jobs
            .write()
            .await
            .entry(resource.clone())
            .or_default()
            .push(ObservedJob::running(job));
    }

    /// Pre-seed a finished job into the observed listing.
    pub async fn seed_finished(
        &self,
        resource: &ResourceId,
        job: impl Into<JobRef>,
        outcome: JobOutcome,
        finished_at: DateTime<Utc>,
    ) {
        self.jobs
            .write()
            .await
            .entry(resource.clone())
            .or_default()
            .push(ObservedJob::finished(job, outcome, finished_at));
    }

    /// Mark a previously observed job as finished.
    pub async fn finish_job(
        &self,
        resource: &ResourceId,
        job: &JobRef,
        outcome: JobOutcome,
        finished_at: DateTime<Utc>,
    ) {
        if let Some(jobs) = self.jobs.write().await.get_mut(resource) {
            if let Some(entry) = jobs.iter_mut().find(|j| &j.job == job) {
                entry.outcome = outcome;
                entry.finished_at = Some(finished_at);
            }
        }
    }

    /// Every launch request recorded so far.
    pub async fn launched(&self) -> Vec<(ResourceId, JobRef, JobTemplate)> {
        self.launched.read().await.clone()
    }

    /// Every cancel request recorded so far.
    pub async fn cancelled(&self) -> Vec<(ResourceId, JobRef)> {
        self.cancelled.read().await.clone()
    }

    /// Every delete request recorded so far.
    pub async fn deleted(&self) -> Vec<(ResourceId, JobRef)> {
        self.deleted.read().await.clone()
    }

    /// Make launch requests fail.
    pub fn set_fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    /// Make cancel requests fail.
    pub fn set_fail_cancel(&self, fail: bool) {
        self.fail_cancel.store(fail, Ordering::SeqCst);
    }

    /// Make delete requests fail.
    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Make listing fail.
    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for MockExecutor {
    async fn launch(
        &self,
        resource: &ResourceId,
        job: &JobRef,
        template: &JobTemplate,
    ) -> Result<(), ExecutorError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(ExecutorError::LaunchFailed {
                job: job.clone(),
                reason: "injected launch error".into(),
            });
        }

        let mut jobs = self.jobs.write().await;
        let resource_jobs = jobs.entry(resource.clone()).or_default();

        // Idempotent per job name, like real backends
        if !resource_jobs.iter().any(|j| &j.job == job) {
            resource_jobs.push(ObservedJob::running(job.clone()));
            self.launched
                .write()
                .await
                .push((resource.clone(), job.clone(), template.clone()));
        }
        Ok(())
    }

    async fn cancel(&self, resource: &ResourceId, job: &JobRef) -> Result<(), ExecutorError> {
        if self.fail_cancel.load(Ordering::SeqCst) {
            return Err(ExecutorError::CancelFailed {
                job: job.clone(),
                reason: "injected cancel error".into(),
            });
        }

        let mut jobs = self.jobs.write().await;
        let resource_jobs = jobs
            .get_mut(resource)
            .ok_or_else(|| ExecutorError::JobNotFound(job.clone()))?;
        let before = resource_jobs.len();
        resource_jobs.retain(|j| &j.job != job);
        if resource_jobs.len() == before {
            return Err(ExecutorError::JobNotFound(job.clone()));
        }

        self.cancelled
            .write()
            .await
            .push((resource.clone(), job.clone()));
        Ok(())
    }

    async fn list_jobs(&self, resource: &ResourceId) -> Result<Vec<ObservedJob>, ExecutorError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ExecutorError::Other("injected list error".into()));
        }
        Ok(self
            .jobs
            .read()
            .await
            .get(resource)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, resource: &ResourceId, job: &JobRef) -> Result<(), ExecutorError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ExecutorError::DeleteFailed {
                job: job.clone(),
                reason: "injected delete error".into(),
            });
        }

        let mut jobs = self.jobs.write().await;
        let resource_jobs = jobs
            .get_mut(resource)
            .ok_or_else(|| ExecutorError::JobNotFound(job.clone()))?;
        let before = resource_jobs.len();
        resource_jobs.retain(|j| &j.job != job);
        if resource_jobs.len() == before {
            return Err(ExecutorError::JobNotFound(job.clone()));
        }

        self.deleted
            .write()
            .await
            .push((resource.clone(), job.clone()));
        Ok(())
    }
}
