//! Local process-spawning executor backend.
//!
//! Interprets the opaque job template as a command description and runs
//! each launch as a child process, tracking outcomes and finish times for
//! the engine to observe.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{oneshot, RwLock};

use super::{ExecutorError, JobExecutor};
use crate::core::clock::Clock;
use crate::core::types::{JobOutcome, JobRef, JobTemplate, ObservedJob, ResourceId};

/// The template shape this backend expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTemplate {
    /// Program to execute.
    pub command: String,
    /// Command arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables for the child process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

/// Per-job execution record.
struct JobRecord {
    outcome: JobOutcome,
    finished_at: Option<DateTime<Utc>>,
    /// Present while the job is running; consumed to cancel it.
    cancel: Option<oneshot::Sender<()>>,
}

/// Executor that runs jobs as local child processes.
pub struct ProcessExecutor {
    clock: Arc<dyn Clock>,
    jobs: Arc<RwLock<HashMap<ResourceId, HashMap<JobRef, JobRecord>>>>,
}

impl ProcessExecutor {
    /// Create a new process executor.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn parse_template(template: &JobTemplate) -> Result<CommandTemplate, ExecutorError> {
        serde_json::from_value(template.as_value().clone())
            .map_err(|e| ExecutorError::InvalidTemplate(e.to_string()))
    }
}

#[async_trait]
impl JobExecutor for ProcessExecutor {
    async fn launch(
        &self,
        resource: &ResourceId,
        job: &JobRef,
        template: &JobTemplate,
    ) -> Result<(), ExecutorError> {
        let command = Self::parse_template(template)?;

        let mut jobs = self.jobs.write().await;
        let resource_jobs = jobs.entry(resource.clone()).or_default();

        // Launching is idempotent per job name
        if resource_jobs.contains_key(job) {
            tracing::debug!(resource = %resource, job = %job, "job already exists, launch is a no-op");
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        resource_jobs.insert(
            job.clone(),
            JobRecord {
                outcome: JobOutcome::Running,
                finished_at: None,
                cancel: Some(cancel_tx),
            },
        );
        drop(jobs);

        let clock = Arc::clone(&self.clock);
        let records = Arc::clone(&self.jobs);
        let resource = resource.clone();
        let job = job.clone();

        tokio::spawn(async move {
            let outcome = run_command(&resource, &job, &command, cancel_rx).await;

            let mut jobs = records.write().await;
            if let Some(record) = jobs.get_mut(&resource).and_then(|r| r.get_mut(&job)) {
                record.outcome = outcome;
                record.finished_at = Some(clock.now());
                record.cancel = None;
            }
        });

        Ok(())
    }

    async fn cancel(&self, resource: &ResourceId, job: &JobRef) -> Result<(), ExecutorError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(resource)
            .and_then(|r| r.get_mut(job))
            .ok_or_else(|| ExecutorError::JobNotFound(job.clone()))?;

        match record.cancel.take() {
            Some(tx) => {
                // A dropped receiver means the job finished in the meantime;
                // either way there is nothing left to cancel.
                let _ = tx.send(());
                Ok(())
            }
            None => {
                tracing::debug!(resource = %resource, job = %job, "cancel of already-finished job");
                Ok(())
            }
        }
    }

    async fn list_jobs(&self, resource: &ResourceId) -> Result<Vec<ObservedJob>, ExecutorError> {
        let jobs = self.jobs.read().await;
        let mut observed: Vec<ObservedJob> = jobs
            .get(resource)
            .map(|records| {
                records
                    .iter()
                    .map(|(job, record)| ObservedJob {
                        job: job.clone(),
                        outcome: record.outcome,
                        finished_at: record.finished_at,
                    })
                    .collect()
            })
            .unwrap_or_default();
        observed.sort_by(|a, b| a.job.as_str().cmp(b.job.as_str()));
        Ok(observed)
    }

    async fn delete(&self, resource: &ResourceId, job: &JobRef) -> Result<(), ExecutorError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(resource)
            .and_then(|r| r.remove(job))
            .ok_or_else(|| ExecutorError::JobNotFound(job.clone()))?;

        // Deleting a still-running job aborts it
        if let Some(tx) = record.cancel {
            let _ = tx.send(());
        }
        Ok(())
    }
}

/// Run the child process to completion or cancellation.
async fn run_command(
    resource: &ResourceId,
    job: &JobRef,
    template: &CommandTemplate,
    cancel_rx: oneshot::Receiver<()>,
) -> JobOutcome {
    let mut cmd = Command::new(&template.command);
    cmd.args(&template.args);
    for (key, value) in &template.env {
        cmd.env(key, value);
    }
    if let Some(ref dir) = template.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    // Dropping the in-flight future on cancellation must take the child
    // process with it.
    cmd.kill_on_drop(true);

    tokio::select! {
        output = cmd.output() => match output {
            Ok(output) if output.status.success() => {
                tracing::info!(resource = %resource, job = %job, "job succeeded");
                JobOutcome::Succeeded
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                tracing::warn!(
                    resource = %resource,
                    job = %job,
                    code = output.status.code().unwrap_or(-1),
                    stderr = %stderr.trim(),
                    "job failed"
                );
                JobOutcome::Failed
            }
            Err(e) => {
                tracing::warn!(resource = %resource, job = %job, error = %e, "job could not be started");
                JobOutcome::Failed
            }
        },
        _ = cancel_rx => {
            tracing::info!(resource = %resource, job = %job, "job cancelled");
            JobOutcome::Failed
        }
    }
}
