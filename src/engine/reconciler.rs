//! The per-pass reconciliation decision function.
//!
//! One call is one pass: given a resource's spec, its prior status, the
//! executor's current job listing, and a clock reading, decide which
//! executor requests to make and what the status becomes. The function is
//! pure and stateless between calls; all persistent state lives with the
//! caller.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use super::{gate, pruner};
use super::gate::GateDecision;
use crate::core::resource::{ScheduleSpec, ScheduleStatus};
use crate::core::schedule::ScheduleError;
use crate::core::types::{JobRef, JobTemplate, ObservedJob, ResourceId};

/// Errors that abort a reconciliation pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The resource's declared schedule cannot be evaluated. Persistent
    /// until the spec changes.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    /// The supplied clock reading precedes the last recorded schedule
    /// time. The status is never moved backward; the caller should retry
    /// once the clock is sane again.
    #[error("clock regression: now {now} precedes last schedule time {last}")]
    ClockRegression {
        /// The last recorded schedule time.
        last: DateTime<Utc>,
        /// The clock reading handed to this pass.
        now: DateTime<Utc>,
    },
}

/// Input to one reconciliation pass.
#[derive(Debug)]
pub struct ReconcileRequest<'a> {
    /// The resource being reconciled.
    pub resource: &'a ResourceId,
    /// Desired state.
    pub spec: &'a ScheduleSpec,
    /// Status as of the previous pass.
    pub status: &'a ScheduleStatus,
    /// When the resource was created. Used as the evaluation floor before
    /// any launch has been recorded.
    pub created_at: DateTime<Utc>,
    /// The executor's current job listing for this resource. Must be read
    /// before the pass so the concurrency decision sees fresh completions.
    pub observed: &'a [ObservedJob],
    /// Clock reading for this pass.
    pub now: DateTime<Utc>,
}

/// An executor request decided by a pass, to be carried out by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Launch a job for the given fire-time.
    Launch {
        /// Deterministic identity of the job.
        job: JobRef,
        /// The fire-time the launch satisfies.
        fire_time: DateTime<Utc>,
        /// Payload forwarded verbatim to the executor.
        template: JobTemplate,
    },
    /// Cancel a running job.
    Cancel {
        /// The job to cancel.
        job: JobRef,
    },
    /// Delete a completed job's record.
    Delete {
        /// The job to delete.
        job: JobRef,
    },
}

/// Why a due fire-time produced no launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The concurrency policy forbids launching over active runs.
    ActiveRuns,
    /// The fire-time was staler than the starting deadline permits.
    DeadlineExpired {
        /// How far past the fire-time the clock read.
        late_by: Duration,
    },
}

/// What a pass decided about launching.
#[derive(Debug, Clone, PartialEq)]
pub enum PassOutcome {
    /// No fire-time fell due.
    Idle,
    /// A launch was requested for the fire-time.
    Launched {
        /// The fire-time being satisfied.
        fire_time: DateTime<Utc>,
    },
    /// A fire-time was due but no launch was requested.
    Skipped {
        /// The fire-time that was evaluated.
        fire_time: DateTime<Utc>,
        /// Why it was not launched.
        reason: SkipReason,
    },
    /// The missed-run backlog exceeded the enumeration bound and was
    /// force-advanced past.
    BacklogDropped,
    /// The spec suspends launching.
    Suspended,
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Status to write back, superseding the input status.
    pub status: ScheduleStatus,
    /// Executor requests, in application order (cancels before the
    /// launch, deletions last).
    pub actions: Vec<Action>,
    /// What the pass decided about launching.
    pub outcome: PassOutcome,
}

impl Reconciliation {
    /// The launch action of this pass, if any.
    pub fn launch(&self) -> Option<&Action> {
        self.actions
            .iter()
            .find(|a| matches!(a, Action::Launch { .. }))
    }

    /// The jobs this pass requests cancelled.
    pub fn cancellations(&self) -> Vec<&JobRef> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                Action::Cancel { job } => Some(job),
                _ => None,
            })
            .collect()
    }

    /// The jobs this pass requests deleted.
    pub fn deletions(&self) -> Vec<&JobRef> {
        self.actions
            .iter()
            .filter_map(|a| match a {
                Action::Delete { job } => Some(job),
                _ => None,
            })
            .collect()
    }
}

/// The reconciliation decision engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Create a new engine.
    pub fn new() -> Self {
        Self
    }

    /// Run one reconciliation pass.
    pub fn reconcile(&self, req: &ReconcileRequest<'_>) -> Result<Reconciliation, ReconcileError> {
        if let Some(last) = req.status.last_schedule_time {
            if req.now < last {
                return Err(ReconcileError::ClockRegression { last, now: req.now });
            }
        }

        // Reconcile observed reality before any launch decision: drop
        // completed jobs from the active list, pick up running jobs this
        // pass is the first to see.
        let (active, completed) = observe(req.status, req.observed);

        let mut status = ScheduleStatus {
            active,
            last_schedule_time: req.status.last_schedule_time,
        };
        let mut actions = Vec::new();

        let outcome = if req.spec.suspend {
            PassOutcome::Suspended
        } else {
            self.evaluate_launch(req, &mut status, &mut actions)?
        };

        // History pruning runs on every pass, suspended or not.
        let deletions = pruner::select_for_deletion(
            &completed,
            &status.active,
            req.spec.successful_history_limit(),
            req.spec.failed_history_limit(),
        );
        actions.extend(deletions.into_iter().map(|job| Action::Delete { job }));

        Ok(Reconciliation {
            status,
            actions,
            outcome,
        })
    }

    /// Steps 2–3 of a pass: find the last due fire-time and decide whether
    /// to launch for it.
    fn evaluate_launch(
        &self,
        req: &ReconcileRequest<'_>,
        status: &mut ScheduleStatus,
        actions: &mut Vec<Action>,
    ) -> Result<PassOutcome, ReconcileError> {
        let schedule = req.spec.parse_schedule()?;

        let earliest = status.last_schedule_time.unwrap_or(req.created_at);
        let missed = match schedule.missed_runs(earliest, req.now) {
            Ok(missed) => missed,
            Err(ScheduleError::TooManyMissedRuns { limit }) => {
                // Force-advance past the backlog so the next pass does not
                // recompute the same unbounded window.
                tracing::warn!(
                    resource = %req.resource,
                    limit,
                    "missed-run backlog exceeds bound, advancing past it"
                );
                status.last_schedule_time = Some(req.now);
                return Ok(PassOutcome::BacklogDropped);
            }
            Err(e) => return Err(e.into()),
        };

        // Only the last missed fire-time is eligible; earlier ones are
        // permanently superseded.
        let Some(&fire_time) = missed.last() else {
            return Ok(PassOutcome::Idle);
        };

        // The fire-time is evaluated from here on; the schedule time
        // advances whether or not a launch comes of it.
        status.last_schedule_time = Some(fire_time);

        if missed.len() > 1 {
            tracing::debug!(
                resource = %req.resource,
                superseded = missed.len() - 1,
                %fire_time,
                "multiple fire-times missed, evaluating only the last"
            );
        }

        if let Some(deadline) = req.spec.starting_deadline_seconds {
            let late_by = req.now - fire_time;
            if late_by > Duration::seconds(deadline as i64) {
                return Ok(PassOutcome::Skipped {
                    fire_time,
                    reason: SkipReason::DeadlineExpired { late_by },
                });
            }
        }

        match gate::decide(req.spec.concurrency_policy, &status.active) {
            GateDecision::Proceed => {
                self.request_launch(req, fire_time, status, actions);
                Ok(PassOutcome::Launched { fire_time })
            }
            GateDecision::Skip => Ok(PassOutcome::Skipped {
                fire_time,
                reason: SkipReason::ActiveRuns,
            }),
            GateDecision::ReplaceActive(cancel_set) => {
                for job in cancel_set {
                    status.active.retain(|j| *j != job);
                    actions.push(Action::Cancel { job });
                }
                self.request_launch(req, fire_time, status, actions);
                Ok(PassOutcome::Launched { fire_time })
            }
        }
    }

    fn request_launch(
        &self,
        req: &ReconcileRequest<'_>,
        fire_time: DateTime<Utc>,
        status: &mut ScheduleStatus,
        actions: &mut Vec<Action>,
    ) {
        let job = JobRef::scheduled(req.resource, fire_time);

        // A job under this name already running means the launch for this
        // fire-time already happened (e.g. a prior pass launched but its
        // status write was discarded). Nothing left to request.
        if status.is_active(&job) {
            return;
        }

        actions.push(Action::Launch {
            job: job.clone(),
            fire_time,
            template: req.spec.job_template.clone(),
        });
        status.active.push(job);
    }
}

/// Split the executor's listing into the rebuilt active list and the
/// completed set.
///
/// Previously known refs keep their insertion order; running jobs this
/// pass is the first to observe are appended.
fn observe(status: &ScheduleStatus, observed: &[ObservedJob]) -> (Vec<JobRef>, Vec<ObservedJob>) {
    let running: Vec<&JobRef> = observed
        .iter()
        .filter(|j| !j.outcome.is_finished())
        .map(|j| &j.job)
        .collect();

    let mut active: Vec<JobRef> = status
        .active
        .iter()
        .filter(|j| running.contains(j))
        .cloned()
        .collect();
    for job in running {
        if !active.contains(job) {
            active.push(job.clone());
        }
    }

    let completed = observed
        .iter()
        .filter(|j| j.outcome.is_finished())
        .cloned()
        .collect();

    (active, completed)
}
