//! History pruning: which completed jobs to delete under the configured
//! retention limits.

use crate::core::types::{JobOutcome, JobRef, ObservedJob};

/// Select completed jobs for deletion.
///
/// Succeeded and failed jobs are pruned independently against their own
/// limits: within each partition, jobs are ordered oldest-first by finish
/// time and everything but the most recent `limit` entries is selected. A
/// limit of 0 selects the whole partition.
///
/// A job that still appears in `active` is never selected, whatever the
/// executor reported for it.
pub fn select_for_deletion(
    completed: &[ObservedJob],
    active: &[JobRef],
    successful_limit: u32,
    failed_limit: u32,
) -> Vec<JobRef> {
    let mut deletions = prune_partition(completed, active, JobOutcome::Succeeded, successful_limit);
    deletions.extend(prune_partition(
        completed,
        active,
        JobOutcome::Failed,
        failed_limit,
    ));
    deletions
}

fn prune_partition(
    completed: &[ObservedJob],
    active: &[JobRef],
    outcome: JobOutcome,
    limit: u32,
) -> Vec<JobRef> {
    let mut partition: Vec<&ObservedJob> = completed
        .iter()
        .filter(|j| j.outcome == outcome && !active.contains(&j.job))
        .collect();

    // Oldest first; jobs with no recorded finish time sort before the rest.
    partition.sort_by_key(|j| j.finished_at);

    let excess = partition.len().saturating_sub(limit as usize);
    partition
        .into_iter()
        .take(excess)
        .map(|j| j.job.clone())
        .collect()
}
