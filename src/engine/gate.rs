//! Concurrency gate: may a new launch proceed while previous runs are
//! active?
//!
//! A pure decision table with no side effects; acting on the decision
//! (launching, cancelling) is the caller's responsibility.

use crate::core::resource::ConcurrencyPolicy;
use crate::core::types::JobRef;

/// Outcome of consulting the gate for a due fire-time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The launch may proceed.
    Proceed,
    /// The launch must be skipped this pass.
    Skip,
    /// The launch may proceed once every listed job has been cancelled.
    ReplaceActive(Vec<JobRef>),
}

/// Decide whether a launch is permitted under the given policy and set of
/// currently active jobs.
pub fn decide(policy: ConcurrencyPolicy, active: &[JobRef]) -> GateDecision {
    match policy {
        ConcurrencyPolicy::Allow => GateDecision::Proceed,
        ConcurrencyPolicy::Forbid => {
            if active.is_empty() {
                GateDecision::Proceed
            } else {
                GateDecision::Skip
            }
        }
        ConcurrencyPolicy::Replace => {
            if active.is_empty() {
                GateDecision::Proceed
            } else {
                GateDecision::ReplaceActive(active.to_vec())
            }
        }
    }
}
