//! The scheduling decision engine: concurrency gating, history pruning,
//! and the per-pass reconciliation function that ties them together.

pub mod gate;
pub mod pruner;
mod reconciler;

pub use gate::GateDecision;
pub use reconciler::{
    Action, PassOutcome, ReconcileError, ReconcileRequest, Reconciler, Reconciliation, SkipReason,
};
