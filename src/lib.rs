//! recron - a declarative cron reconciliation engine.
//!
//! Resources declare a cron schedule, a concurrency policy, and history
//! retention limits. A pure decision engine turns (spec, status, observed
//! jobs, now) into launch/cancel/delete requests plus an updated status,
//! and a controller loop applies those requests against pluggable store
//! and executor backends.

pub mod config;
pub mod controller;
pub mod core;
pub mod engine;
pub mod events;
pub mod executor;
pub mod store;
pub mod testing;

pub use crate::config::{load_resources_from_directory, ConfigError, ResourceConfig, YamlLoader};
pub use crate::controller::{Controller, ControllerError, ControllerHandle, ControllerState};
pub use crate::core::clock::{Clock, FixedClock, SystemClock};
pub use crate::core::resource::{
    ConcurrencyPolicy, ScheduleSpec, ScheduleStatus, SpecError, DEFAULT_FAILED_HISTORY_LIMIT,
    DEFAULT_SUCCESSFUL_HISTORY_LIMIT,
};
pub use crate::core::schedule::{Schedule, ScheduleError, MAX_MISSED_RUNS};
pub use crate::core::types::{JobOutcome, JobRef, JobTemplate, ObservedJob, ResourceId};
pub use crate::engine::{
    Action, GateDecision, PassOutcome, ReconcileError, ReconcileRequest, Reconciler,
    Reconciliation, SkipReason,
};
pub use crate::events::{Event, EventBus, EventHandler};
pub use crate::executor::{CommandTemplate, ExecutorError, JobExecutor, ProcessExecutor};
pub use crate::store::{InMemoryStore, ResourceStore, StoreError, StoredResource};
