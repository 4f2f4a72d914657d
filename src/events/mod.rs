//! Reconcile lifecycle events and event handling.
//!
//! The controller emits an event for every externally visible decision a
//! pass makes, enabling observability without coupling consumers to the
//! engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::core::types::{JobRef, ResourceId};
use crate::engine::SkipReason;

/// Lifecycle events emitted while reconciling.
#[derive(Debug, Clone)]
pub enum Event {
    /// A job launch was requested for a fire-time.
    JobLaunched {
        resource: ResourceId,
        job: JobRef,
        fire_time: DateTime<Utc>,
        timestamp: Instant,
    },

    /// A running job was cancelled to make way for a replacement.
    JobCancelled {
        resource: ResourceId,
        job: JobRef,
        timestamp: Instant,
    },

    /// Completed jobs were deleted under the history limits.
    JobsPruned {
        resource: ResourceId,
        jobs: Vec<JobRef>,
        timestamp: Instant,
    },

    /// A due fire-time was evaluated but produced no launch.
    LaunchSkipped {
        resource: ResourceId,
        fire_time: DateTime<Utc>,
        reason: SkipReason,
        timestamp: Instant,
    },

    /// The missed-run backlog exceeded the enumeration bound and was
    /// advanced past without launching.
    BacklogDropped {
        resource: ResourceId,
        timestamp: Instant,
    },

    /// A reconciliation pass failed.
    ReconcileFailed {
        resource: ResourceId,
        error: String,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::JobLaunched { timestamp, .. } => *timestamp,
            Event::JobCancelled { timestamp, .. } => *timestamp,
            Event::JobsPruned { timestamp, .. } => *timestamp,
            Event::LaunchSkipped { timestamp, .. } => *timestamp,
            Event::BacklogDropped { timestamp, .. } => *timestamp,
            Event::ReconcileFailed { timestamp, .. } => *timestamp,
        }
    }

    /// The resource the event concerns.
    pub fn resource(&self) -> &ResourceId {
        match self {
            Event::JobLaunched { resource, .. } => resource,
            Event::JobCancelled { resource, .. } => resource,
            Event::JobsPruned { resource, .. } => resource,
            Event::LaunchSkipped { resource, .. } => resource,
            Event::BacklogDropped { resource, .. } => resource,
            Event::ReconcileFailed { resource, .. } => resource,
        }
    }

    /// Create a JobLaunched event.
    pub fn job_launched(resource: ResourceId, job: JobRef, fire_time: DateTime<Utc>) -> Self {
        Event::JobLaunched {
            resource,
            job,
            fire_time,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobCancelled event.
    pub fn job_cancelled(resource: ResourceId, job: JobRef) -> Self {
        Event::JobCancelled {
            resource,
            job,
            timestamp: Instant::now(),
        }
    }

    /// Create a JobsPruned event.
    pub fn jobs_pruned(resource: ResourceId, jobs: Vec<JobRef>) -> Self {
        Event::JobsPruned {
            resource,
            jobs,
            timestamp: Instant::now(),
        }
    }

    /// Create a LaunchSkipped event.
    pub fn launch_skipped(
        resource: ResourceId,
        fire_time: DateTime<Utc>,
        reason: SkipReason,
    ) -> Self {
        Event::LaunchSkipped {
            resource,
            fire_time,
            reason,
            timestamp: Instant::now(),
        }
    }

    /// Create a BacklogDropped event.
    pub fn backlog_dropped(resource: ResourceId) -> Self {
        Event::BacklogDropped {
            resource,
            timestamp: Instant::now(),
        }
    }

    /// Create a ReconcileFailed event.
    pub fn reconcile_failed(resource: ResourceId, error: impl Into<String>) -> Self {
        Event::ReconcileFailed {
            resource,
            error: error.into(),
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
