//! The reconciliation loop.
//!
//! The controller is responsible for:
//! - Periodically reconciling every stored resource
//! - Serializing passes per resource (at most one in flight per identity)
//! - Applying the engine's requested actions against the executor
//! - Writing status back with optimistic concurrency, discarding on conflict
//! - Manual reconcile triggers, pause/resume, and graceful shutdown
//! - Event emission
//!
//! The decision logic itself lives in [`crate::engine`]; the controller
//! only reads state, invokes the pure pass function, and carries out its
//! output.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::core::clock::{Clock, SystemClock};
use crate::core::types::{JobRef, ResourceId};
use crate::engine::{Action, PassOutcome, ReconcileError, ReconcileRequest, Reconciler};
use crate::events::{Event, EventBus};
use crate::executor::{ExecutorError, JobExecutor};
use crate::store::{ResourceStore, StoreError};

/// Buffer size for the command channel between ControllerHandle and Controller.
const COMMAND_CHANNEL_BUFFER: usize = 32;

/// Attempts per pass before a store conflict is given up on until the next
/// tick.
const CONFLICT_RETRY_LIMIT: usize = 3;

/// Errors that can occur in the controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Executor error.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// The decision engine rejected the pass.
    #[error("reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// State of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Controller is stopped.
    Stopped,
    /// Controller is running.
    Running,
    /// Controller is paused: the tick loop is idle, manual reconciles
    /// still work.
    Paused,
}

/// Commands that can be sent to the controller.
enum ControllerCommand {
    /// Reconcile a resource now.
    Reconcile {
        id: ResourceId,
        response: oneshot::Sender<Result<(), ControllerError>>,
    },
    /// Pause the tick loop.
    Pause { response: oneshot::Sender<()> },
    /// Resume the tick loop.
    Resume { response: oneshot::Sender<()> },
    /// Shut the controller down.
    Shutdown { response: oneshot::Sender<()> },
}

/// Handle for controlling the reconciliation loop.
#[derive(Clone)]
pub struct ControllerHandle {
    command_tx: mpsc::Sender<ControllerCommand>,
    state: Arc<RwLock<ControllerState>>,
}

impl ControllerHandle {
    /// Helper to send a command that returns a result and wait for response.
    async fn send_result_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<Result<T, ControllerError>>) -> ControllerCommand,
        operation: &str,
    ) -> Result<T, ControllerError>
    where
        T: Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                ControllerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            ControllerError::ChannelError(format!("failed to receive {} response", operation))
        })?
    }

    /// Helper to send a command that returns unit and wait for response.
    async fn send_unit_command(
        &self,
        build_command: impl FnOnce(oneshot::Sender<()>) -> ControllerCommand,
        operation: &str,
    ) -> Result<(), ControllerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                ControllerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            ControllerError::ChannelError(format!("failed to receive {} response", operation))
        })?;

        Ok(())
    }

    /// Reconcile a resource immediately and wait for the pass to finish.
    pub async fn reconcile_now(&self, id: impl Into<ResourceId>) -> Result<(), ControllerError> {
        let id = id.into();
        self.send_result_command(
            |response| ControllerCommand::Reconcile { id, response },
            "reconcile",
        )
        .await
    }

    /// Pause the tick loop.
    ///
    /// While paused, no tick-driven passes run; manual reconciles still work.
    pub async fn pause(&self) -> Result<(), ControllerError> {
        self.send_unit_command(|response| ControllerCommand::Pause { response }, "pause")
            .await
    }

    /// Resume the tick loop after being paused.
    pub async fn resume(&self) -> Result<(), ControllerError> {
        self.send_unit_command(|response| ControllerCommand::Resume { response }, "resume")
            .await
    }

    /// Shut the controller down.
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        self.send_unit_command(
            |response| ControllerCommand::Shutdown { response },
            "shutdown",
        )
        .await
    }

    /// Get the current controller state.
    pub async fn state(&self) -> ControllerState {
        *self.state.read().await
    }

    /// Check if the controller is running.
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == ControllerState::Running
    }

    /// Check if the controller is paused.
    pub async fn is_paused(&self) -> bool {
        *self.state.read().await == ControllerState::Paused
    }
}

/// The reconciliation loop over a store and an executor.
pub struct Controller<S: ResourceStore, E: JobExecutor> {
    /// Resource store.
    store: Arc<S>,
    /// Job executor backend.
    executor: Arc<E>,
    /// Injected clock; every pass reads time through it.
    clock: Arc<dyn Clock>,
    /// The pure decision engine.
    reconciler: Reconciler,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
    /// Interval between tick-driven sweeps over all resources.
    tick_interval: Duration,
    /// Resources with a pass currently in flight.
    in_flight: Arc<RwLock<HashSet<ResourceId>>>,
    /// Graceful shutdown timeout (default: 30 seconds).
    shutdown_timeout: Duration,
}

impl<S: ResourceStore + 'static, E: JobExecutor + 'static> Controller<S, E> {
    /// Create a new controller over the given store and executor.
    pub fn new(store: S, executor: E) -> Self {
        Self::with_shared(Arc::new(store), Arc::new(executor))
    }

    /// Create a controller over shared store and executor (for testing).
    pub fn with_shared(store: Arc<S>, executor: Arc<E>) -> Self {
        Self {
            store,
            executor,
            clock: Arc::new(SystemClock::new()),
            reconciler: Reconciler::new(),
            event_bus: Arc::new(EventBus::new()),
            tick_interval: Duration::from_secs(1),
            in_flight: Arc::new(RwLock::new(HashSet::new())),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the graceful shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Start the controller and return a handle for controlling it.
    pub async fn start(self) -> (ControllerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(ControllerState::Running));

        let handle = ControllerHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let controller_task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, controller_task)
    }

    /// Main controller loop.
    async fn run(
        self,
        mut command_rx: mpsc::Receiver<ControllerCommand>,
        state: Arc<RwLock<ControllerState>>,
    ) {
        let mut interval = tokio::time::interval(self.tick_interval);
        // The first tick completes immediately; consume it so the first
        // sweep happens one full interval after start.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let current_state = *state.read().await;
                    if current_state == ControllerState::Running {
                        self.tick().await;
                    }
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        ControllerCommand::Reconcile { id, response } => {
                            self.spawn_manual_reconcile(id, response);
                        }
                        ControllerCommand::Pause { response } => {
                            let mut s = state.write().await;
                            *s = ControllerState::Paused;
                            tracing::info!("Controller paused");
                            let _ = response.send(());
                        }
                        ControllerCommand::Resume { response } => {
                            let mut s = state.write().await;
                            *s = ControllerState::Running;
                            tracing::info!("Controller resumed");
                            let _ = response.send(());
                        }
                        ControllerCommand::Shutdown { response } => {
                            let mut s = state.write().await;
                            *s = ControllerState::Stopped;
                            drop(s); // Release the lock before waiting

                            self.await_in_flight().await;

                            let _ = response.send(());
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Sweep every stored resource, skipping those with a pass in flight.
    async fn tick(&self) {
        let ids = match self.store.list().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list resources for tick");
                return;
            }
        };

        for id in ids {
            if !self.try_begin(&id).await {
                continue;
            }
            self.spawn_pass(id);
        }
    }

    /// Handle a manual reconcile command: wait for any in-flight pass on
    /// the same resource, then run one and report its result.
    fn spawn_manual_reconcile(
        &self,
        id: ResourceId,
        response: oneshot::Sender<Result<(), ControllerError>>,
    ) {
        let in_flight = Arc::clone(&self.in_flight);
        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let clock = Arc::clone(&self.clock);
        let event_bus = Arc::clone(&self.event_bus);
        let reconciler = self.reconciler;

        tokio::spawn(async move {
            // Per-identity serialization also applies to manual passes
            loop {
                let mut guard = in_flight.write().await;
                if guard.insert(id.clone()) {
                    break;
                }
                drop(guard);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let result = reconcile_with_retry(
                store.as_ref(),
                executor.as_ref(),
                clock.as_ref(),
                reconciler,
                &event_bus,
                &id,
            )
            .await;

            in_flight.write().await.remove(&id);
            let _ = response.send(result);
        });
    }

    /// Try to claim the in-flight slot for a resource.
    async fn try_begin(&self, id: &ResourceId) -> bool {
        self.in_flight.write().await.insert(id.clone())
    }

    /// Spawn one pass over a resource; the in-flight slot must already be
    /// claimed.
    fn spawn_pass(&self, id: ResourceId) {
        let in_flight = Arc::clone(&self.in_flight);
        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        let clock = Arc::clone(&self.clock);
        let event_bus = Arc::clone(&self.event_bus);
        let reconciler = self.reconciler;

        tokio::spawn(async move {
            // Failures are already logged and reported on the event bus
            let _ = reconcile_with_retry(
                store.as_ref(),
                executor.as_ref(),
                clock.as_ref(),
                reconciler,
                &event_bus,
                &id,
            )
            .await;

            in_flight.write().await.remove(&id);
        });
    }

    /// Wait for in-flight passes to complete, bounded by the shutdown
    /// timeout.
    async fn await_in_flight(&self) {
        let remaining = self.in_flight.read().await.len();
        if remaining == 0 {
            return;
        }

        tracing::info!(
            "Graceful shutdown: waiting for {} in-flight pass(es) (timeout: {:?})",
            remaining,
            self.shutdown_timeout
        );

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        loop {
            if self.in_flight.read().await.is_empty() {
                tracing::info!("All in-flight passes completed");
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                let stuck = self.in_flight.read().await.len();
                tracing::warn!(
                    "Shutdown timeout exceeded with {} pass(es) still in flight",
                    stuck
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Run one pass, retrying immediately from a fresh read on store conflicts.
async fn reconcile_with_retry<S: ResourceStore, E: JobExecutor>(
    store: &S,
    executor: &E,
    clock: &dyn Clock,
    reconciler: Reconciler,
    event_bus: &EventBus,
    id: &ResourceId,
) -> Result<(), ControllerError> {
    let mut attempt = 1;
    loop {
        match reconcile_resource(store, executor, clock, reconciler, event_bus, id).await {
            Err(ControllerError::Store(StoreError::Conflict(_))) if attempt < CONFLICT_RETRY_LIMIT => {
                tracing::debug!(resource = %id, attempt, "Status write conflicted, retrying from fresh read");
                attempt += 1;
            }
            Err(ControllerError::Store(StoreError::NotFound(_))) => {
                // Deleted between listing and reconciling; nothing to do
                tracing::debug!(resource = %id, "Resource vanished before reconciliation");
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(resource = %id, error = %e, "Reconciliation pass failed");
                event_bus
                    .emit(Event::reconcile_failed(id.clone(), e.to_string()))
                    .await;
                return Err(e);
            }
            Ok(()) => return Ok(()),
        }
    }
}

/// One reconciliation pass: read fresh state, run the pure decision, apply
/// its actions, write status back.
///
/// A failed cancel or launch aborts the pass before the status write, so
/// the same fire-time is re-derived next pass and retried under its
/// deterministic job name. Prune-delete failures are logged and retried
/// naturally on a later pass.
async fn reconcile_resource<S: ResourceStore, E: JobExecutor>(
    store: &S,
    executor: &E,
    clock: &dyn Clock,
    reconciler: Reconciler,
    event_bus: &EventBus,
    id: &ResourceId,
) -> Result<(), ControllerError> {
    let resource = store.get(id).await?;

    // Completions must be observed before the concurrency decision
    let observed = executor.list_jobs(id).await?;
    let now = clock.now();

    let request = ReconcileRequest {
        resource: id,
        spec: &resource.spec,
        status: &resource.status,
        created_at: resource.created_at,
        observed: &observed,
        now,
    };
    let pass = reconciler.reconcile(&request)?;

    let mut launched: Option<(JobRef, DateTime<Utc>)> = None;
    let mut cancelled: Vec<JobRef> = Vec::new();
    let mut pruned: Vec<JobRef> = Vec::new();

    for action in &pass.actions {
        match action {
            Action::Cancel { job } => {
                executor.cancel(id, job).await?;
                cancelled.push(job.clone());
            }
            Action::Launch {
                job,
                fire_time,
                template,
            } => {
                executor.launch(id, job, template).await?;
                launched = Some((job.clone(), *fire_time));
            }
            Action::Delete { job } => match executor.delete(id, job).await {
                Ok(()) => pruned.push(job.clone()),
                Err(e) => {
                    tracing::warn!(resource = %id, job = %job, error = %e, "Failed to delete pruned job");
                }
            },
        }
    }

    store
        .update_status(id, resource.resource_version, pass.status)
        .await?;

    for job in cancelled {
        tracing::info!(resource = %id, job = %job, "Cancelled job");
        event_bus.emit(Event::job_cancelled(id.clone(), job)).await;
    }
    if let Some((job, fire_time)) = launched {
        tracing::info!(resource = %id, job = %job, %fire_time, "Launched job");
        event_bus
            .emit(Event::job_launched(id.clone(), job, fire_time))
            .await;
    }
    match pass.outcome {
        PassOutcome::Skipped { fire_time, reason } => {
            tracing::info!(resource = %id, %fire_time, ?reason, "Skipped launch");
            event_bus
                .emit(Event::launch_skipped(id.clone(), fire_time, reason))
                .await;
        }
        PassOutcome::BacklogDropped => {
            event_bus.emit(Event::backlog_dropped(id.clone())).await;
        }
        _ => {}
    }
    if !pruned.is_empty() {
        tracing::info!(resource = %id, count = pruned.len(), "Pruned job history");
        event_bus.emit(Event::jobs_pruned(id.clone(), pruned)).await;
    }

    Ok(())
}
