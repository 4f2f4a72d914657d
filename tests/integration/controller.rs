//! Controller loop integration tests against the in-memory store and the
//! mock executor.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use recron::testing::MockExecutor;
use recron::{
    Clock, Controller, FixedClock, InMemoryStore, JobOutcome, JobRef, ResourceId, ResourceStore,
    ScheduleSpec, ScheduleStatus, StoreError, StoredResource,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{spec, t0};

async fn start_controller(
    store: Arc<InMemoryStore>,
    executor: Arc<MockExecutor>,
    clock: Arc<FixedClock>,
) -> (recron::ControllerHandle, tokio::task::JoinHandle<()>) {
    Controller::with_shared(store, executor)
        .with_clock(clock as Arc<dyn Clock>)
        // Tests drive passes manually; keep the tick out of the way
        .with_tick_interval(Duration::from_secs(3600))
        .start()
        .await
}

#[tokio::test]
async fn full_lifecycle_launch_complete_prune() {
    let id = ResourceId::new("report");
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(
            id.clone(),
            spec("*/5 * * * *").with_successful_jobs_history_limit(1),
            t0(),
        )
        .await
        .unwrap();
    let executor = Arc::new(MockExecutor::new());
    let clock = Arc::new(FixedClock::at(t0() + ChronoDuration::minutes(6)));

    let (handle, task) = start_controller(
        Arc::clone(&store),
        Arc::clone(&executor),
        Arc::clone(&clock),
    )
    .await;

    // First pass launches for T0+5m
    handle.reconcile_now("report").await.unwrap();
    let first_job = JobRef::scheduled(&id, t0() + ChronoDuration::minutes(5));
    assert_eq!(executor.launched().await.len(), 1);
    assert_eq!(
        store.get(&id).await.unwrap().status.active,
        vec![first_job.clone()]
    );

    // The job finishes; the next tick fires and launches again
    executor
        .finish_job(
            &id,
            &first_job,
            JobOutcome::Succeeded,
            t0() + ChronoDuration::minutes(7),
        )
        .await;
    clock.set(t0() + ChronoDuration::minutes(11));
    handle.reconcile_now("report").await.unwrap();

    let second_job = JobRef::scheduled(&id, t0() + ChronoDuration::minutes(10));
    let resource = store.get(&id).await.unwrap();
    assert_eq!(resource.status.active, vec![second_job.clone()]);
    assert_eq!(
        resource.status.last_schedule_time,
        Some(t0() + ChronoDuration::minutes(10))
    );

    // Second job finishes too: pruning now keeps only the most recent
    // completed job
    executor
        .finish_job(
            &id,
            &second_job,
            JobOutcome::Succeeded,
            t0() + ChronoDuration::minutes(12),
        )
        .await;
    clock.set(t0() + ChronoDuration::minutes(13));
    handle.reconcile_now("report").await.unwrap();

    assert_eq!(executor.deleted().await, vec![(id.clone(), first_job)]);
    assert!(store.get(&id).await.unwrap().status.active.is_empty());

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn forbid_holds_until_the_active_job_completes() {
    let id = ResourceId::new("report");
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(
            id.clone(),
            spec("*/5 * * * *").with_concurrency_policy(recron::ConcurrencyPolicy::Forbid),
            t0(),
        )
        .await
        .unwrap();
    let executor = Arc::new(MockExecutor::new());
    let clock = Arc::new(FixedClock::at(t0() + ChronoDuration::minutes(6)));

    let (handle, task) = start_controller(
        Arc::clone(&store),
        Arc::clone(&executor),
        Arc::clone(&clock),
    )
    .await;

    // Launch at T0+5m
    handle.reconcile_now("report").await.unwrap();
    let first_job = JobRef::scheduled(&id, t0() + ChronoDuration::minutes(5));
    assert_eq!(executor.launched().await.len(), 1);

    // Next fire-time comes due while the job still runs: skipped, but the
    // schedule time advances so the tick is not retried later
    clock.set(t0() + ChronoDuration::minutes(11));
    handle.reconcile_now("report").await.unwrap();
    assert_eq!(executor.launched().await.len(), 1);
    assert_eq!(
        store.get(&id).await.unwrap().status.last_schedule_time,
        Some(t0() + ChronoDuration::minutes(10))
    );

    // Once it completes, the following fire-time launches again
    executor
        .finish_job(
            &id,
            &first_job,
            JobOutcome::Succeeded,
            t0() + ChronoDuration::minutes(12),
        )
        .await;
    clock.set(t0() + ChronoDuration::minutes(16));
    handle.reconcile_now("report").await.unwrap();
    assert_eq!(executor.launched().await.len(), 2);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

/// Store wrapper that injects a conflict on the next status write.
struct ConflictingStore {
    inner: InMemoryStore,
    conflict_next_update: AtomicBool,
}

impl ConflictingStore {
    fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            conflict_next_update: AtomicBool::new(false),
        }
    }

    fn conflict_next_update(&self) {
        self.conflict_next_update.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ResourceStore for ConflictingStore {
    async fn insert(
        &self,
        id: ResourceId,
        spec: ScheduleSpec,
        created_at: DateTime<Utc>,
    ) -> Result<StoredResource, StoreError> {
        self.inner.insert(id, spec, created_at).await
    }

    async fn get(&self, id: &ResourceId) -> Result<StoredResource, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<ResourceId>, StoreError> {
        self.inner.list().await
    }

    async fn update_spec(&self, id: &ResourceId, spec: ScheduleSpec) -> Result<(), StoreError> {
        self.inner.update_spec(id, spec).await
    }

    async fn update_status(
        &self,
        id: &ResourceId,
        expected_version: u64,
        status: ScheduleStatus,
    ) -> Result<(), StoreError> {
        if self.conflict_next_update.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Conflict(id.to_string()));
        }
        self.inner.update_status(id, expected_version, status).await
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn status_conflict_is_retried_from_a_fresh_read() {
    let id = ResourceId::new("report");
    let store = Arc::new(ConflictingStore::new(InMemoryStore::new()));
    store
        .insert(id.clone(), spec("*/5 * * * *"), t0())
        .await
        .unwrap();
    let executor = Arc::new(MockExecutor::new());
    let clock = Arc::new(FixedClock::at(t0() + ChronoDuration::minutes(6)));

    let (handle, task) = Controller::with_shared(Arc::clone(&store), Arc::clone(&executor))
        .with_clock(clock as Arc<dyn Clock>)
        .with_tick_interval(Duration::from_secs(3600))
        .start()
        .await;

    store.conflict_next_update();
    handle.reconcile_now("report").await.unwrap();

    // The first write conflicted; the retry re-read, re-decided, and the
    // idempotent launch left exactly one job
    assert_eq!(executor.launched().await.len(), 1);
    let resource = store.get(&id).await.unwrap();
    assert_eq!(
        resource.status.last_schedule_time,
        Some(t0() + ChronoDuration::minutes(5))
    );
    assert_eq!(resource.status.active.len(), 1);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn spec_change_between_passes_is_honored() {
    let id = ResourceId::new("report");
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(id.clone(), spec("*/5 * * * *"), t0())
        .await
        .unwrap();
    let executor = Arc::new(MockExecutor::new());
    let clock = Arc::new(FixedClock::at(t0() + ChronoDuration::minutes(6)));

    let (handle, task) = start_controller(
        Arc::clone(&store),
        Arc::clone(&executor),
        Arc::clone(&clock),
    )
    .await;

    handle.reconcile_now("report").await.unwrap();
    assert_eq!(executor.launched().await.len(), 1);

    // An external actor suspends the resource
    store
        .update_spec(&id, spec("*/5 * * * *").with_suspend(true))
        .await
        .unwrap();

    clock.set(t0() + ChronoDuration::minutes(30));
    handle.reconcile_now("report").await.unwrap();

    // No further launches while suspended
    assert_eq!(executor.launched().await.len(), 1);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}

#[tokio::test]
async fn backlog_overflow_reports_and_advances() {
    let id = ResourceId::new("busy");
    let store = Arc::new(InMemoryStore::new());
    store
        .insert(id.clone(), spec("* * * * *"), t0() - ChronoDuration::days(30))
        .await
        .unwrap();
    let executor = Arc::new(MockExecutor::new());
    let clock = Arc::new(FixedClock::at(t0()));

    let (handle, task) = start_controller(
        Arc::clone(&store),
        Arc::clone(&executor),
        Arc::clone(&clock),
    )
    .await;

    handle.reconcile_now("busy").await.unwrap();

    // No launch; the backlog was advanced past
    assert!(executor.launched().await.is_empty());
    assert_eq!(
        store.get(&id).await.unwrap().status.last_schedule_time,
        Some(t0())
    );

    // The next minute fires normally again
    clock.set(t0() + ChronoDuration::minutes(1));
    handle.reconcile_now("busy").await.unwrap();
    assert_eq!(executor.launched().await.len(), 1);

    handle.shutdown().await.unwrap();
    let _ = task.await;
}
