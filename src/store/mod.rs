//! Resource store abstraction.
//!
//! Persists schedule resources (spec + status) and arbitrates concurrent
//! status writes through optimistic versioning. The engine itself never
//! touches the store; the surrounding controller reads a resource before a
//! pass and writes its status after.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::resource::{ScheduleSpec, ScheduleStatus};
use crate::core::types::ResourceId;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A resource with this id already exists.
    #[error("duplicate resource: {0}")]
    DuplicateKey(String),

    /// The resource changed since it was read. The caller must discard its
    /// pass output and retry from a fresh read, never merge.
    #[error("conflict: {0} was modified concurrently")]
    Conflict(String),

    /// Store lock was poisoned.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// A schedule resource as held by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Unique id assigned by the store on insert.
    pub uid: Uuid,
    /// Monotonically increasing version, bumped on every write. Status
    /// updates must present the version they read.
    pub resource_version: u64,
    /// When the resource was created.
    pub created_at: DateTime<Utc>,
    /// Desired state.
    pub spec: ScheduleSpec,
    /// Observed state.
    pub status: ScheduleStatus,
}

/// Store for schedule resources.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Insert a new resource with an empty status.
    async fn insert(
        &self,
        id: ResourceId,
        spec: ScheduleSpec,
        created_at: DateTime<Utc>,
    ) -> Result<StoredResource, StoreError>;

    /// Get a resource by id.
    async fn get(&self, id: &ResourceId) -> Result<StoredResource, StoreError>;

    /// List all resource ids.
    async fn list(&self) -> Result<Vec<ResourceId>, StoreError>;

    /// Replace a resource's spec (the external-actor path). Bumps the
    /// resource version.
    async fn update_spec(&self, id: &ResourceId, spec: ScheduleSpec) -> Result<(), StoreError>;

    /// Write a resource's status, guarded by the version the caller read.
    ///
    /// Returns [`StoreError::Conflict`] if the resource has moved on since;
    /// the caller's pass output is stale and must be discarded.
    async fn update_status(
        &self,
        id: &ResourceId,
        expected_version: u64,
        status: ScheduleStatus,
    ) -> Result<(), StoreError>;

    /// Delete a resource.
    async fn delete(&self, id: &ResourceId) -> Result<(), StoreError>;
}
