//! In-memory resource store.
//!
//! Thread-safe reference backend for the store interface. Data is not
//! persisted across restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{ResourceStore, StoreError, StoredResource};
use crate::core::resource::{ScheduleSpec, ScheduleStatus};
use crate::core::types::ResourceId;

/// In-memory store backend.
pub struct InMemoryStore {
    resources: RwLock<HashMap<ResourceId, StoredResource>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn insert(
        &self,
        id: ResourceId,
        spec: ScheduleSpec,
        created_at: DateTime<Utc>,
    ) -> Result<StoredResource, StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        if resources.contains_key(&id) {
            return Err(StoreError::DuplicateKey(id.to_string()));
        }

        let resource = StoredResource {
            id: id.clone(),
            uid: Uuid::new_v4(),
            resource_version: 1,
            created_at,
            spec,
            status: ScheduleStatus::new(),
        };
        resources.insert(id, resource.clone());
        Ok(resource)
    }

    async fn get(&self, id: &ResourceId) -> Result<StoredResource, StoreError> {
        let resources = self
            .resources
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        resources
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self) -> Result<Vec<ResourceId>, StoreError> {
        let resources = self
            .resources
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        let mut ids: Vec<_> = resources.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(ids)
    }

    async fn update_spec(&self, id: &ResourceId, spec: ScheduleSpec) -> Result<(), StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        resource.spec = spec;
        resource.resource_version += 1;
        Ok(())
    }

    async fn update_status(
        &self,
        id: &ResourceId,
        expected_version: u64,
        status: ScheduleStatus,
    ) -> Result<(), StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if resource.resource_version != expected_version {
            return Err(StoreError::Conflict(id.to_string()));
        }

        resource.status = status;
        resource.resource_version += 1;
        Ok(())
    }

    async fn delete(&self, id: &ResourceId) -> Result<(), StoreError> {
        let mut resources = self
            .resources
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        resources
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(())
    }
}
