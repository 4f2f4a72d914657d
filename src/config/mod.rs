//! Configuration loading and parsing.
//!
//! This module provides YAML-based resource definitions for the binary and
//! for library consumers that keep their schedules in files.

mod yaml;

pub use yaml::{ConfigError, ResourceConfig, ScheduleConfig, YamlLoader};

use std::collections::HashSet;
use std::path::Path;

use crate::core::resource::ScheduleSpec;
use crate::core::types::ResourceId;

/// Load and validate every resource definition in a directory.
///
/// Definitions are returned in filename order. Duplicate resource ids
/// across files are rejected.
pub fn load_resources_from_directory(
    path: impl AsRef<Path>,
) -> Result<Vec<(ResourceId, ScheduleSpec)>, ConfigError> {
    let configs = YamlLoader::load_directory(path)?;

    let mut seen = HashSet::new();
    let mut resources = Vec::with_capacity(configs.len());
    for config in configs {
        if !seen.insert(config.id.clone()) {
            return Err(ConfigError::DuplicateResource(config.id));
        }
        resources.push(config.into_spec()?);
    }
    Ok(resources)
}
