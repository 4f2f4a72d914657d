//! YAML resource definition parsing.
//!
//! Parses schedule resource definitions from YAML files: one resource per
//! file, carrying the schedule, concurrency policy, history limits, and the
//! opaque job template handed to the executor.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::core::resource::{ConcurrencyPolicy, ScheduleSpec, SpecError};
use crate::core::types::{JobTemplate, ResourceId};

/// Errors that can occur when loading resource definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a definition file.
    #[error("failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// The definition declares an invalid schedule or policy.
    #[error("invalid resource {id}: {source}")]
    InvalidResource {
        /// Resource id the definition declares.
        id: String,
        /// The underlying spec error.
        #[source]
        source: SpecError,
    },

    /// The job template cannot be represented as an opaque value.
    #[error("invalid job template for {id}: {reason}")]
    InvalidTemplate {
        /// Resource id the definition declares.
        id: String,
        /// What went wrong.
        reason: String,
    },

    /// Two definitions declare the same resource id.
    #[error("duplicate resource id: {0}")]
    DuplicateResource(String),
}

/// Schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleConfig {
    /// Simple cron expression string.
    Simple(String),
    /// Detailed schedule with timezone.
    Detailed {
        /// Cron expression or shortcut.
        cron: String,
        /// Timezone for the schedule.
        timezone: Option<String>,
    },
}

impl ScheduleConfig {
    /// Get the cron expression.
    pub fn cron(&self) -> &str {
        match self {
            ScheduleConfig::Simple(s) => s,
            ScheduleConfig::Detailed { cron, .. } => cron,
        }
    }

    /// Get the timezone, if specified.
    pub fn timezone(&self) -> Option<&str> {
        match self {
            ScheduleConfig::Simple(_) => None,
            ScheduleConfig::Detailed { timezone, .. } => timezone.as_deref(),
        }
    }
}

/// Resource definition from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource identifier.
    pub id: String,
    /// Schedule expression (cron, shortcut, or detailed form).
    pub schedule: ScheduleConfig,
    /// Concurrency policy name. Unknown values are rejected, never
    /// defaulted; absent means Allow.
    pub concurrency_policy: Option<String>,
    /// Maximum staleness of a missed fire-time before it is abandoned.
    pub starting_deadline_seconds: Option<u64>,
    /// Whether launches are suspended.
    #[serde(default)]
    pub suspend: bool,
    /// Completed-successfully jobs to retain (explicit 0 retains none).
    pub successful_jobs_history_limit: Option<u32>,
    /// Failed jobs to retain (explicit 0 retains none).
    pub failed_jobs_history_limit: Option<u32>,
    /// Opaque template handed to the executor on every launch.
    pub job_template: serde_yaml::Value,
}

impl ResourceConfig {
    /// Convert the definition into a validated spec.
    pub fn into_spec(self) -> Result<(ResourceId, ScheduleSpec), ConfigError> {
        let policy = match self.concurrency_policy.as_deref() {
            None => ConcurrencyPolicy::default(),
            Some(s) => {
                ConcurrencyPolicy::from_str(s).map_err(|source| ConfigError::InvalidResource {
                    id: self.id.clone(),
                    source,
                })?
            }
        };

        let template_value =
            serde_json::to_value(&self.job_template).map_err(|e| ConfigError::InvalidTemplate {
                id: self.id.clone(),
                reason: e.to_string(),
            })?;

        let mut spec = ScheduleSpec::new(self.schedule.cron(), JobTemplate::new(template_value))
            .with_concurrency_policy(policy)
            .with_suspend(self.suspend);

        if let Some(tz) = self.schedule.timezone() {
            spec = spec.with_timezone(tz);
        }
        if let Some(deadline) = self.starting_deadline_seconds {
            spec = spec.with_starting_deadline_seconds(deadline);
        }
        if let Some(limit) = self.successful_jobs_history_limit {
            spec = spec.with_successful_jobs_history_limit(limit);
        }
        if let Some(limit) = self.failed_jobs_history_limit {
            spec = spec.with_failed_jobs_history_limit(limit);
        }

        spec.validate().map_err(|source| ConfigError::InvalidResource {
            id: self.id.clone(),
            source,
        })?;

        Ok((ResourceId::new(self.id), spec))
    }
}

/// Loader for YAML resource definition files.
pub struct YamlLoader;

impl YamlLoader {
    /// Load a single resource definition file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<ResourceConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: ResourceConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load every `.yaml`/`.yml` file in a directory.
    pub fn load_directory(path: impl AsRef<Path>) -> Result<Vec<ResourceConfig>, ConfigError> {
        let mut configs = Vec::new();
        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e == "yaml" || e == "yml")
                    .unwrap_or(false)
            })
            .collect();
        entries.sort();

        for path in entries {
            configs.push(Self::load_file(&path)?);
        }
        Ok(configs)
    }
}
