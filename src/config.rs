//! Engine configuration loading via `ortho-config`.
//!
//! Every timeout, poll interval, and property override is an explicit value
//! handed to the engine constructors; there is no process-wide mutable
//! default. Values merge defaults, configuration files, environment
//! variables (prefix `GANTRY_`), and CLI flags in that order of precedence.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::ResourceId;
use crate::retry::RetryPolicy;
use crate::runner::{ConcurrentRunner, DEFAULT_PARALLELISM};

/// Default total time to wait for a queued job, in seconds.
pub const DEFAULT_JOB_WAIT_TIMEOUT_SECS: u64 = 600;

/// Default spacing between job polls, in seconds.
pub const DEFAULT_JOB_POLL_INTERVAL_SECS: u64 = 5;

/// Engine configuration derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq)]
#[ortho_config(prefix = "GANTRY")]
pub struct EngineConfig {
    /// Name of a pre-created service instance, assumed ready. When set the
    /// engine never creates or destroys the service.
    pub static_service_instance: Option<String>,
    /// Zone used for provisioning the service.
    pub service_zone: Option<String>,
    /// Service software version, recorded in metadata.
    pub service_version: Option<String>,
    /// Default job properties as `key=value` entries, merged under every
    /// submitted job's own properties.
    #[ortho_config(default = Vec::new())]
    pub job_properties: Vec<String>,
    /// Total time to wait for a queued job before giving up.
    #[ortho_config(default = DEFAULT_JOB_WAIT_TIMEOUT_SECS)]
    pub job_wait_timeout_secs: u64,
    /// Spacing between completion polls for queued jobs.
    #[ortho_config(default = DEFAULT_JOB_POLL_INTERVAL_SECS)]
    pub job_poll_interval_secs: u64,
    /// Fractional jitter applied to the poll spacing; zero keeps the
    /// spacing fully deterministic.
    #[ortho_config(default = 0.0)]
    pub poll_jitter: f64,
    /// Upper bound on targets acted on concurrently.
    #[ortho_config(default = DEFAULT_PARALLELISM)]
    pub max_parallelism: usize,
}

impl EngineConfig {
    /// Loads configuration from defaults, files, environment variables, and
    /// CLI flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge
    /// sources, or a validation error for out-of-range values.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        let config = Self::load().map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration without attempting to parse CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails, or a validation
    /// error for out-of-range values.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        let config = Self::load_from_iter([std::ffi::OsString::from("gantry")])
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Performs semantic validation on the loaded values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] when an interval, jitter, or
    /// parallelism value cannot drive the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.job_poll_interval_secs == 0 {
            return Err(ConfigError::OutOfRange {
                field: "job_poll_interval_secs",
                reason: String::from("must be at least 1"),
            });
        }
        if !(0.0..=1.0).contains(&self.poll_jitter) {
            return Err(ConfigError::OutOfRange {
                field: "poll_jitter",
                reason: String::from("must be within 0.0..=1.0"),
            });
        }
        if self.max_parallelism == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_parallelism",
                reason: String::from("must be at least 1"),
            });
        }
        Ok(())
    }

    /// Returns whether the configured service is user-managed.
    #[must_use]
    pub const fn is_user_managed(&self) -> bool {
        self.static_service_instance.is_some()
    }

    /// Returns the configured static instance id, or generates a fresh one.
    #[must_use]
    pub fn resource_id(&self) -> ResourceId {
        self.static_service_instance.as_deref().map_or_else(
            || ResourceId::new(format!("gantry-{}", Uuid::new_v4().simple())),
            ResourceId::new,
        )
    }

    /// Builds the polling policy for queued jobs.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_secs(self.job_wait_timeout_secs),
            Duration::from_secs(self.job_poll_interval_secs),
        )
        .with_jitter(self.poll_jitter)
    }

    /// Builds the fan-out runner honoring the configured parallelism.
    #[must_use]
    pub fn runner(&self) -> ConcurrentRunner {
        NonZeroUsize::new(self.max_parallelism)
            .map_or_else(ConcurrentRunner::default, ConcurrentRunner::new)
    }

    /// Parses the `key=value` property entries into a map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidProperty`] for an entry without a `=`
    /// separator or with an empty key.
    pub fn default_job_properties(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let mut properties = BTreeMap::new();
        for entry in &self.job_properties {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(ConfigError::InvalidProperty {
                    entry: entry.clone(),
                });
            };
            if key.trim().is_empty() {
                return Err(ConfigError::InvalidProperty {
                    entry: entry.clone(),
                });
            }
            properties.insert(key.trim().to_owned(), value.to_owned());
        }
        Ok(properties)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Indicates a configuration value outside its legal range.
    #[error("configuration field {field} out of range: {reason}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// Indicates a malformed `key=value` job property entry.
    #[error("malformed job property entry: {entry:?} (expected key=value)")]
    InvalidProperty {
        /// Entry as supplied by the caller.
        entry: String,
    },
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

#[cfg(test)]
mod tests;
