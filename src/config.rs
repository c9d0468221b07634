//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::poller::WaitPolicy;

/// Upper bound, in seconds, for every configured interval and timeout.
pub const MAX_DURATION_SECS: u64 = 24 * 60 * 60;

/// Control-plane connection and wait policy settings, merged from
/// defaults, configuration files, environment variables, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "CRUNCHLOOP")]
pub struct CrunchloopConfig {
    /// Base URL of the control plane (for example `https://cloud.example`).
    pub url: String,
    /// Seconds between two status polls while waiting for convergence.
    #[ortho_config(default = 5)]
    pub poll_interval_secs: u64,
    /// Seconds a lifecycle operation may wait for convergence.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn hint(&self) -> String {
        format!(
            "{}: set {} or add {} to crunchvm.toml",
            self.description, self.env_var, self.toml_key
        )
    }
}

impl CrunchloopConfig {
    /// Loads configuration using the `ortho-config` derive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("crunchvm")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages say where to provide
    /// the missing or invalid value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the URL is blank and
    /// [`ConfigError::Invalid`] when a duration is zero or longer than
    /// [`MAX_DURATION_SECS`], or the poll interval exceeds the wait timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = FieldMetadata::new("control plane URL", "CRUNCHLOOP_URL", "url");
        if self.url.trim().is_empty() {
            return Err(ConfigError::MissingField(format!("missing {}", url.hint())));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(ConfigError::Invalid(format!(
                "{} must start with http:// or https://",
                url.hint()
            )));
        }

        for (value, field) in [
            (
                self.poll_interval_secs,
                FieldMetadata::new(
                    "poll interval",
                    "CRUNCHLOOP_POLL_INTERVAL_SECS",
                    "poll_interval_secs",
                ),
            ),
            (
                self.wait_timeout_secs,
                FieldMetadata::new(
                    "wait timeout",
                    "CRUNCHLOOP_WAIT_TIMEOUT_SECS",
                    "wait_timeout_secs",
                ),
            ),
            (
                self.http_timeout_secs,
                FieldMetadata::new(
                    "HTTP timeout",
                    "CRUNCHLOOP_HTTP_TIMEOUT_SECS",
                    "http_timeout_secs",
                ),
            ),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than zero",
                    field.hint()
                )));
            }
            if value > MAX_DURATION_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{} must not exceed {MAX_DURATION_SECS} seconds",
                    field.hint()
                )));
            }
        }

        if self.poll_interval_secs > self.wait_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_secs ({}) must not exceed wait_timeout_secs ({})",
                self.poll_interval_secs, self.wait_timeout_secs
            )));
        }
        Ok(())
    }

    /// Wait policy used by lifecycle operations.
    #[must_use]
    pub const fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.wait_timeout_secs),
        )
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
