//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the core services.
//! Nothing in this crate reads process-wide environment variables while handling a request;
//! binaries read the environment and hand the raw values to the parsing helpers below.

use crate::constants::{DEFAULT_RENDER_COMMAND, DEFAULT_RENDER_TIMEOUT_SECS, DEFAULT_STORAGE_ROOT};
use crate::{StoreError, StoreResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    storage_root: PathBuf,
    render_command: String,
    render_timeout: Duration,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] if the storage root or render command is empty,
    /// or if the render timeout is zero.
    pub fn new(
        storage_root: PathBuf,
        render_command: String,
        render_timeout: Duration,
    ) -> StoreResult<Self> {
        if storage_root.as_os_str().is_empty() {
            return Err(StoreError::InvalidArgument(
                "storage root cannot be empty".into(),
            ));
        }

        if render_command.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "render command cannot be empty".into(),
            ));
        }

        if render_timeout.is_zero() {
            return Err(StoreError::InvalidArgument(
                "render timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            storage_root,
            render_command: render_command.trim().to_string(),
            render_timeout,
        })
    }

    /// Configuration rooted at `storage_root` with default render settings.
    pub fn with_root(storage_root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::new(
            storage_root.into(),
            DEFAULT_RENDER_COMMAND.into(),
            Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
        )
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    pub fn render_command(&self) -> &str {
        &self.render_command
    }

    pub fn render_timeout(&self) -> Duration {
        self.render_timeout
    }
}

/// Parse the storage root from an optional string value.
///
/// `None` or a blank value falls back to [`DEFAULT_STORAGE_ROOT`].
pub fn storage_root_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT))
}

/// Parse the render command from an optional string value.
pub fn render_command_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_RENDER_COMMAND.to_string())
}

/// Parse the render timeout (whole seconds) from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns the default timeout.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] if the value is not a positive integer.
pub fn render_timeout_from_env_value(value: Option<String>) -> StoreResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS));
    };

    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(StoreError::InvalidArgument(format!(
            "render timeout must be a positive number of seconds, got '{value}'"
        ))),
    }
}
