use thiserror::Error;

use crate::event::EventError;

/// Error outputs from `TallyKit`.
///
/// Only construction and explicit event building can fail. Logging calls never return errors.
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum TallyKitError {
    /// The SDK key is too short to carry an organization id and a secret
    #[error("invalid_sdk_key: {0}")]
    InvalidSdkKey(String),
    /// A configuration value is out of range or malformed
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
    /// The background runtime could not be started
    #[error("runtime_error: {0}")]
    Runtime(String),
    /// The event could not be built from the provided input
    #[error(transparent)]
    InvalidEvent(#[from] EventError),
}
