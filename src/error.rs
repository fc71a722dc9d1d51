//! Unified error type.

use thiserror::Error;

/// The error type returned by vigil's fallible operations.
///
/// Application-level errors (404, 500, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// startup failures: an unusable configuration, a metric that cannot be
/// registered, or a port that cannot be bound.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

/// A configuration value that is present but unusable.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PORT must be a number between 0 and 65535, got `{0}`")]
    InvalidPort(String),
}
