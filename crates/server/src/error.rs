//! Startup errors for the server binary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to install Prometheus recorder: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("Coordination store unavailable: {0}")]
    Lock(#[from] lock::LockError),

    #[error("Invalid log filter: {0}")]
    LogFilter(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
