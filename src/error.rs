//! Error types for the reconciler.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the runtime and store collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Docker API error
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// etcd client error
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    /// An operation did not finish in time
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Failed to encode a record value
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The container is unknown to the runtime
    #[error("Container not found: {0}")]
    NotFound(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Runs `fut` with a deadline, mapping expiry to [`Error::Timeout`].
pub async fn with_timeout<T, F>(op: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout { op, after }),
    }
}
