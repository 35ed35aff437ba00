use std::error::Error;

/// Boxed error produced by a concrete backend client.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Reasons a driver could not be built, deliver a record or shut down.
#[derive(thiserror::Error, Debug)]
pub enum DriverError {
    #[error("no connection string configured: pass one explicitly or set {0}")]
    Configuration(&'static str),

    #[error("failed to connect: {0}")]
    Connection(#[source] BoxError),

    #[error("failed to apply schema: {0}")]
    Schema(#[source] BoxError),

    #[error("failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write record: {0}")]
    Insert(#[source] BoxError),

    #[error("failed to close driver: {0}")]
    Close(#[source] BoxError),

    #[error("driver is closed")]
    Closed,
}
