use crate::error::DriverError;
use crate::record::LogRecord;
use async_trait::async_trait;

/// Destination for [`LogRecord`]s submitted by application code.
///
/// Implementations transport records to a concrete sink (stdout,
/// PostgreSQL, ...). Callers hold an `Arc<dyn LogDriver>` and must not
/// depend on anything beyond these two methods.
#[async_trait]
pub trait LogDriver: Send + Sync {
    /// Deliver a single record, performing any first-use setup.
    ///
    /// **Returns**
    /// - `Ok(id)` with a sink-specific identifier for the write (a row id,
    ///   or a fixed literal for sinks that do not persist).
    /// - `Err(..)` describing why the record was not delivered. Nothing is
    ///   retried; the caller decides what to do with the failure.
    async fn send(&self, record: &LogRecord) -> Result<String, DriverError>;

    /// Release any held resource.
    ///
    /// Safe to call repeatedly, and safe to call when nothing was ever
    /// acquired. Must not race with an in-flight [`LogDriver::send`].
    async fn close(&self) -> Result<(), DriverError>;
}
