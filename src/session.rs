use crate::error::BoxError;
use crate::record::LogRow;
use async_trait::async_trait;

/// Opens sessions against a SQL backend for [`SqlDriver`](crate::sql::SqlDriver).
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Session;

    /// Name of the table rows are written to.
    fn table(&self) -> &str;

    /// Open a new session using the given connection string.
    async fn connect(&self, dsn: &str) -> Result<Self::Session, BoxError>;
}

/// A single open backend connection.
#[async_trait]
pub trait Session: Send {
    /// Create the target table and its indexes if they are absent.
    /// Must be idempotent.
    async fn ensure_schema(&mut self) -> Result<(), BoxError>;

    /// Insert one row as a single statement and return its generated id.
    async fn insert(&mut self, row: &LogRow) -> Result<i64, BoxError>;

    /// Release the connection.
    async fn close(self) -> Result<(), BoxError>;
}
