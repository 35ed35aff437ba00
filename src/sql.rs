use crate::driver::LogDriver;
use crate::env::{env_non_empty, DB_URL_ENV};
use crate::error::DriverError;
use crate::record::{LogRecord, LogRow};
use crate::session::{Connector, Session};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

/// Persistence driver that writes one row per record through a [`Connector`].
///
/// Nothing happens at construction time. The first [`LogDriver::send`]
/// opens the connection and applies the schema; both steps run at most
/// once per instance and a failed attempt is retried by the next send.
/// The state lives behind one async mutex, so concurrent first sends
/// still connect once and issue the DDL once.
pub struct SqlDriver<C: Connector> {
    connector: C,
    dsn: String,
    state: Mutex<State<C::Session>>,
}

struct State<S> {
    session: Option<S>,
    migrated: bool,
    closed: bool,
}

impl<C: Connector> SqlDriver<C> {
    /// Create a driver for `dsn`, falling back to the `DB_URL` environment
    /// variable when `dsn` is blank.
    ///
    /// **Returns**
    /// - `Err(DriverError::Configuration)` if neither source provides a
    ///   connection string. No connection is attempted either way.
    pub fn with_connector(connector: C, dsn: impl Into<String>) -> Result<Self, DriverError> {
        let dsn = resolve_dsn(dsn.into(), env_non_empty(DB_URL_ENV))?;
        Ok(SqlDriver {
            connector,
            dsn,
            state: Mutex::new(State {
                session: None,
                migrated: false,
                closed: false,
            }),
        })
    }

    async fn ensure_connection<'a>(
        &self,
        slot: &'a mut Option<C::Session>,
    ) -> Result<&'a mut C::Session, DriverError> {
        let session = match slot.take() {
            Some(session) => session,
            None => {
                let session = self
                    .connector
                    .connect(&self.dsn)
                    .await
                    .map_err(DriverError::Connection)?;
                info!("[digital-edd-logger] connected to database");
                session
            }
        };
        Ok(slot.insert(session))
    }

    async fn ensure_table<'a>(
        &self,
        state: &'a mut State<C::Session>,
    ) -> Result<&'a mut C::Session, DriverError> {
        let session = self.ensure_connection(&mut state.session).await?;
        if !state.migrated {
            session.ensure_schema().await.map_err(DriverError::Schema)?;
            state.migrated = true;
            info!(
                table = self.connector.table(),
                "[digital-edd-logger] table {} verified/created",
                self.connector.table()
            );
        }
        Ok(session)
    }
}

fn resolve_dsn(explicit: String, fallback: Option<String>) -> Result<String, DriverError> {
    if !explicit.trim().is_empty() {
        return Ok(explicit);
    }
    fallback.ok_or(DriverError::Configuration(DB_URL_ENV))
}

#[async_trait]
impl<C: Connector> LogDriver for SqlDriver<C> {
    async fn send(&self, record: &LogRecord) -> Result<String, DriverError> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(DriverError::Closed);
        }

        let session = self.ensure_table(&mut state).await?;
        let row = LogRow::from_record(record);
        let id = session.insert(&row).await.map_err(DriverError::Insert)?;
        Ok(id.to_string())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        state.closed = true;
        match state.session.take() {
            Some(session) => session.close().await.map_err(DriverError::Close),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Default)]
    struct Calls {
        connects: AtomicUsize,
        schemas: AtomicUsize,
        closes: AtomicUsize,
        failing_connects: AtomicUsize,
        failing_schemas: AtomicUsize,
        rows: StdMutex<Vec<LogRow>>,
    }

    #[derive(Clone, Default)]
    struct MemoryConnector {
        calls: Arc<Calls>,
    }

    struct MemorySession {
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        type Session = MemorySession;

        fn table(&self) -> &str {
            "memory_logs"
        }

        async fn connect(&self, _dsn: &str) -> Result<MemorySession, BoxError> {
            self.calls.connects.fetch_add(1, Ordering::SeqCst);
            if take_failure(&self.calls.failing_connects) {
                return Err("connection refused".into());
            }
            Ok(MemorySession {
                calls: Arc::clone(&self.calls),
            })
        }
    }

    #[async_trait]
    impl Session for MemorySession {
        async fn ensure_schema(&mut self) -> Result<(), BoxError> {
            self.calls.schemas.fetch_add(1, Ordering::SeqCst);
            if take_failure(&self.calls.failing_schemas) {
                return Err("permission denied".into());
            }
            Ok(())
        }

        async fn insert(&mut self, row: &LogRow) -> Result<i64, BoxError> {
            let mut rows = self.calls.rows.lock().unwrap();
            rows.push(row.clone());
            Ok(rows.len() as i64)
        }

        async fn close(self) -> Result<(), BoxError> {
            self.calls.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn driver() -> (SqlDriver<MemoryConnector>, Arc<Calls>) {
        let connector = MemoryConnector::default();
        let calls = Arc::clone(&connector.calls);
        let driver = SqlDriver::with_connector(connector, "memory://logs").unwrap();
        (driver, calls)
    }

    fn record(trace_id: &str) -> LogRecord {
        LogRecord {
            trace_id: Some(trace_id.into()),
            service: Some("svc".into()),
            level: Some("INFO".into()),
            duration_ms: Some(12.5),
            ..Default::default()
        }
    }

    #[test]
    fn explicit_dsn_wins_over_fallback() {
        let dsn = resolve_dsn("postgres://a".into(), Some("postgres://b".into())).unwrap();
        assert_eq!(dsn, "postgres://a");
    }

    #[test]
    fn blank_dsn_uses_fallback() {
        let dsn = resolve_dsn("  ".into(), Some("postgres://b".into())).unwrap();
        assert_eq!(dsn, "postgres://b");
    }

    #[test]
    fn missing_dsn_is_a_configuration_error() {
        let err = resolve_dsn(String::new(), None).unwrap_err();
        assert!(matches!(err, DriverError::Configuration(DB_URL_ENV)));
    }

    #[test]
    fn construction_does_not_connect() {
        let (_driver, calls) = driver();
        assert_eq!(calls.connects.load(Ordering::SeqCst), 0);
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connects_and_migrates_once_across_sends() {
        let (driver, calls) = driver();

        assert_eq!(driver.send(&record("t1")).await.unwrap(), "1");
        assert_eq!(driver.send(&record("t2")).await.unwrap(), "2");
        assert_eq!(driver.send(&record("t3")).await.unwrap(), "3");

        assert_eq!(calls.connects.load(Ordering::SeqCst), 1);
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 1);
        assert_eq!(calls.rows.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn concurrent_first_sends_share_one_setup() {
        let (driver, calls) = driver();
        let (first, second) = (record("t1"), record("t2"));
        let (a, b) = tokio::join!(driver.send(&first), driver.send(&second));

        a.unwrap();
        b.unwrap();
        assert_eq!(calls.connects.load(Ordering::SeqCst), 1);
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn row_carries_record_fields_and_zero_flag() {
        let (driver, calls) = driver();
        driver.send(&record("t1")).await.unwrap();

        let rows = calls.rows.lock().unwrap();
        let row = &rows[0];
        assert_eq!(row.trace_id.as_deref(), Some("t1"));
        assert_eq!(row.service.as_deref(), Some("svc"));
        assert_eq!(row.level.as_deref(), Some("INFO"));
        assert_eq!(row.duration_ms, Some(12.5));
        assert_eq!(row.flag_summary, 0);
    }

    #[tokio::test]
    async fn failed_connection_is_retried_by_next_send() {
        let (driver, calls) = driver();
        calls.failing_connects.store(1, Ordering::SeqCst);

        let err = driver.send(&record("t1")).await.unwrap_err();
        assert!(matches!(err, DriverError::Connection(_)));
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 0);
        assert!(calls.rows.lock().unwrap().is_empty());

        driver.send(&record("t2")).await.unwrap();
        assert_eq!(calls.connects.load(Ordering::SeqCst), 2);
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_schema_blocks_insert_and_is_retried() {
        let (driver, calls) = driver();
        calls.failing_schemas.store(1, Ordering::SeqCst);

        let err = driver.send(&record("t1")).await.unwrap_err();
        assert!(matches!(err, DriverError::Schema(_)));
        assert!(calls.rows.lock().unwrap().is_empty());

        driver.send(&record("t2")).await.unwrap();
        assert_eq!(calls.connects.load(Ordering::SeqCst), 1);
        assert_eq!(calls.schemas.load(Ordering::SeqCst), 2);
        assert_eq!(calls.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn close_without_connection_is_ok_and_idempotent() {
        let (driver, calls) = driver();
        driver.close().await.unwrap();
        driver.close().await.unwrap();
        assert_eq!(calls.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_releases_the_session_once() {
        let (driver, calls) = driver();
        driver.send(&record("t1")).await.unwrap();

        driver.close().await.unwrap();
        driver.close().await.unwrap();
        assert_eq!(calls.closes.load(Ordering::SeqCst), 1);

        let err = driver.send(&record("t2")).await.unwrap_err();
        assert!(matches!(err, DriverError::Closed));
        assert_eq!(calls.connects.load(Ordering::SeqCst), 1);
    }
}
