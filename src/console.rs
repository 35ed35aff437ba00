use crate::driver::LogDriver;
use crate::error::DriverError;
use crate::record::LogRecord;
use async_trait::async_trait;
use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

/// Identifier returned for every record printed by [`ConsoleDriver`].
pub const CONSOLE_ID: &str = "console-log";

/// Driver that pretty-prints each record as indented JSON.
pub struct ConsoleDriver {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleDriver {
    /// Print records to standard output.
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Print records to an arbitrary writer.
    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        ConsoleDriver {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl Default for ConsoleDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogDriver for ConsoleDriver {
    async fn send(&self, record: &LogRecord) -> Result<String, DriverError> {
        let text = serde_json::to_string_pretty(record)?;

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{}", text)
            .and_then(|_| out.flush())
            .map_err(|e| DriverError::Insert(Box::new(e)))?;

        Ok(CONSOLE_ID.to_string())
    }

    async fn close(&self) -> Result<(), DriverError> {
        Ok(())
    }
}
