pub mod record;
pub mod error;
pub mod driver;
pub mod console;
pub mod session;
pub mod sql;

#[cfg(feature = "postgres")]
pub mod postgres;

pub mod backend;
pub mod env;
pub mod layer;
pub mod init;

pub use console::ConsoleDriver;
pub use driver::LogDriver;
pub use error::DriverError;
pub use record::LogRecord;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;
