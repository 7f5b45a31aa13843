// ABOUTME: Database module exports for SQL Server records
// ABOUTME: Contains the executor seam and the tiberius-backed connection

pub mod executor;
pub mod sqlserver;

pub use executor::Executor;
pub use sqlserver::{SqlServerConnection, SqlServerError};
