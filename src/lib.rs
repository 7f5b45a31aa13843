// ABOUTME: Main library for SQL Server records
// ABOUTME: Database lifecycle helpers and batch SQL script loading over tiberius

pub mod config;
pub mod db;
pub mod models;
pub mod record;
pub mod script;
pub mod tracker;

pub use config::{ConfigError, ConfigFile, ConnectionConfig};
pub use db::{Executor, SqlServerConnection, SqlServerError};
pub use models::{ScriptOutcome, ScriptStatus};
pub use record::{RecordError, SqlServerRecord};
pub use script::{
    split_statements, Delimiter, MarkerToken, ScriptError, ScriptSource, DEFAULT_MARKER,
};
pub use tracker::QueryTracker;
