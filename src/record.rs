// ABOUTME: SQL Server record base: owns a connection config and its live connection
// ABOUTME: Provides create/drop/use/setup database helpers and bulk script loading

use thiserror::Error;

use crate::config::{ConfigError, ConnectionConfig};
use crate::db::executor::{quote_ident, quote_literal};
use crate::db::{Executor, SqlServerConnection, SqlServerError};
use crate::models::ScriptOutcome;
use crate::script::{run_script, Delimiter, ScriptSource};

const MASTER_DATABASE: &str = "master";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] SqlServerError),
}

/// A configured SQL Server connection with database lifecycle helpers.
///
/// The connection is opened without selecting `config.database`, so
/// `create_database` works before the database exists. Call
/// `use_database` to bind to it.
pub struct SqlServerRecord<E: Executor = SqlServerConnection> {
    config: ConnectionConfig,
    executor: E,
}

impl SqlServerRecord<SqlServerConnection> {
    /// Validate `config` and connect to the server
    pub async fn establish(config: ConnectionConfig) -> Result<Self, RecordError> {
        config.validate()?;
        let connection = SqlServerConnection::connect(&config).await?;
        Ok(Self::with_executor(config, connection))
    }
}

impl<E: Executor> SqlServerRecord<E> {
    pub fn with_executor(config: ConnectionConfig, executor: E) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    pub fn is_active(&self) -> bool {
        self.executor.is_active()
    }

    pub fn current_database(&self) -> Option<&str> {
        self.executor.current_database()
    }

    pub async fn create_database(&mut self) -> Result<(), RecordError> {
        let name = quote_ident(&self.config.database);
        let sql = match &self.config.collation {
            Some(collation) => format!("CREATE DATABASE {} COLLATE {}", name, collation),
            None => format!("CREATE DATABASE {}", name),
        };
        log::info!("Creating database {}", self.config.database);
        self.executor.execute(&sql).await?;
        Ok(())
    }

    /// Drop the configured database; a database that does not exist is fine
    pub async fn drop_database(&mut self) -> Result<(), RecordError> {
        let database = self.config.database.clone();

        // A session cannot drop the database it is using
        if self
            .executor
            .current_database()
            .is_some_and(|current| current.eq_ignore_ascii_case(&database))
        {
            self.executor.use_database(MASTER_DATABASE).await?;
        }

        let name = quote_ident(&database);
        let sql = format!(
            "IF DB_ID({}) IS NOT NULL\nBEGIN\n    \
             ALTER DATABASE {} SET SINGLE_USER WITH ROLLBACK IMMEDIATE;\n    \
             DROP DATABASE {};\nEND",
            quote_literal(&database),
            name,
            name
        );
        log::info!("Dropping database {}", database);
        self.executor.execute(&sql).await?;
        Ok(())
    }

    pub async fn use_database(&mut self) -> Result<(), RecordError> {
        let database = self.config.database.clone();
        self.executor.use_database(&database).await?;
        Ok(())
    }

    /// Create the database, switch to it, and load the structure scripts.
    ///
    /// Not atomic: a failure partway leaves the database created.
    pub async fn setup_database(&mut self) -> Result<Vec<ScriptOutcome>, RecordError> {
        self.setup_database_with(Vec::new()).await
    }

    pub async fn setup_database_with(
        &mut self,
        structure: Vec<ScriptSource>,
    ) -> Result<Vec<ScriptOutcome>, RecordError> {
        self.create_database().await?;
        self.use_database().await?;
        Ok(self.load_structure(structure).await)
    }

    /// Drop and set up again. Destroys all data in the database.
    pub async fn reset_database(&mut self) -> Result<Vec<ScriptOutcome>, RecordError> {
        self.reset_database_with(Vec::new()).await
    }

    pub async fn reset_database_with(
        &mut self,
        structure: Vec<ScriptSource>,
    ) -> Result<Vec<ScriptOutcome>, RecordError> {
        self.drop_database().await?;
        self.setup_database_with(structure).await
    }

    /// Load schema scripts split on `GO` lines
    pub async fn load_structure(&mut self, files: Vec<ScriptSource>) -> Vec<ScriptOutcome> {
        self.load_scripts(files, &Delimiter::default()).await
    }

    /// Load data scripts holding one statement per line
    pub async fn load_data(&mut self, files: Vec<ScriptSource>) -> Vec<ScriptOutcome> {
        self.load_scripts(files, &Delimiter::LineBreak).await
    }

    pub async fn load_scripts(
        &mut self,
        files: Vec<ScriptSource>,
        delimiter: &Delimiter,
    ) -> Vec<ScriptOutcome> {
        if files.is_empty() {
            eprintln!("Warning: no script files given, nothing to load");
            log::warn!("No script files given to load");
            return Vec::new();
        }

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            outcomes.push(self.load_script(file, delimiter).await);
        }
        outcomes
    }

    pub async fn load_script(
        &mut self,
        source: ScriptSource,
        delimiter: &Delimiter,
    ) -> ScriptOutcome {
        run_script(&mut self.executor, &self.config, source, delimiter).await
    }

    pub async fn close(&mut self) -> Result<(), RecordError> {
        self.executor.close().await?;
        Ok(())
    }
}

impl<E: Executor> Drop for SqlServerRecord<E> {
    fn drop(&mut self) {
        if self.executor.is_active() {
            log::debug!(
                "Dropping open connection for database {}",
                self.config.database
            );
        }
    }
}
