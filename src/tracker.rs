// ABOUTME: Query tracking for script loads
// ABOUTME: Wraps an executor and records each statement before it is dispatched

use async_trait::async_trait;

use crate::db::{Executor, SqlServerError};

/// Executor wrapper that keeps a log of the statements sent through it.
///
/// A fresh tracker starts with an empty log, so each tracked operation sees
/// only its own statements.
pub struct QueryTracker<'a> {
    inner: &'a mut dyn Executor,
    log: Vec<String>,
}

impl<'a> QueryTracker<'a> {
    pub fn new(inner: &'a mut dyn Executor) -> Self {
        Self {
            inner,
            log: Vec::new(),
        }
    }

    /// The most recent statement dispatched, whether or not it succeeded
    pub fn last_query(&self) -> Option<&str> {
        self.log.last().map(String::as_str)
    }

    pub fn queries(&self) -> &[String] {
        &self.log
    }

    pub fn into_log(self) -> Vec<String> {
        self.log
    }
}

#[async_trait]
impl Executor for QueryTracker<'_> {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlServerError> {
        self.log.push(sql.to_string());
        self.inner.execute(sql).await
    }

    async fn use_database(&mut self, database: &str) -> Result<(), SqlServerError> {
        self.log.push(format!("USE {}", crate::db::executor::quote_ident(database)));
        self.inner.use_database(database).await
    }

    fn current_database(&self) -> Option<&str> {
        self.inner.current_database()
    }

    fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    async fn close(&mut self) -> Result<(), SqlServerError> {
        self.inner.close().await
    }
}
