// ABOUTME: Executor seam between the record helpers and a live connection
// ABOUTME: Anything that can run a SQL batch and switch databases implements it

use async_trait::async_trait;

use crate::db::sqlserver::SqlServerError;

/// A connection that runs SQL batches one at a time
#[async_trait]
pub trait Executor: Send {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlServerError>;

    /// Rebind the session to `database`
    async fn use_database(&mut self, database: &str) -> Result<(), SqlServerError>;

    fn current_database(&self) -> Option<&str>;

    fn is_active(&self) -> bool;

    async fn close(&mut self) -> Result<(), SqlServerError>;
}

/// Bracket-quote an identifier, doubling any closing bracket
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Quote a string literal as N'...'
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("myapp"), "[myapp]");
        assert_eq!(quote_ident("odd]name"), "[odd]]name]");
    }

    #[test]
    fn test_quote_literal() {
        assert_eq!(quote_literal("myapp"), "N'myapp'");
        assert_eq!(quote_literal("o'brien"), "N'o''brien'");
    }
}
