// ABOUTME: SQL Server connection management using tiberius
// ABOUTME: Opens the server connection, runs SQL batches, and tracks the bound database

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::ConnectionConfig;
use crate::db::executor::{quote_ident, Executor};

#[derive(Error, Debug)]
pub enum SqlServerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Tiberius error: {0}")]
    Tiberius(#[from] tiberius::error::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlServerError {
    /// Variant name, used when logging a failed script
    pub fn kind(&self) -> &'static str {
        match self {
            SqlServerError::ConnectionFailed(_) => "ConnectionFailed",
            SqlServerError::QueryFailed(_) => "QueryFailed",
            SqlServerError::Timeout(_) => "Timeout",
            SqlServerError::ConnectionClosed => "ConnectionClosed",
            SqlServerError::Tiberius(_) => "Tiberius",
            SqlServerError::Io(_) => "Io",
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, SqlServerError>
where
    F: Future<Output = Result<T, SqlServerError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| SqlServerError::Timeout(limit))?,
        None => fut.await,
    }
}

/// A timed-out batch leaves unread response packets on the stream, so the
/// client is discarded rather than reused
fn release_on_timeout<C>(client: &mut Option<C>, result: &Result<(), SqlServerError>) -> bool {
    if matches!(result, Err(SqlServerError::Timeout(_))) {
        client.take().is_some()
    } else {
        false
    }
}

pub struct SqlServerConnection {
    client: Option<Client<Compat<TcpStream>>>,
    database: Option<String>,
    statement_timeout: Option<Duration>,
}

impl SqlServerConnection {
    /// Build the tiberius config for the server login.
    ///
    /// The database is left out so the login succeeds before it exists.
    /// Contained users authenticate against their database, so for them it
    /// has to be named up front.
    pub fn tiberius_config(profile: &ConnectionConfig) -> Config {
        let mut config = Config::new();
        config.host(profile.server_host());
        config.port(profile.port);

        config.authentication(AuthMethod::sql_server(
            profile.username.as_deref().unwrap_or(""),
            profile.password.as_deref().unwrap_or(""),
        ));

        if let Some(appname) = &profile.appname {
            config.application_name(appname);
        }

        if profile.contained {
            config.database(&profile.database);
        }

        if profile.azure {
            config.encryption(EncryptionLevel::Required);
        }

        if profile.trust_certificate {
            config.trust_cert();
        }

        config
    }

    /// Connect to SQL Server using a connection config
    pub async fn connect(profile: &ConnectionConfig) -> Result<Self, SqlServerError> {
        let config = Self::tiberius_config(profile);
        log::info!(
            "Connecting to SQL Server at {}:{}",
            profile.server_host(),
            profile.port
        );

        let client = with_timeout(profile.login_timeout(), async move {
            let tcp = TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| SqlServerError::ConnectionFailed(e.to_string()))?;

            tcp.set_nodelay(true)?;

            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| SqlServerError::ConnectionFailed(e.to_string()))
        })
        .await?;

        Ok(Self {
            client: Some(client),
            database: profile.contained.then(|| profile.database.clone()),
            statement_timeout: profile.statement_timeout(),
        })
    }

    /// Query the server version, handy for checking a fresh connection
    pub async fn server_version(&mut self) -> Result<String, SqlServerError> {
        let client = self.client.as_mut().ok_or(SqlServerError::ConnectionClosed)?;
        let row = client
            .simple_query("SELECT @@VERSION")
            .await?
            .into_row()
            .await?
            .ok_or_else(|| SqlServerError::QueryFailed("No version returned".to_string()))?;

        let version: &str = row.get(0).unwrap_or("Unknown");
        Ok(version.to_string())
    }
}

#[async_trait]
impl Executor for SqlServerConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), SqlServerError> {
        let limit = self.statement_timeout;
        let client = self.client.as_mut().ok_or(SqlServerError::ConnectionClosed)?;
        log::debug!("Executing: {}", sql);

        // Batches go through simple_query so USE and DDL keep session scope
        let result = with_timeout(limit, async move {
            client.simple_query(sql).await?.into_results().await?;
            Ok::<_, SqlServerError>(())
        })
        .await;

        if release_on_timeout(&mut self.client, &result) {
            log::warn!("Statement timed out, dropping connection");
            self.database = None;
        }
        result
    }

    async fn use_database(&mut self, database: &str) -> Result<(), SqlServerError> {
        self.execute(&format!("USE {}", quote_ident(database))).await?;
        self.database = Some(database.to_string());
        Ok(())
    }

    fn current_database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn is_active(&self) -> bool {
        self.client.is_some()
    }

    async fn close(&mut self) -> Result<(), SqlServerError> {
        if let Some(client) = self.client.take() {
            log::info!("Closing SQL Server connection");
            self.database = None;
            client.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_config_address() {
        let profile = ConnectionConfig {
            username: Some("rails".to_string()),
            ..ConnectionConfig::for_database("myapp_development")
        };
        let config = SqlServerConnection::tiberius_config(&profile);
        assert_eq!(config.get_addr(), "localhost:1433");
    }

    #[test]
    fn test_error_kind_names_variant() {
        assert_eq!(SqlServerError::ConnectionClosed.kind(), "ConnectionClosed");
        assert_eq!(
            SqlServerError::QueryFailed("boom".to_string()).kind(),
            "QueryFailed"
        );
    }

    #[test]
    fn test_timeout_releases_client() {
        let mut client = Some("client");
        let timed_out = Err(SqlServerError::Timeout(Duration::from_secs(1)));
        assert!(release_on_timeout(&mut client, &timed_out));
        assert!(client.is_none());
        assert!(!release_on_timeout(&mut client, &timed_out));
    }

    #[test]
    fn test_other_errors_keep_client() {
        let mut client = Some("client");
        let failed = Err(SqlServerError::QueryFailed("syntax".to_string()));
        assert!(!release_on_timeout(&mut client, &failed));
        assert!(!release_on_timeout(&mut client, &Ok(())));
        assert!(client.is_some());
    }

    #[tokio::test]
    async fn test_timeout_wrapper() {
        let result: Result<(), SqlServerError> =
            with_timeout(Some(Duration::from_millis(10)), async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(SqlServerError::Timeout(_))));

        let result = with_timeout(None, async { Ok::<_, SqlServerError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
