use std::{cell::RefCell, env, sync::Arc, time::Duration};

use dotenv::dotenv;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use thread_local::ThreadLocal;
use tokio::{task, time::timeout};
use tokio_postgres::{config::SslMode, Config};
use tracing::{debug, error};

use crate::database::postgres::session::Session;

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    let connection = env::var("DATABASE_URL")?;
    Ok(connection)
}

#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,
}

/// Hands out sessions for one named database.
///
/// Every session is a dedicated connection rather than a pooled one: scratch
/// tables are connection-local, so returning a connection to a pool would
/// leak them into an unrelated operation. The thread-scoped mode caches one
/// released session per OS thread so a worker issuing many merges avoids
/// re-authenticating. The cache is a checkout: acquiring takes the session
/// out, so a second operation that lands on the same thread while the first
/// still holds it gets its own fresh connection, never a shared one.
pub struct SessionProvider {
    config: Config,
    scoped_sessions: ThreadLocal<RefCell<Option<Arc<Session>>>>,
}

impl SessionProvider {
    /// Reads `DATABASE_URL` from the environment and points it at `db`.
    pub fn new(db: &str) -> Result<Self, ConnectionError> {
        let connection_str = connection_string()?;
        let mut config: Config = connection_str
            .parse()
            .map_err(|_| ConnectionError::CouldNotParseConnectionString)?;
        config.dbname(db);

        Ok(SessionProvider { config, scoped_sessions: ThreadLocal::new() })
    }

    /// Acquires a session. With `scoped` set, a session previously released
    /// on the current thread is checked out and reused while its connection
    /// is still alive; otherwise a dedicated connection is opened.
    pub async fn session(&self, scoped: bool) -> Result<Arc<Session>, ConnectionError> {
        if scoped {
            let cached = self
                .scoped_sessions
                .get_or(|| RefCell::new(None))
                .borrow_mut()
                .take();
            if let Some(session) = cached {
                if !session.is_closed() {
                    return Ok(session);
                }
                debug!("Thread-scoped session connection lost, reconnecting");
            }
        }

        Ok(Arc::new(self.connect().await?))
    }

    /// Returns a scoped session to the current thread's cache for the next
    /// operation. Per-call sessions are dropped instead, closing their
    /// connection.
    pub fn release(&self, session: Arc<Session>, scoped: bool) {
        if scoped && !session.is_closed() {
            *self.scoped_sessions.get_or(|| RefCell::new(None)).borrow_mut() = Some(session);
        }
    }

    async fn connect(&self) -> Result<Session, ConnectionError> {
        async fn _connect(mut config: Config, disable_ssl: bool) -> Result<Session, ConnectionError> {
            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| ConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            let (client, connection) =
                match timeout(Duration::from_millis(5000), config.connect(tls_connector)).await {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        // retry without ssl if ssl has been attempted and failed
                        if !disable_ssl && config.get_ssl_mode() != SslMode::Disable {
                            return Box::pin(_connect(config, true)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(ConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(ConnectionError::CanNotConnectToDatabase);
                    }
                };

            // The connection future drives the socket until the client drops
            task::spawn(async move {
                if let Err(e) = connection.await {
                    error!("Database connection error: {}", e);
                }
            });

            Ok(Session::new(client))
        }

        _connect(self.config.clone(), false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::postgres::session::{Executor, TransactionError};
    use async_trait::async_trait;
    use tokio_postgres::types::ToSql;

    struct IdleExecutor;

    #[async_trait]
    impl Executor for IdleExecutor {
        async fn execute(
            &self,
            _sql: &str,
            _params: &[&(dyn ToSql + Sync)],
        ) -> Result<u64, TransactionError> {
            Ok(0)
        }

        async fn batch_execute(&self, _sql: &str) -> Result<(), TransactionError> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    fn stub_session() -> Arc<Session> {
        Arc::new(Session::with_executor(Box::new(IdleExecutor)))
    }

    fn offline_provider() -> SessionProvider {
        // An empty config cannot reach any database, so every connect fails
        SessionProvider { config: Config::new(), scoped_sessions: ThreadLocal::new() }
    }

    #[tokio::test]
    async fn test_scoped_session_checkout_is_exclusive() {
        let provider = offline_provider();
        let cached = stub_session();
        provider.release(Arc::clone(&cached), true);

        let first = provider.session(true).await.unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        // While the first checkout is outstanding, an acquisition on the
        // same thread must open its own connection rather than share the
        // live session; offline that surfaces as a connection error, never
        // as the cached session
        let second = provider.session(true).await;
        assert!(matches!(second, Err(ConnectionError::CanNotConnectToDatabase)));
    }

    #[tokio::test]
    async fn test_released_scoped_session_is_reused() {
        let provider = offline_provider();
        let cached = stub_session();
        provider.release(Arc::clone(&cached), true);

        let first = provider.session(true).await.unwrap();
        provider.release(Arc::clone(&first), true);
        let second = provider.session(true).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_unscoped_release_does_not_cache() {
        let provider = offline_provider();
        provider.release(stub_session(), false);

        // Nothing cached, so a scoped acquisition has to connect
        let acquired = provider.session(true).await;
        assert!(acquired.is_err());
    }
}
